use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use log::{debug, info};
use std::io::Write;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::engine::index_reader::spawn_index_reader;
use crate::engine::output::write_record;
use crate::engine::predicate::{Matcher, Predicate};
use crate::engine::probe::{ScriptProbe, probe_stage};
use crate::metric::METRICS;
use crate::record::Record;
use crate::stage::{Chain, Stage};
use crate::utils::config::DEFAULT_SHELL;
use crate::walk::{ExcludePolicy, SharedPolicy, spawn_root_walk};
use crate::{Entry, Opts, pipeline};

/// Exclusion policy from `opts.exclude`; `None` when there are no conditions.
pub fn build_exclude(opts: &Opts) -> Result<Option<SharedPolicy>> {
    if opts.exclude.is_empty() {
        return Ok(None);
    }
    let matcher = Matcher::any(&opts.exclude).context("parse exclude")?;
    Ok(Some(ExcludePolicy::shared(matcher)))
}

/// One passthrough stage per configured probe, in order.
pub fn build_probe_stages(opts: &Opts, workers: usize) -> Vec<Stage<Record, Record>> {
    let (shell, shell_args) = match opts.shell.split_first() {
        Some((shell, args)) => (shell.as_str(), args),
        None => (DEFAULT_SHELL, &[][..]),
    };
    opts.probes
        .iter()
        .map(|p| {
            let probe = Arc::new(ScriptProbe::new(&p.script, shell, shell_args));
            probe_stage(p.name.clone(), workers, probe)
        })
        .collect()
}

/// Start the source + enrichment pipeline. Everything that can fail up front (conflicting or
/// unreadable roots, bad conditions) fails here, before any thread starts.
///
/// Source → entry channel → entry stage (Entry → Record) → chain of `stages` → `record_rx`.
pub fn run_pipeline(
    opts: &Opts,
    stages: Vec<Stage<Record, Record>>,
    token: &CancelToken,
) -> Result<pipeline::PipelineHandles> {
    let tuning = pipeline::PipelineTuning::from_opts(opts);
    debug!("{:?}", tuning);
    let source = pipeline::Source::from_opts(opts)?;
    source.validate()?;
    let exclude = build_exclude(opts)?;

    let (source_handle, first_rx) = match source.walker(exclude) {
        Some((walker, roots)) => {
            let (entry_rx, walk_handle) =
                spawn_root_walk(walker, roots, token, tuning.buffer_size);
            let (record_tx, record_rx) = bounded::<Record>(tuning.buffer_size);
            let entry_stage = Stage::mapping("walk_meta", tuning.workers, |_, e: Entry| {
                Ok(Record::from_entry(&e))
            })
            .with_input_label(|e: &Entry| e.path().display().to_string())
            .start(token, entry_rx, record_tx);
            (
                pipeline::SourceHandle::Walk {
                    walk_handle,
                    entry_stage,
                },
                record_rx,
            )
        }
        None => {
            let inputs = source.open_index()?;
            let (record_rx, handle) = spawn_index_reader(inputs, token, tuning.buffer_size);
            (pipeline::SourceHandle::Index(handle), record_rx)
        }
    };

    let (out_tx, out_rx) = bounded::<Record>(tuning.buffer_size);
    let chain = Chain::new(stages, tuning.buffer_size).start(token, first_rx, out_tx);

    Ok(pipeline::PipelineHandles {
        record_rx: out_rx,
        source: source_handle,
        chain,
    })
}

/// Counts from one [`find`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FindSummary {
    /// Records that came out of the pipeline.
    pub received: usize,
    /// Records that passed the selection and were written.
    pub written: usize,
}

/// Whether `record` passes `selector`. Errors count as "not selected".
pub fn is_selected(selector: &dyn Predicate, record: &Record) -> bool {
    match selector.run(record) {
        Ok(selected) => selected,
        Err(e) => {
            debug!(
                "select: {}: {:#}",
                record.path().unwrap_or("<no path>"),
                e
            );
            false
        }
    }
}

/// Run the whole pipeline with the probes from `opts`, write every selected record to `w`.
pub fn find(opts: &Opts, token: &CancelToken, w: &mut dyn Write) -> Result<FindSummary> {
    let tuning = pipeline::PipelineTuning::from_opts(opts);
    let stages = build_probe_stages(opts, tuning.workers);
    let selector = Matcher::all(&opts.select).context("parse select")?;
    let handles = run_pipeline(opts, stages, token)?;

    let mut summary = FindSummary::default();
    let mut write_err = None;
    while let Some(record) = token.recv(&handles.record_rx) {
        summary.received += 1;
        if !is_selected(&selector, &record) {
            continue;
        }
        if let Err(e) = write_record(w, &record, opts.json) {
            // Typically a closed pipe: stop everything upstream.
            token.cancel();
            write_err = Some(e);
            break;
        }
        summary.written += 1;
        METRICS.accept.incr();
    }
    let flushed = w.flush().context("flush output");

    let walk_err = handles.finish()?;
    if let Some(e) = write_err {
        return Err(e);
    }
    flushed?;
    pipeline::check_walk_errors(opts, walk_err)?;
    info!(
        "{} of {} records selected",
        summary.written, summary.received
    );
    Ok(summary)
}
