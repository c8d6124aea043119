//! CLI command handler: build options (defaults → config file → flags), then run find.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::engine::arg_parser::Cli;
use crate::engine::output::open_output;
use crate::engine::probe::default_probe_name;
use crate::engine::tools::read_file_or_literal;
use crate::metric::METRICS;
use crate::pipeline::find;
use crate::utils::config::{DEFAULT_BUFFER_SIZE, PackagePaths};
use crate::utils::{apply_file_to_opts, load_settings_toml, setup_logging};
use crate::{Opts, ProbeSpec};

/// Layer defaults, the config file and CLI flags (later wins).
pub fn build_opts(cli: &Cli, config_dir: &Path) -> Result<Opts> {
    let mut opts = Opts {
        buffer_size: DEFAULT_BUFFER_SIZE,
        ..Default::default()
    };
    if let Some(file) = load_settings_toml(cli.config.as_deref(), config_dir)? {
        apply_file_to_opts(&file, &mut opts)?;
    }

    // File roots apply only when the command line names no input at all.
    let cli_names_input = !cli.roots.is_empty() || !cli.zip.is_empty() || !cli.index.is_empty();
    if cli_names_input || (opts.roots.is_empty() && opts.archives.is_empty() && opts.index.is_empty())
    {
        opts.roots = cli.roots_or_default();
        opts.archives = cli.zip.clone();
        opts.index = cli.index.clone();
    }
    if cli.workers.is_some() {
        opts.workers = cli.workers;
    }
    if let Some(n) = cli.buffer {
        opts.buffer_size = n;
    }
    if !cli.shell.is_empty() {
        opts.shell = cli.shell.clone();
    }
    if !cli.probe.is_empty() {
        opts.probes = cli
            .probe
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(ProbeSpec {
                    name: cli
                        .probe_name
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| default_probe_name(i)),
                    script: read_file_or_literal(p)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
    }
    if !cli.exclude.is_empty() {
        opts.exclude = cli.exclude.clone();
    }
    if !cli.select.is_empty() {
        opts.select = cli.select.clone();
    }
    if let Some(json) = cli.json {
        opts.json = json;
    }
    if cli.out.is_some() {
        opts.out = cli.out.clone();
    }
    if cli.timeout.is_some() {
        opts.timeout_secs = cli.timeout;
    }
    if let Some(strict) = cli.strict {
        opts.strict = strict;
    }
    if let Some(verbose) = cli.verbose {
        opts.verbose = verbose;
    }
    if let Some(quiet) = cli.quiet {
        opts.quiet = quiet;
    }
    Ok(opts)
}

/// Run find with Ctrl+C and the optional timeout wired to one cancellation token.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("current dir")?;
    let opts = build_opts(cli, &cwd)?;
    setup_logging(opts.verbose, opts.quiet);
    debug!(
        "{} CONFIG:{:#?}",
        PackagePaths::get().pkg_name().to_uppercase(),
        opts
    );

    let interrupt = CancelToken::new();
    let handler_token = interrupt.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("set Ctrl+C handler")?;
    let token = match opts.timeout_secs {
        Some(secs) => interrupt.with_timeout(Duration::from_secs(secs)),
        None => interrupt.clone(),
    };

    let start = Instant::now();
    let mut out = open_output(opts.out.as_deref())?;
    let result = find(&opts, &token, out.as_mut());
    if opts.verbose {
        eprintln!("{}", METRICS.snapshot(start.elapsed()));
    }
    let summary = result?;
    debug!("{:?}", summary);

    if interrupt.is_cancelled() {
        return Err(anyhow::anyhow!("Cancelled by user; partial results were written"));
    }
    if token.is_cancelled() {
        warn!("Timed out; partial results were written");
    }
    Ok(())
}
