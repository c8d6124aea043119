//! Pipeline context and tuning: where entries come from and how wide each stage runs.

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use log::debug;
use std::io::BufReader;
use std::path::PathBuf;
use std::thread::JoinHandle;
use thiserror::Error;

use crate::Opts;
use crate::engine::index_reader::{IndexInput, open_index_inputs};
use crate::engine::tools::{STDIN_MARK, expand_env_path, is_stdin_mark};
use crate::record::Record;
use crate::stage::{ChainHandle, StageHandle};
use crate::utils::config::{DEFAULT_BUFFER_SIZE, WorkerThreadLimits};
use crate::utils::probe_workers_per_stage;
use crate::walk::{
    ArchiveWalker, LineWalker, SharedPolicy, TreeWalker, WalkError, Walker, open_archive,
};

/// Invalid combination of inputs, reported before anything starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("no roots")]
    NoRoots,
    #[error("no other roots can be given together with - (stdin)")]
    StdinWithOthers,
    #[error("{0} and {1} cannot be combined")]
    Conflict(&'static str, &'static str),
}

/// Where entries come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Walk directory trees (or single files).
    Tree(Vec<PathBuf>),
    /// Walk paths read line by line from stdin.
    Stdin,
    /// Walk members of zip archives.
    Archives(Vec<PathBuf>),
    /// Read ready-made records from JSONL.
    Index(Vec<PathBuf>),
}

impl Source {
    pub fn from_opts(opts: &Opts) -> Result<Source, SourceError> {
        let has_index = !opts.index.is_empty();
        let has_archives = !opts.archives.is_empty();
        let has_roots = !opts.roots.is_empty();
        match (has_index, has_archives, has_roots) {
            (true, true, _) => Err(SourceError::Conflict("index", "archives")),
            (true, false, true) => Err(SourceError::Conflict("index", "roots")),
            (true, false, false) => Ok(Source::Index(opts.index.clone())),
            (false, true, true) => Err(SourceError::Conflict("archives", "roots")),
            (false, true, false) => Ok(Source::Archives(opts.archives.clone())),
            (false, false, false) => Err(SourceError::NoRoots),
            (false, false, true) => {
                if !opts.roots.iter().any(|r| is_stdin_mark(r)) {
                    Ok(Source::Tree(opts.roots.clone()))
                } else if opts.roots.len() == 1 {
                    Ok(Source::Stdin)
                } else {
                    Err(SourceError::StdinWithOthers)
                }
            }
        }
    }

    /// Fail early on roots that cannot be read or archives that cannot be opened.
    pub fn validate(&self) -> Result<()> {
        match self {
            Source::Tree(roots) => {
                for root in roots {
                    let root = expand_env_path(root);
                    std::fs::metadata(&root)
                        .with_context(|| format!("unreadable root {}", root.display()))?;
                }
            }
            Source::Archives(archives) => {
                for a in archives {
                    open_archive(&expand_env_path(a))?;
                }
            }
            Source::Stdin => {}
            Source::Index(paths) => {
                for p in paths.iter().filter(|p| !is_stdin_mark(p)) {
                    std::fs::metadata(p)
                        .with_context(|| format!("unreadable index {}", p.display()))?;
                }
            }
        }
        Ok(())
    }

    /// Walker and roots for walking sources; `None` for [`Source::Index`].
    pub fn walker(&self, exclude: Option<SharedPolicy>) -> Option<(Box<dyn Walker>, Vec<PathBuf>)> {
        let (walker, roots): (Box<dyn Walker>, Vec<PathBuf>) = match self {
            Source::Tree(roots) => (Box::new(TreeWalker::new(exclude)), roots.clone()),
            Source::Stdin => {
                let reader = BufReader::new(std::io::stdin());
                let walker = LineWalker::new(reader, TreeWalker::new(exclude));
                (Box::new(walker), vec![PathBuf::from(STDIN_MARK)])
            }
            Source::Archives(archives) => (Box::new(ArchiveWalker::new(exclude)), archives.clone()),
            Source::Index(_) => return None,
        };
        Some((walker, roots))
    }

    pub fn open_index(&self) -> Result<Vec<IndexInput>> {
        match self {
            Source::Index(paths) => open_index_inputs(paths),
            _ => Ok(Vec::new()),
        }
    }
}

/// Worker count and channel capacity for one run.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    /// Workers per stage.
    pub workers: usize,
    /// Capacity of every channel between stages.
    pub buffer_size: usize,
}

impl PipelineTuning {
    /// Workers from opts or available threads, capped so all probe processes stay within the
    /// FD limit.
    pub fn from_opts(opts: &Opts) -> Self {
        let limits = WorkerThreadLimits::current();
        let mut workers = opts.workers.unwrap_or(limits.all_threads).max(limits.floor);
        if let Some(per_stage) = probe_workers_per_stage(opts.probes.len())
            && workers > per_stage
        {
            debug!("capping workers {} -> {} (fd limit)", workers, per_stage);
            workers = per_stage;
        }
        let buffer_size = if opts.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            opts.buffer_size
        };
        Self {
            workers,
            buffer_size,
        }
    }
}

/// What feeds the first record channel.
pub enum SourceHandle {
    /// Walk thread (returns the joined walk error) and the entry → record stage.
    Walk {
        walk_handle: JoinHandle<Option<WalkError>>,
        entry_stage: StageHandle,
    },
    /// JSONL reader thread.
    Index(JoinHandle<Result<usize>>),
}

/// Handles returned by [`run_pipeline`](super::run_pipeline): receive records and finish when done.
pub struct PipelineHandles {
    pub record_rx: Receiver<Record>,
    pub source: SourceHandle,
    pub chain: ChainHandle,
}

impl PipelineHandles {
    /// Join every thread. Returns the walk errors, if any. Call after `record_rx` is drained or
    /// the run was cancelled.
    pub fn finish(self) -> Result<Option<WalkError>> {
        let PipelineHandles {
            record_rx,
            source,
            chain,
        } = self;
        drop(record_rx);
        let walk_err = match source {
            SourceHandle::Walk {
                walk_handle,
                entry_stage,
            } => {
                let err = walk_handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("walk thread panicked"))?;
                entry_stage.join()?;
                err
            }
            SourceHandle::Index(handle) => {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("index reader panicked"))??;
                None
            }
        };
        chain.join()?;
        Ok(walk_err)
    }
}
