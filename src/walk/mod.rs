//! Entry producers: directory trees, zip archives, and newline-delimited path lists.
//!
//! Every [`Walker::walk`] spawns one producer thread feeding a bounded channel and returns
//! [`Entries`], a lazy single-use iterator. Dropping `Entries` before it is drained cancels the
//! producer at its next step. Errors met along the way are kept and read back with
//! [`Walker::err`] once iteration is over.

pub mod archive;
pub mod lines;
pub mod policy;
pub mod roots;
pub mod tree;

pub use archive::{ArchiveWalker, open_archive};
pub use lines::LineWalker;
pub use policy::{ExcludePolicy, SharedPolicy, TraversalPolicy, is_excluded};
pub use roots::spawn_root_walk;
pub use tree::TreeWalker;

use crossbeam_channel::{Receiver, Sender, bounded};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

use crate::Entry;
use crate::cancel::CancelToken;
use crate::utils::config::WALKER_BUFFER_SIZE;

/// Produces the entries found under one root.
pub trait Walker: Send {
    /// Start walking `root`. Resets the error state of the previous walk.
    fn walk(&mut self, root: &Path) -> Entries;

    /// Errors of the latest walk. Complete once its [`Entries`] is drained or dropped.
    fn err(&self) -> Option<WalkError>;
}

/// Failure recorded while walking. Cloneable so walkers can hand out copies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("{}: {message}", path.display())]
    Path { path: PathBuf, message: String },
    #[error("read paths: {0}")]
    Read(String),
    #[error("{}", join_messages(.0))]
    Joined(Vec<WalkError>),
}

fn join_messages(errs: &[WalkError]) -> String {
    errs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl WalkError {
    pub fn at(path: &Path, err: impl std::fmt::Display) -> Self {
        WalkError::Path {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Combine errors, flattening nested joins. `None` when empty.
    pub fn join(errs: Vec<WalkError>) -> Option<WalkError> {
        let mut flat = Vec::with_capacity(errs.len());
        for e in errs {
            match e {
                WalkError::Joined(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(WalkError::Joined(flat)),
        }
    }

    /// Individual errors (one for non-joined errors).
    pub fn errors(&self) -> Vec<&WalkError> {
        match self {
            WalkError::Joined(inner) => inner.iter().collect(),
            other => vec![other],
        }
    }
}

/// Error list shared between a walker and its producer thread.
#[derive(Clone, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<WalkError>>>);

impl ErrorLog {
    pub fn push(&self, err: WalkError) {
        log::debug!("walk error: {}", err);
        match self.0.lock() {
            Ok(mut errs) => errs.push(err),
            Err(poisoned) => poisoned.into_inner().push(err),
        }
    }

    pub fn snapshot(&self) -> Option<WalkError> {
        let errs = match self.0.lock() {
            Ok(errs) => errs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        WalkError::join(errs)
    }
}

/// Lazy stream of entries from one walk.
pub struct Entries {
    rx: Receiver<Entry>,
    cancel: CancelToken,
}

impl Entries {
    /// Run `produce` on its own thread. The producer stops sending once `Entries` is dropped.
    pub fn spawn<F>(produce: F) -> Entries
    where
        F: FnOnce(&CancelToken, &Sender<Entry>) + Send + 'static,
    {
        let (tx, rx) = bounded::<Entry>(WALKER_BUFFER_SIZE);
        let cancel = CancelToken::new();
        let producer_cancel = cancel.clone();
        thread::spawn(move || {
            produce(&producer_cancel, &tx);
            drop(tx);
        });
        Entries { rx, cancel }
    }

    /// Next entry, or `None` when the walk ends or `token` is cancelled first.
    pub fn recv_until(&self, token: &CancelToken) -> Option<Entry> {
        token.recv(&self.rx)
    }
}

impl Iterator for Entries {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.rx.recv().ok()
    }
}

impl Drop for Entries {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
