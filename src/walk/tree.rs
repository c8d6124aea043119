//! Recursive directory walk (walkdir) yielding files only.

use crossbeam_channel::Sender;
use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::policy::{SharedPolicy, TraversalPolicy, is_excluded};
use super::{Entries, ErrorLog, WalkError, Walker};
use crate::cancel::CancelToken;
use crate::engine::tools::expand_env_path;
use crate::metric::METRICS;
use crate::{Entry, FileInfo};

/// Walks only files under the root. Excluded directories are pruned with their whole subtree.
#[derive(Clone, Default)]
pub struct TreeWalker {
    policy: Option<SharedPolicy>,
    follow_links: bool,
    errors: ErrorLog,
}

impl TreeWalker {
    pub fn new(policy: Option<SharedPolicy>) -> Self {
        Self {
            policy,
            follow_links: false,
            errors: ErrorLog::default(),
        }
    }

    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }
}

impl Walker for TreeWalker {
    fn walk(&mut self, root: &Path) -> Entries {
        METRICS.walk.incr();
        self.errors = ErrorLog::default();
        let errors = self.errors.clone();
        let root = expand_env_path(root);
        let policy = self.policy.clone();
        let follow_links = self.follow_links;
        Entries::spawn(move |cancel, tx| {
            walk_tree(&root, policy.as_deref(), follow_links, cancel, tx, &errors);
        })
    }

    fn err(&self) -> Option<WalkError> {
        self.errors.snapshot()
    }
}

/// Send every non-excluded file under `root` to `tx`. Errors are recorded and the walk goes on.
fn walk_tree(
    root: &Path,
    policy: Option<&dyn TraversalPolicy>,
    follow_links: bool,
    cancel: &CancelToken,
    tx: &Sender<Entry>,
    errors: &ErrorLog,
) {
    let mut it = WalkDir::new(root).follow_links(follow_links).into_iter();
    loop {
        if cancel.is_cancelled() {
            debug!("tree walk of {} cancelled", root.display());
            return;
        }
        let dent = match it.next() {
            None => break,
            Some(Ok(dent)) => dent,
            Some(Err(err)) => {
                let path = err.path().map(PathBuf::from).unwrap_or_else(|| root.to_path_buf());
                errors.push(WalkError::at(&path, &err));
                continue;
            }
        };
        let meta = match dent.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                errors.push(WalkError::at(dent.path(), &err));
                continue;
            }
        };
        METRICS.walk_call.incr();
        let path = dent.into_path();
        let info = FileInfo::from_metadata(&path, &meta);
        let entry = Entry::new(path, info);

        if is_excluded(policy, &entry) {
            if entry.is_dir() {
                it.skip_current_dir();
            }
            continue;
        }
        if entry.is_dir() {
            METRICS.walk_dir.incr();
            continue;
        }
        METRICS.walk_entry.incr();
        if !cancel.send(tx, entry) {
            return;
        }
    }
}
