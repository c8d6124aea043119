//! Exclusion shared by the tree and archive walkers.

use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;

use crate::Entry;
use crate::engine::predicate::Predicate;
use crate::metric::METRICS;
use crate::record::Record;

/// Decides whether a visited path is left out. For directories in a tree walk a `true` also
/// skips everything below it.
pub trait TraversalPolicy: Send + Sync {
    fn should_prune(&self, path: &Path, is_dir: bool, record: &Record) -> bool;
}

pub type SharedPolicy = Arc<dyn TraversalPolicy>;

/// Policy backed by a predicate: `true` or an evaluation error excludes the path.
pub struct ExcludePolicy<P> {
    predicate: P,
}

impl<P: Predicate> ExcludePolicy<P> {
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }

    pub fn shared(predicate: P) -> SharedPolicy
    where
        P: 'static,
    {
        Arc::new(Self::new(predicate))
    }
}

impl<P: Predicate> TraversalPolicy for ExcludePolicy<P> {
    fn should_prune(&self, path: &Path, _is_dir: bool, record: &Record) -> bool {
        match self.predicate.run(record) {
            Ok(true) => {
                METRICS.walk_exclude.incr();
                debug!("exclude: {}", path.display());
                true
            }
            Ok(false) => false,
            Err(e) => {
                METRICS.walk_exclude_err.incr();
                warn!("exclude: {}: {:#}", path.display(), e);
                true
            }
        }
    }
}

/// Run `policy` against `entry`. The record it sees carries an extra `is_dir` flag.
pub fn is_excluded(policy: Option<&dyn TraversalPolicy>, entry: &Entry) -> bool {
    let Some(policy) = policy else {
        return false;
    };
    let mut record = Record::from_entry(entry);
    record.set("is_dir", entry.is_dir());
    policy.should_prune(entry.path(), entry.is_dir(), &record)
}
