//! Walk several roots one after another with a single walker.

use crossbeam_channel::{Receiver, bounded};
use log::debug;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use super::{WalkError, Walker};
use crate::Entry;
use crate::cancel::CancelToken;

/// Spawn the walk thread: walks `roots` in order, sends entries on the returned receiver
/// (capacity `channel_cap`), and returns the joined errors of every root when joined.
/// One root's failure never hides another's.
pub fn spawn_root_walk(
    mut walker: Box<dyn Walker>,
    roots: Vec<PathBuf>,
    token: &CancelToken,
    channel_cap: usize,
) -> (Receiver<Entry>, JoinHandle<Option<WalkError>>) {
    let (entry_tx, entry_rx) = bounded::<Entry>(channel_cap);
    let token = token.clone();
    let handle = thread::spawn(move || {
        let mut errs = Vec::new();
        let mut count = 0_usize;
        'roots: for root in &roots {
            if token.is_cancelled() {
                break;
            }
            debug!("walk: root {}", root.display());
            let entries = walker.walk(root);
            while let Some(entry) = entries.recv_until(&token) {
                if !token.send(&entry_tx, entry) {
                    drop(entries);
                    collect_err(walker.as_ref(), &mut errs);
                    break 'roots;
                }
                count += 1;
            }
            drop(entries);
            collect_err(walker.as_ref(), &mut errs);
        }
        debug!("walk: {} entries from {} root(s)", count, roots.len());
        drop(entry_tx);
        WalkError::join(errs)
    });
    (entry_rx, handle)
}

fn collect_err(walker: &dyn Walker, errs: &mut Vec<WalkError>) {
    if let Some(err) = walker.err() {
        errs.push(err);
    }
}
