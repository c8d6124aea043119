//! Cooperative cancellation shared by walkers, stages and probes.
//!
//! A [`CancelToken`] is a flag plus a "done" channel. The channel never carries a message; it
//! disconnects when the token is cancelled, so a blocked `select!` on [`CancelToken::done`] wakes
//! up together with whatever channel operation it is racing against.

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

struct Inner {
    cancelled: AtomicBool,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new() -> Self {
        let (done_tx, done_rx) = bounded::<()>(0);
        Inner {
            cancelled: AtomicBool::new(false),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the only sender disconnects done_rx for every waiter.
        if let Ok(mut tx) = self.done_tx.lock() {
            tx.take();
        }
        let children = match self.children.lock() {
            Ok(mut c) => std::mem::take(&mut *c),
            Err(_) => Vec::new(),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cloneable cancellation handle. All clones observe the same state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Token that is cancelled when `self` is, or on its own.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        if let Ok(mut children) = self.inner.children.lock() {
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Parent may have been cancelled between the check and the push.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Child token that additionally cancels itself after `timeout`.
    ///
    /// The timer thread holds only a weak reference: it exits as soon as the child is cancelled
    /// or its last clone is dropped.
    pub fn with_timeout(&self, timeout: Duration) -> CancelToken {
        let child = self.child();
        let target = Arc::downgrade(&child.inner);
        let done = child.inner.done_rx.clone();
        thread::spawn(move || {
            select! {
                recv(after(timeout)) -> _ => {
                    if let Some(inner) = target.upgrade() {
                        log::debug!("deadline of {:?} reached, cancelling", timeout);
                        inner.cancel();
                    }
                }
                recv(done) -> _ => {}
            }
        });
        child
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Channel that becomes ready (disconnected) once the token is cancelled.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// `Err(StageSignal::Cancelled)` when cancelled, for use with `?` inside transforms.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            return Err(crate::stage::StageSignal::Cancelled.into());
        }
        Ok(())
    }

    /// Send `value` unless the token fires first or the receiver is gone. Returns true when sent.
    pub fn send<T>(&self, tx: &Sender<T>, value: T) -> bool {
        if self.is_cancelled() {
            return false;
        }
        select! {
            send(tx, value) -> res => res.is_ok(),
            recv(self.done()) -> _ => false,
        }
    }

    /// Receive the next value unless the token fires first or the channel is closed and drained.
    pub fn recv<T>(&self, rx: &Receiver<T>) -> Option<T> {
        if self.is_cancelled() {
            return None;
        }
        select! {
            recv(rx) -> msg => msg.ok(),
            recv(self.done()) -> _ => None,
        }
    }
}
