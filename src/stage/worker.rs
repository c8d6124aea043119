//! Stage: a named pool of worker threads applying one transform to a shared input channel.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::signal::{Outcome, classify};
use crate::cancel::CancelToken;

/// Transform applied by every worker of a stage.
pub type Transform<In, Out> = Arc<dyn Fn(&CancelToken, In) -> anyhow::Result<Out> + Send + Sync>;

/// Value sent downstream when the transform fails with an ordinary error.
type Fallback<In, Out> = Arc<dyn Fn(&In) -> Out + Send + Sync>;

/// Short description of an input, logged when it is dropped.
type InputLabel<In> = Arc<dyn Fn(&In) -> String + Send + Sync>;

/// A bounded worker pool. Build with [`Stage::new`] (same type in and out, failures pass the
/// original element through) or [`Stage::mapping`] (failures drop the element unless a fallback
/// is installed with [`Stage::with_fallback`]).
pub struct Stage<In, Out> {
    name: String,
    concurrency: usize,
    transform: Transform<In, Out>,
    fallback: Option<Fallback<In, Out>>,
    label: Option<InputLabel<In>>,
}

impl<In, Out> Clone for Stage<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            concurrency: self.concurrency,
            transform: Arc::clone(&self.transform),
            fallback: self.fallback.clone(),
            label: self.label.clone(),
        }
    }
}

impl<T> Stage<T, T>
where
    T: Clone + Debug + Send + 'static,
{
    /// Same-type stage with passthrough: a failed element is re-emitted unchanged.
    pub fn new<F>(name: impl Into<String>, concurrency: usize, f: F) -> Self
    where
        F: Fn(&CancelToken, T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Stage::mapping(name, concurrency, f).with_fallback(T::clone)
    }

    /// Stage that forwards every element untouched.
    pub fn identity(name: impl Into<String>, concurrency: usize) -> Self {
        Stage::new(name, concurrency, |_, x| Ok(x))
    }
}

impl<In, Out> Stage<In, Out>
where
    In: Send + 'static,
    Out: Debug + Send + 'static,
{
    /// Heterogeneous stage. Concurrency below 1 is raised to 1.
    pub fn mapping<F>(name: impl Into<String>, concurrency: usize, f: F) -> Self
    where
        F: Fn(&CancelToken, In) -> anyhow::Result<Out> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            concurrency: concurrency.max(1),
            transform: Arc::new(f),
            fallback: None,
            label: None,
        }
    }

    /// Send `f(&input)` downstream when the transform fails. `f` runs before the transform
    /// consumes the input.
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&In) -> Out + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(f));
        self
    }

    /// Name dropped inputs in the warning. Only computed for elements that are dropped and only
    /// for stages without a fallback.
    pub fn with_input_label<F>(mut self, f: F) -> Self
    where
        F: Fn(&In) -> String + Send + Sync + 'static,
    {
        self.label = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn passes_through(&self) -> bool {
        self.fallback.is_some()
    }

    /// Spawn `concurrency` workers reading `input` and writing `output`. `output` is moved in and
    /// only cloned into the workers, so the output channel disconnects exactly when the last
    /// worker exits.
    pub fn start(
        &self,
        token: &CancelToken,
        input: Receiver<In>,
        output: Sender<Out>,
    ) -> StageHandle {
        debug!("{}: starting {} workers", self.name, self.concurrency);
        let workers = (0..self.concurrency)
            .map(|id| {
                let stage = self.clone();
                let token = token.clone();
                let input = input.clone();
                let output = output.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", self.name, id))
                    .spawn(move || stage.worker_loop(&token, input, output))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("{}: failed to spawn worker: {}", self.name, e);
                    None
                }
            })
            .collect();
        drop(output);
        StageHandle {
            name: self.name.clone(),
            workers,
        }
    }

    fn worker_loop(&self, token: &CancelToken, input: Receiver<In>, output: Sender<Out>) {
        while let Some(x) = token.recv(&input) {
            if token.is_cancelled() {
                return;
            }
            // The transform consumes the input: fallback and label are taken beforehand.
            let (fallback, desc) = match (&self.fallback, &self.label) {
                (Some(f), _) => (Some(f(&x)), None),
                (None, Some(label)) => (None, Some(label(&x))),
                (None, None) => (None, None),
            };
            let result = match (self.transform)(token, x) {
                Ok(y) => y,
                Err(err) => match classify(&err) {
                    Outcome::Reject => continue,
                    Outcome::Cancelled => return,
                    Outcome::Failed => match fallback {
                        Some(original) => {
                            warn!("{}: in={:?} err={:#}", self.name, original, err);
                            original
                        }
                        None => {
                            match desc {
                                Some(desc) => warn!(
                                    "{}: in={} err={:#}; dropped, no fallback for this stage",
                                    self.name, desc, err
                                ),
                                None => warn!(
                                    "{}: err={:#}; dropped, no fallback for this stage",
                                    self.name, err
                                ),
                            }
                            continue;
                        }
                    },
                },
            };
            if !token.send(&output, result) {
                return;
            }
        }
    }
}

/// Worker threads of a started stage.
pub struct StageHandle {
    name: String,
    workers: Vec<JoinHandle<()>>,
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit. Errors if any worker panicked.
    pub fn join(self) -> anyhow::Result<()> {
        let mut panicked = 0;
        for h in self.workers {
            if h.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            anyhow::bail!("{}: {} worker(s) panicked", self.name, panicked);
        }
        Ok(())
    }
}
