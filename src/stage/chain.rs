//! Chain: stages of one element type run back to back with bounded buffers in between.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::debug;
use std::fmt::Debug;

use super::worker::{Stage, StageHandle};
use crate::cancel::CancelToken;

pub struct Chain<T> {
    stages: Vec<Stage<T, T>>,
    buffer_size: usize,
}

impl<T> Chain<T>
where
    T: Clone + Debug + Send + 'static,
{
    pub fn new(stages: Vec<Stage<T, T>>, buffer_size: usize) -> Self {
        Self {
            stages,
            buffer_size,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Start every stage. With no stages a no-op stage still copies `input` to `output`; with
    /// one stage `input` feeds it directly; otherwise adjacent stages share a channel of
    /// `buffer_size` slots, so a slow stage blocks the one before it.
    pub fn start(&self, token: &CancelToken, input: Receiver<T>, output: Sender<T>) -> ChainHandle {
        let stages = match self.stages.len() {
            0 => {
                debug!("chain: no stages, forwarding input unchanged");
                let noop = Stage::identity("noop", 1);
                vec![noop.start(token, input, output)]
            }
            1 => vec![self.stages[0].start(token, input, output)],
            n => {
                let mut handles = Vec::with_capacity(n);
                let mut rx = input;
                for stage in &self.stages[..n - 1] {
                    let (tx, next_rx) = bounded::<T>(self.buffer_size);
                    handles.push(stage.start(token, rx, tx));
                    rx = next_rx;
                }
                handles.push(self.stages[n - 1].start(token, rx, output));
                handles
            }
        };
        ChainHandle { stages }
    }
}

/// Handles of every stage started by [`Chain::start`], upstream first.
pub struct ChainHandle {
    stages: Vec<StageHandle>,
}

impl ChainHandle {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(StageHandle::name).collect()
    }

    /// Join all stages in order. Returns the first failure after joining everything.
    pub fn join(self) -> anyhow::Result<()> {
        let mut first_err = None;
        for h in self.stages {
            if let Err(e) = h.join() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
