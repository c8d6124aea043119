//! Error taxonomy for stage transforms.

use thiserror::Error;

/// Sentinel errors a transform returns to steer the worker loop instead of reporting a failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSignal {
    /// Drop this element. Not an error.
    #[error("rejected")]
    Reject,
    /// The run is being cancelled; stop the worker without logging.
    #[error("cancelled")]
    Cancelled,
}

/// What a worker does with the result of one transform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reject,
    Cancelled,
    Failed,
}

/// Classify a transform error. Signals are found anywhere in the context chain, so a transform
/// may wrap them with `.context(..)` without changing how they are handled.
pub fn classify(err: &anyhow::Error) -> Outcome {
    let signal = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<StageSignal>().copied());
    match signal {
        Some(StageSignal::Cancelled) => Outcome::Cancelled,
        Some(StageSignal::Reject) => Outcome::Reject,
        None => Outcome::Failed,
    }
}
