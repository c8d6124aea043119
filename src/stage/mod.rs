//! Bounded worker pools and their sequential composition.

pub mod chain;
pub mod signal;
pub mod worker;

pub use chain::{Chain, ChainHandle};
pub use signal::{Outcome, StageSignal, classify};
pub use worker::{Stage, StageHandle, Transform};
