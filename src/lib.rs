//! Metasift: find files by metadata with a bounded-concurrency streaming pipeline.
//!
//! Entries come from a [`walk::Walker`] (directory tree, zip archive, or paths read from a
//! stream), become [`Record`]s, pass through a [`stage::Chain`] of enrichment stages, and are
//! filtered by a [`engine::Predicate`]. Every thread observes one [`CancelToken`].

pub mod cancel;
pub mod engine;
pub mod metric;
pub mod pipeline;
pub mod record;
pub mod stage;
pub mod types;
pub mod utils;
pub mod walk;

/// Re-export types for API
pub use cancel::CancelToken;
pub use record::Record;
pub use types::*;

/// Result alias used by public metasift API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
