//! Pipeline components: sources, orchestration, walk error reporting.

pub mod context;
pub mod error_handler;
pub mod orchestrator;

pub use context::{PipelineHandles, PipelineTuning, Source, SourceError, SourceHandle};
pub use error_handler::check_walk_errors;
pub use orchestrator::{
    FindSummary, build_exclude, build_probe_stages, find, is_selected, run_pipeline,
};
