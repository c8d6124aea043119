pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod settings_toml;

pub use config::*;
pub use fd_limit::{FDS_PER_PROBE, probe_workers_per_stage, soft_fd_limit};
pub use logger::{log_level, setup_logging};
pub use settings_toml::{apply_file_to_opts, load_settings_toml};
