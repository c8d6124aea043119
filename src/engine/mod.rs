//! Engine: CLI, probes, predicates, input/output helpers.

pub mod arg_parser;
pub mod cli;
pub mod index_reader;
pub mod output;
pub mod predicate;
pub mod probe;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cli::{build_opts, handle_run};
pub use predicate::{Condition, MatchMode, Matcher, Predicate, PredicateFn};
pub use probe::{Probe, ScriptProbe, parse_output, probe_stage, replace_script_literals};
pub use tools::{expand_env, glob_match, read_file_or_literal};
