//! Process-wide run counters, dumped as JSON to stderr at the end of a verbose run.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Named monotonic counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    pub fn incr(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Every counter the pipeline maintains.
#[derive(Debug)]
pub struct Metrics {
    /// `Walker::walk` calls.
    pub walk: Counter,
    /// Paths visited by walkers (files, directories, members, lines).
    pub walk_call: Counter,
    /// Directories skipped as non-entries.
    pub walk_dir: Counter,
    /// Entries emitted.
    pub walk_entry: Counter,
    pub walk_exclude: Counter,
    /// Exclusion checks that failed to evaluate.
    pub walk_exclude_err: Counter,
    pub match_run: Counter,
    pub match_err: Counter,
    pub match_true: Counter,
    pub match_false: Counter,
    /// Script probes built.
    pub probe_script: Counter,
    pub probe: Counter,
    pub probe_success: Counter,
    pub probe_failure: Counter,
    /// Records written to the output.
    pub accept: Counter,
}

pub static METRICS: Metrics = Metrics::new();

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            walk: Counter::new("Walk"),
            walk_call: Counter::new("WalkCall"),
            walk_dir: Counter::new("WalkDir"),
            walk_entry: Counter::new("WalkEntry"),
            walk_exclude: Counter::new("WalkExclude"),
            walk_exclude_err: Counter::new("WalkExcludeErr"),
            match_run: Counter::new("MatchRun"),
            match_err: Counter::new("MatchErr"),
            match_true: Counter::new("MatchTrue"),
            match_false: Counter::new("MatchFalse"),
            probe_script: Counter::new("ProbeScript"),
            probe: Counter::new("Probe"),
            probe_success: Counter::new("ProbeSuccess"),
            probe_failure: Counter::new("ProbeFailure"),
            accept: Counter::new("Accept"),
        }
    }

    pub fn counters(&self) -> [&Counter; 15] {
        [
            &self.walk,
            &self.walk_call,
            &self.walk_dir,
            &self.walk_entry,
            &self.walk_exclude,
            &self.walk_exclude_err,
            &self.match_run,
            &self.match_err,
            &self.match_true,
            &self.match_false,
            &self.probe_script,
            &self.probe,
            &self.probe_success,
            &self.probe_failure,
            &self.accept,
        ]
    }

    /// Counter values keyed by name, plus the run duration.
    pub fn snapshot(&self, duration: Duration) -> Value {
        let mut m = Map::new();
        m.insert("Duration".to_string(), Value::from(format!("{:?}", duration)));
        m.insert("DurationSec".to_string(), Value::from(duration.as_secs()));
        for c in self.counters() {
            m.insert(c.name().to_string(), Value::from(c.get()));
        }
        Value::Object(m)
    }
}
