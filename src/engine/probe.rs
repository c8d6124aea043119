//! Probes: per-path metadata from an external command, merged into records by a stage.

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde_json::{Map, Value};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::metric::METRICS;
use crate::record::Record;
use crate::stage::{Stage, StageSignal};

/// Replaced by the quoted path in probe scripts.
pub const ARG_LITERAL: &str = "@ARG";
/// Replaced by the unquoted path in probe scripts.
pub const RAW_ARG_LITERAL: &str = "@RAWARG";

/// How often a running probe process is checked for exit.
const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Produces a metadata fragment for one path.
pub trait Probe: Send + Sync {
    fn probe(&self, token: &CancelToken, path: &str) -> Result<Record>;
}

/// Stage that merges `probe`'s fragment into each record under `name`. When the probe fails the
/// record continues unchanged.
pub fn probe_stage(
    name: impl Into<String>,
    concurrency: usize,
    probe: Arc<dyn Probe>,
) -> Stage<Record, Record> {
    let name = name.into();
    let namespace = name.clone();
    Stage::new(name, concurrency, move |token, mut record: Record| {
        let path = record
            .path()
            .ok_or_else(|| anyhow!("record has no path"))?
            .to_string();
        let fragment = probe.probe(token, &path)?;
        record.merge(namespace.clone(), fragment);
        Ok(record)
    })
}

/// Default name of the probe at `index` when none is given.
pub fn default_probe_name(index: usize) -> String {
    format!("p{}", index)
}

pub fn replace_script_literals(script: &str) -> String {
    // RAWARG first: it contains ARG.
    script
        .replace(RAW_ARG_LITERAL, "$1")
        .replace(ARG_LITERAL, "\"$1\"")
}

/// Runs `<shell> [args..] -c <script> <shell> <path>`, so the script sees the path as `$1`.
/// Stdout must be a JSON object or `key=value` lines.
#[derive(Clone, Debug)]
pub struct ScriptProbe {
    shell: String,
    shell_args: Vec<String>,
    script: String,
}

impl ScriptProbe {
    pub fn new(script: &str, shell: &str, shell_args: &[String]) -> Self {
        debug!("script probe: shell={} {:?} script={}", shell, shell_args, script);
        METRICS.probe_script.incr();
        Self {
            shell: shell.to_string(),
            shell_args: shell_args.to_vec(),
            script: replace_script_literals(script),
        }
    }

    fn spawn(&self, path: &str) -> Result<Child> {
        Command::new(&self.shell)
            .args(&self.shell_args)
            .arg("-c")
            .arg(&self.script)
            .arg(&self.shell)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.shell))
    }

    fn run(&self, token: &CancelToken, path: &str) -> Result<Record> {
        token.check()?;
        let mut child = self.spawn(path)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_cancellable(&mut child, token)?;
        let out = stdout
            .join()
            .map_err(|_| anyhow!("probe stdout reader panicked"))?;
        let err = stderr.join().unwrap_or_default();
        if !status.success() {
            bail!(
                "probe {}: {}: {}",
                path,
                status,
                String::from_utf8_lossy(&err).trim()
            );
        }
        parse_output(&out).with_context(|| format!("probe {}", path))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

/// Wait for `child`, killing it if `token` fires first.
fn wait_cancellable(child: &mut Child, token: &CancelToken) -> Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait().context("wait probe")? {
            return Ok(status);
        }
        // Returns at once when the token is cancelled, otherwise after the poll interval.
        let _ = token.done().recv_timeout(PROBE_POLL_INTERVAL);
        if token.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StageSignal::Cancelled.into());
        }
    }
}

impl Probe for ScriptProbe {
    fn probe(&self, token: &CancelToken, path: &str) -> Result<Record> {
        METRICS.probe.incr();
        let result = self.run(token, path);
        match &result {
            Ok(_) => METRICS.probe_success.incr(),
            Err(_) => METRICS.probe_failure.incr(),
        }
        result
    }
}

/// JSON object, else `key=value` per line. Empty output is an error.
pub fn parse_output(out: &[u8]) -> Result<Record> {
    if let Ok(map) = serde_json::from_slice::<Map<String, Value>>(out)
        && !map.is_empty()
    {
        return Ok(Record::from(map));
    }
    let text = String::from_utf8_lossy(out);
    let mut record = Record::new();
    for line in text.lines() {
        if let Some((k, v)) = line.split_once('=') {
            let k = k.trim();
            if !k.is_empty() {
                record.set(k, v.trim());
            }
        }
    }
    if record.is_empty() {
        bail!("parse: {:?}", text.trim());
    }
    Ok(record)
}
