//! Read records from JSONL instead of walking.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;
use crate::engine::tools::is_stdin_mark;
use crate::record::Record;

pub type IndexInput = Box<dyn BufRead + Send>;

/// Open index files in order. `-` (stdin) must be the only input.
pub fn open_index_inputs(paths: &[PathBuf]) -> Result<Vec<IndexInput>> {
    if paths.iter().any(|p| is_stdin_mark(p)) {
        if paths.len() > 1 {
            anyhow::bail!("no other index files can be given together with - (stdin)");
        }
        return Ok(vec![Box::new(BufReader::new(std::io::stdin()))]);
    }
    paths
        .iter()
        .map(|p| {
            let f = File::open(p).with_context(|| format!("open index {}", p.display()))?;
            Ok(Box::new(BufReader::new(f)) as IndexInput)
        })
        .collect()
}

/// Spawn a reader thread parsing one JSON object per line into records. Malformed lines are
/// skipped with a warning; a read error stops the reader and is returned on join.
pub fn spawn_index_reader(
    inputs: Vec<IndexInput>,
    token: &CancelToken,
    channel_cap: usize,
) -> (Receiver<Record>, JoinHandle<Result<usize>>) {
    let (tx, rx) = bounded::<Record>(channel_cap);
    let token = token.clone();
    let handle = thread::spawn(move || {
        let mut count = 0_usize;
        for input in inputs {
            for line in input.lines() {
                if token.is_cancelled() {
                    return Ok(count);
                }
                let line = line.context("read index")?;
                if line.trim().is_empty() {
                    continue;
                }
                let map = match serde_json::from_str::<Map<String, Value>>(&line) {
                    Ok(map) => map,
                    Err(e) => {
                        warn!("index: skip malformed line: {}", e);
                        continue;
                    }
                };
                if !token.send(&tx, Record::from(map)) {
                    return Ok(count);
                }
                count += 1;
            }
        }
        debug!("index: read {} records", count);
        Ok(count)
    });
    (rx, handle)
}
