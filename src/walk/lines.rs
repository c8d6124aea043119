//! Walk driven by newline-delimited paths read from a stream (usually stdin).

use log::{debug, warn};
use std::io::{BufRead, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::tree::TreeWalker;
use super::{Entries, ErrorLog, WalkError, Walker};
use crate::engine::tools::expand_env;
use crate::metric::METRICS;
use crate::{Entry, FileInfo};

type SharedReader = Arc<Mutex<Option<Box<dyn BufRead + Send>>>>;

/// Reads paths line by line: files are emitted, directories are walked with the inner
/// [`TreeWalker`], missing paths are skipped. The `root` passed to `walk` is ignored.
pub struct LineWalker {
    reader: SharedReader,
    inner: TreeWalker,
    errors: ErrorLog,
}

impl LineWalker {
    pub fn new<R>(reader: R, inner: TreeWalker) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self {
            reader: Arc::new(Mutex::new(Some(Box::new(reader)))),
            inner,
            errors: ErrorLog::default(),
        }
    }
}

impl Walker for LineWalker {
    fn walk(&mut self, _root: &Path) -> Entries {
        METRICS.walk.incr();
        self.errors = ErrorLog::default();
        let errors = self.errors.clone();
        let slot = Arc::clone(&self.reader);
        let mut inner = self.inner.clone();
        Entries::spawn(move |cancel, tx| {
            // The reader is taken out for the walk so no lock is held while blocked on input.
            let taken = match slot.lock() {
                Ok(mut r) => r.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            let Some(mut reader) = taken else {
                debug!("line walk: reader already consumed");
                return;
            };

            // Lines are bytes: a path that is not UTF-8 is still a path.
            let mut line = Vec::new();
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        errors.push(WalkError::Read(e.to_string()));
                        break;
                    }
                }
                let raw = trim_line_end(&line);
                if raw.is_empty() {
                    continue;
                }
                METRICS.walk_call.incr();
                let path = line_to_path(raw);
                let meta = match std::fs::metadata(&path) {
                    Ok(meta) => meta,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!("line walk: skip missing {}", path.display());
                        continue;
                    }
                    Err(e) => {
                        errors.push(WalkError::at(&path, &e));
                        continue;
                    }
                };

                if meta.is_dir() {
                    let entries = inner.walk(&path);
                    while let Some(entry) = entries.recv_until(cancel) {
                        if !cancel.send(tx, entry) {
                            break;
                        }
                    }
                    drop(entries);
                    if let Some(err) = inner.err() {
                        warn!("line walk: {}: {}", path.display(), err);
                    }
                    continue;
                }

                let info = FileInfo::from_metadata(&path, &meta);
                METRICS.walk_entry.incr();
                if !cancel.send(tx, Entry::new(path, info)) {
                    break;
                }
            }

            if let Ok(mut r) = slot.lock() {
                *r = Some(reader);
            }
        })
    }

    fn err(&self) -> Option<WalkError> {
        self.errors.snapshot()
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// UTF-8 lines get `$VAR` expansion; other byte strings are used as they are.
fn line_to_path(raw: &[u8]) -> PathBuf {
    match std::str::from_utf8(raw) {
        Ok(s) => PathBuf::from(expand_env(s)),
        Err(_) => raw_path(raw),
    }
}

#[cfg(unix)]
fn raw_path(raw: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(raw))
}

#[cfg(not(unix))]
fn raw_path(raw: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(raw).into_owned())
}
