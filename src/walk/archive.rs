//! Zip archive walk: one entry per non-directory member.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use crossbeam_channel::Sender;
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use zip::ZipArchive;

use super::policy::{SharedPolicy, TraversalPolicy, is_excluded};
use super::{Entries, ErrorLog, WalkError, Walker};
use crate::cancel::CancelToken;
use crate::engine::tools::expand_env_path;
use crate::metric::METRICS;
use crate::{ArchiveMember, Entry, FileInfo};

/// Walks the members of one zip archive. Members are a flat list, so exclusion never prunes.
#[derive(Clone, Default)]
pub struct ArchiveWalker {
    policy: Option<SharedPolicy>,
    errors: ErrorLog,
}

impl ArchiveWalker {
    pub fn new(policy: Option<SharedPolicy>) -> Self {
        Self {
            policy,
            errors: ErrorLog::default(),
        }
    }
}

impl Walker for ArchiveWalker {
    fn walk(&mut self, root: &Path) -> Entries {
        METRICS.walk.incr();
        self.errors = ErrorLog::default();
        let errors = self.errors.clone();
        let root = expand_env_path(root);
        let policy = self.policy.clone();
        Entries::spawn(move |cancel, tx| {
            if let Err(e) = walk_archive(&root, policy.as_deref(), cancel, tx, &errors) {
                errors.push(WalkError::at(&root, format!("{:#}", e)));
            }
        })
    }

    fn err(&self) -> Option<WalkError> {
        self.errors.snapshot()
    }
}

/// Open `path` as a zip archive.
pub fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("open archive {}", path.display()))?;
    ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("read archive {}", path.display()))
}

fn walk_archive(
    root: &Path,
    policy: Option<&dyn TraversalPolicy>,
    cancel: &CancelToken,
    tx: &Sender<Entry>,
    errors: &ErrorLog,
) -> Result<()> {
    let mut archive = open_archive(root)?;
    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            debug!("archive walk of {} cancelled", root.display());
            return Ok(());
        }
        METRICS.walk_call.incr();
        // Raw access: only the central directory is needed, nothing is decompressed.
        let entry = match archive.by_index_raw(i) {
            Ok(file) => {
                let name = file.name().to_string();
                let is_dir = file.is_dir();
                let info = FileInfo {
                    name: base_name(&name),
                    size: file.size(),
                    mode: file
                        .unix_mode()
                        .map(|m| m & 0o7777)
                        .unwrap_or(if is_dir { 0o755 } else { 0o644 }),
                    modified: file
                        .last_modified()
                        .and_then(|t| {
                            zip_time_to_local(
                                t.year(),
                                t.month(),
                                t.day(),
                                t.hour(),
                                t.minute(),
                                t.second(),
                            )
                        })
                        .unwrap_or_else(|| DateTime::<Local>::from(std::time::UNIX_EPOCH)),
                    is_dir,
                };
                let member = ArchiveMember {
                    root: root.to_path_buf(),
                    rel_path: name.clone(),
                    compressed_size: file.compressed_size(),
                    uncompressed_size: file.size(),
                    comment: file.comment().to_string(),
                    non_utf8: std::str::from_utf8(file.name_raw()).is_err(),
                };
                Entry::in_archive(root.join(&name), info, member)
            }
            Err(e) => {
                errors.push(WalkError::at(root, format!("member #{}: {}", i, e)));
                continue;
            }
        };

        if is_excluded(policy, &entry) {
            continue;
        }
        if entry.is_dir() {
            METRICS.walk_dir.incr();
            continue;
        }
        METRICS.walk_entry.incr();
        if !cancel.send(tx, entry) {
            return Ok(());
        }
    }
    Ok(())
}

/// Last component of a member name (`a/b/` → `b`).
fn base_name(member: &str) -> String {
    let trimmed = member.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

/// Zip timestamps carry no zone; read them as local time like the archivers that write them.
fn zip_time_to_local(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Option<DateTime<Local>> {
    let naive = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))?
        .and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))?;
    Local.from_local_datetime(&naive).earliest()
}
