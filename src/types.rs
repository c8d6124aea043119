//! Public types for discovered entries and run options.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Raw metadata of one file, directory or archive member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name (last path component).
    pub name: String,
    pub size: u64,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    pub modified: DateTime<Local>,
    pub is_dir: bool,
}

impl FileInfo {
    /// Build from `std::fs::Metadata` of `path`.
    pub fn from_metadata(path: &Path, meta: &std::fs::Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let modified = meta
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| DateTime::<Local>::from(std::time::UNIX_EPOCH));
        Self {
            name,
            size: meta.len(),
            mode: permission_bits(meta),
            modified,
            is_dir: meta.is_dir(),
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Zip-specific metadata carried by entries from [`ArchiveWalker`](crate::walk::ArchiveWalker).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path of the archive itself.
    pub root: PathBuf,
    /// Member name inside the archive.
    pub rel_path: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub comment: String,
    /// Member name is not valid UTF-8.
    pub non_utf8: bool,
}

/// One discovered item. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    path: PathBuf,
    info: FileInfo,
    archive: Option<ArchiveMember>,
}

impl Entry {
    pub fn new(path: PathBuf, info: FileInfo) -> Self {
        Self {
            path,
            info,
            archive: None,
        }
    }

    pub fn in_archive(path: PathBuf, info: FileInfo, member: ArchiveMember) -> Self {
        Self {
            path,
            info,
            archive: Some(member),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn archive(&self) -> Option<&ArchiveMember> {
        self.archive.as_ref()
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir
    }
}

/// One probe to run per record: its result is merged under `name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSpec {
    pub name: String,
    pub script: String,
}

/// Full run options (CLI, config file, or lib callers).
#[derive(Clone, Debug, Default)]
pub struct Opts {
    /// Root paths; `-` reads paths from stdin.
    pub roots: Vec<PathBuf>,
    /// Zip archives to walk instead of `roots`.
    pub archives: Vec<PathBuf>,
    /// JSONL record files to read instead of walking; `-` is stdin.
    pub index: Vec<PathBuf>,
    /// Workers per stage. Derived from available threads and FD limit when None.
    pub workers: Option<usize>,
    /// Capacity of channels between stages.
    pub buffer_size: usize,
    /// Shell and leading arguments used to run probe scripts.
    pub shell: Vec<String>,
    pub probes: Vec<ProbeSpec>,
    /// Conditions excluding paths during the walk (any match excludes).
    pub exclude: Vec<String>,
    /// Conditions a record must satisfy to be output (all must match).
    pub select: Vec<String>,
    /// Print each record as JSON instead of its path.
    pub json: bool,
    /// Output file; stdout when None.
    pub out: Option<PathBuf>,
    /// Cancel the run after this many seconds.
    pub timeout_secs: Option<u64>,
    /// Fail the run when the walk recorded errors.
    pub strict: bool,
    pub verbose: bool,
    pub quiet: bool,
}
