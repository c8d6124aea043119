//! Record: the mapping-typed metadata that flows through the pipeline for one entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Entry;

/// Format of `mod_time`.
pub const MOD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata for one entry. Stages only add or overwrite keys; nothing removes them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Initial record for an entry: path parts, size, permission bits, mtime, archive fields.
    pub fn from_entry(entry: &Entry) -> Self {
        let info = entry.info();
        let path = entry.path().to_string_lossy().into_owned();
        let dir = match entry.path().parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        let ext = extension(&info.name).to_string();
        let basename = info.name.strip_suffix(&ext).unwrap_or(&info.name).to_string();
        let basepath = path.strip_suffix(&ext).unwrap_or(&path).to_string();

        let mut r = Record::new();
        r.set("path", path);
        r.set("dir", dir);
        r.set("name", info.name.clone());
        r.set("ext", ext);
        r.set("basename", basename);
        r.set("basepath", basepath);
        r.set("size", info.size);
        r.set("mode", format!("{:o}", info.mode));
        r.set("mod_time", info.modified.format(MOD_TIME_FORMAT).to_string());
        r.set("mod_time_ts", info.modified.timestamp());
        if let Some(z) = entry.archive() {
            r.set("zip_root", z.root.to_string_lossy().into_owned());
            r.set("zip_rel_path", z.rel_path.clone());
            r.set("zip_compressed_size", z.compressed_size);
            r.set("zip_uncompressed_size", z.uncompressed_size);
            r.set("zip_comment", z.comment.clone());
            r.set("zip_non_utf8", z.non_utf8);
        }
        r
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// `path` field as a string, if present.
    pub fn path(&self) -> Option<&str> {
        self.0.get("path").and_then(Value::as_str)
    }

    /// Field rendered as text: strings as-is, other scalars via JSON.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Merge `fragment` as a nested object under `namespace`.
    pub fn merge(&mut self, namespace: impl Into<String>, fragment: Record) {
        self.0.insert(namespace.into(), Value::Object(fragment.0));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(m: Map<String, Value>) -> Self {
        Self(m)
    }
}

/// Extension including the dot, taken from the last `.` of `name` (`""` when none).
pub fn extension(name: &str) -> &str {
    name.rfind('.').map(|i| &name[i..]).unwrap_or("")
}
