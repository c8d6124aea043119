//! Load `.metasift.toml` (CLI only). Lib callers build [`Opts`] themselves.
//!
//! ```toml
//! [settings]
//! roots = ["$HOME/music"]
//! workers = 8
//! shell = ["bash"]
//! exclude = ["*.tmp", "name=.git"]
//! select = ["ext=.m4a"]
//!
//! [[probe]]
//! name = "ff"
//! script = "ffprobe -v error -show_entries format -of json=c=1 @ARG"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::probe::default_probe_name;
use crate::engine::tools::read_file_or_literal;
use crate::{Opts, ProbeSpec};

#[derive(Debug, Default, Deserialize)]
pub struct SettingsToml {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    probe: Vec<ProbeSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    roots: Option<Vec<PathBuf>>,
    archives: Option<Vec<PathBuf>>,
    index: Option<Vec<PathBuf>>,
    workers: Option<usize>,
    buffer_size: Option<usize>,
    shell: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    select: Option<Vec<String>>,
    json: Option<bool>,
    out: Option<PathBuf>,
    timeout: Option<u64>,
    strict: Option<bool>,
    verbose: Option<bool>,
    quiet: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ProbeSection {
    name: Option<String>,
    script: String,
}

/// Load the settings file: `explicit` must exist; otherwise `.metasift.toml` in `dir` is used
/// when present.
pub fn load_settings_toml(explicit: Option<&Path>, dir: &Path) -> Result<Option<SettingsToml>> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = dir.join(crate::utils::PackagePaths::get().config_filename());
            if !p.is_file() {
                return Ok(None);
            }
            p
        }
    };
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let parsed =
        toml::from_str(&s).with_context(|| format!("parse config {}", path.display()))?;
    log::debug!("loaded config {}", path.display());
    Ok(Some(parsed))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($idx:expr, $opts:expr, $idx_field:ident => $opts_field:ident) => {
        if let Some(v) = $idx.$idx_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only set fields present in the file). Call before applying CLI.
pub fn apply_file_to_opts(file: &SettingsToml, opts: &mut Opts) -> Result<()> {
    let idx = &file.settings;
    apply_file_opt!(idx, opts, roots => roots);
    apply_file_opt!(idx, opts, archives => archives);
    apply_file_opt!(idx, opts, index => index);
    apply_file_opt!(idx, opts, buffer_size => buffer_size);
    apply_file_opt!(idx, opts, shell => shell);
    apply_file_opt!(idx, opts, exclude => exclude);
    apply_file_opt!(idx, opts, select => select);
    apply_file_opt!(idx, opts, json => json);
    apply_file_opt!(idx, opts, strict => strict);
    apply_file_opt!(idx, opts, verbose => verbose);
    apply_file_opt!(idx, opts, quiet => quiet);
    if let Some(n) = idx.workers {
        opts.workers = Some(n);
    }
    if let Some(ref p) = idx.out {
        opts.out = Some(p.clone());
    }
    if let Some(secs) = idx.timeout {
        opts.timeout_secs = Some(secs);
    }
    if !file.probe.is_empty() {
        opts.probes = file
            .probe
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(ProbeSpec {
                    name: p.name.clone().unwrap_or_else(|| default_probe_name(i)),
                    script: read_file_or_literal(&p.script)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(())
}
