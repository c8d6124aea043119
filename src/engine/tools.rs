//! Path, pattern and text utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Prefix marking "read this value from a file" (`@script.sh`).
pub const FILE_MARK: char = '@';

/// Path that stands for stdin in roots and index files.
pub const STDIN_MARK: &str = "-";

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_chars(&p, &t)
}

fn glob_match_chars(p: &[char], t: &[char]) -> bool {
    match p.split_first() {
        None => t.is_empty(),
        Some(('*', rest)) => {
            if rest.is_empty() {
                return true; // trailing * matches everything
            }
            (0..=t.len()).any(|i| glob_match_chars(rest, &t[i..]))
        }
        Some(('?', rest)) => !t.is_empty() && glob_match_chars(rest, &t[1..]),
        Some((c, rest)) => t.first() == Some(c) && glob_match_chars(rest, &t[1..]),
    }
}

/// Replace `$NAME` and `${NAME}` with environment values. Unset variables expand to "".
pub fn expand_env(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                out.push_str("${");
                out.push_str(&name);
                continue;
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
                continue;
            }
            name
        };
        out.push_str(&std::env::var(&name).unwrap_or_default());
    }
    out
}

pub fn expand_env_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) if s.contains('$') => PathBuf::from(expand_env(s)),
        _ => path.to_path_buf(),
    }
}

/// `@FILE` → contents of FILE; anything else is returned as is.
pub fn read_file_or_literal(s: &str) -> Result<String> {
    match s.strip_prefix(FILE_MARK) {
        Some(file) => {
            std::fs::read_to_string(file).with_context(|| format!("read {}", file))
        }
        None => Ok(s.to_string()),
    }
}

pub fn is_stdin_mark(path: &Path) -> bool {
    path.as_os_str() == STDIN_MARK
}
