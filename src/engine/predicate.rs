//! Record predicates: exclusion during the walk and final selection.

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::sync::Arc;

use crate::engine::tools::glob_match;
use crate::metric::METRICS;
use crate::record::Record;

/// Boolean test over a record. An error means "could not decide"; callers treat it as
/// excluded (walk) or not selected (output).
pub trait Predicate: Send + Sync {
    fn run(&self, record: &Record) -> Result<bool>;
}

impl<P: Predicate + ?Sized> Predicate for Arc<P> {
    fn run(&self, record: &Record) -> Result<bool> {
        (**self).run(record)
    }
}

impl<P: Predicate + ?Sized> Predicate for Box<P> {
    fn run(&self, record: &Record) -> Result<bool> {
        (**self).run(record)
    }
}

/// Predicate from a closure.
pub struct PredicateFn<F>(pub F);

impl<F> Predicate for PredicateFn<F>
where
    F: Fn(&Record) -> Result<bool> + Send + Sync,
{
    fn run(&self, record: &Record) -> Result<bool> {
        (self.0)(record)
    }
}

/// One `key=glob` / `key!=glob` test, or a bare glob tried against `name` then `path`.
/// Keys may be dotted to reach into probe namespaces (`p0.codec=aac`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Field {
        key: String,
        pattern: String,
        negate: bool,
    },
    NameOrPath(String),
}

impl Condition {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty condition");
        }
        let Some(eq) = s.find('=') else {
            return Ok(Condition::NameOrPath(s.to_string()));
        };
        let (lhs, pattern) = (&s[..eq], &s[eq + 1..]);
        let (key, negate) = match lhs.strip_suffix('!') {
            Some(k) => (k, true),
            None => (lhs, false),
        };
        let is_key = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !is_key {
            // `=` inside a plain pattern, e.g. `a=b*.txt` with an odd left side.
            return Ok(Condition::NameOrPath(s.to_string()));
        }
        Ok(Condition::Field {
            key: key.to_string(),
            pattern: pattern.to_string(),
            negate,
        })
    }

    pub fn eval(&self, record: &Record) -> Result<bool> {
        match self {
            Condition::Field {
                key,
                pattern,
                negate,
            } => {
                let value = lookup(record, key).ok_or_else(|| anyhow!("no field {:?}", key))?;
                Ok(glob_match(pattern, &value) != *negate)
            }
            Condition::NameOrPath(pattern) => {
                let name = record.get_text("name");
                let path = record.get_text("path");
                if name.is_none() && path.is_none() {
                    bail!("record has neither name nor path");
                }
                Ok(name.is_some_and(|n| glob_match(pattern, &n))
                    || path.is_some_and(|p| glob_match(pattern, &p)))
            }
        }
    }
}

/// Text of a possibly dotted key.
fn lookup(record: &Record, key: &str) -> Option<String> {
    let mut parts = key.split('.');
    let mut value = record.get(parts.next()?)?;
    for part in parts {
        value = value.as_object()?.get(part)?;
    }
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchMode {
    /// True when any condition holds.
    Any,
    /// True when every condition holds.
    All,
}

/// Conditions combined with [`MatchMode`]. Evaluation errors propagate.
#[derive(Clone, Debug)]
pub struct Matcher {
    conditions: Vec<Condition>,
    mode: MatchMode,
}

impl Matcher {
    pub fn new(conditions: Vec<Condition>, mode: MatchMode) -> Self {
        Self { conditions, mode }
    }

    pub fn parse<S: AsRef<str>>(conditions: &[S], mode: MatchMode) -> Result<Self> {
        let conditions = conditions
            .iter()
            .map(|c| Condition::parse(c.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(conditions, mode))
    }

    pub fn any<S: AsRef<str>>(conditions: &[S]) -> Result<Self> {
        Self::parse(conditions, MatchMode::Any)
    }

    pub fn all<S: AsRef<str>>(conditions: &[S]) -> Result<Self> {
        Self::parse(conditions, MatchMode::All)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn eval(&self, record: &Record) -> Result<bool> {
        match self.mode {
            MatchMode::Any => {
                for c in &self.conditions {
                    if c.eval(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            MatchMode::All => {
                for c in &self.conditions {
                    if !c.eval(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

impl Predicate for Matcher {
    fn run(&self, record: &Record) -> Result<bool> {
        METRICS.match_run.incr();
        let result = self.eval(record);
        match &result {
            Ok(true) => METRICS.match_true.incr(),
            Ok(false) => METRICS.match_false.incr(),
            Err(_) => METRICS.match_err.incr(),
        }
        result
    }
}
