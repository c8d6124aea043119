//! Writing selected records.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::record::Record;

/// Buffered writer to `out`, or stdout when None.
pub fn open_output(out: Option<&Path>) -> Result<Box<dyn Write>> {
    match out {
        Some(p) => {
            let f = File::create(p).with_context(|| format!("create output {}", p.display()))?;
            Ok(Box::new(BufWriter::new(f)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}

/// One line per record: the whole record as JSON, or just its path.
pub fn write_record(w: &mut dyn Write, record: &Record, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *w, record).context("encode record")?;
        writeln!(w)?;
    } else {
        writeln!(w, "{}", record.path().unwrap_or_default())?;
    }
    Ok(())
}
