use anyhow::Result;

use crate::Opts;
use crate::walk::WalkError;

/// After the run is joined: if strict, walk errors fail the run; otherwise log them.
pub fn check_walk_errors(opts: &Opts, walk_err: Option<WalkError>) -> Result<()> {
    let Some(err) = walk_err else {
        return Ok(());
    };
    if opts.strict {
        return Err(anyhow::anyhow!("{}", err));
    }
    let errors = err.errors();
    log::warn!("Skipped {} paths due to errors during the walk", errors.len());
    for e in errors {
        log::warn!("  skipped: {}", e);
    }
    Ok(())
}
