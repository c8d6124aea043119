//! Metasift CLI: walk, probe, select, print.

use anyhow::Result;
use clap::Parser;
use metasift::engine::arg_parser::Cli;
use metasift::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
