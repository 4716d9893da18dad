//! Enricher CLI: feed directories of JSON records through an enrichment command, resuming from checkpoints.

use anyhow::Result;
use clap::Parser;
use enricher::engine::Cli;
use enricher::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
