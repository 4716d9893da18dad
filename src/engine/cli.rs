//! CLI command handler: run one directory or every configured stage; --status / --reset manage checkpoints.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::PipelineOpts;
use crate::checkpoint::CheckpointStore;
use crate::engine::arg_parser::Cli;
use crate::engine::progress::{create_counter, finish_bar, progress_callback};
use crate::pipeline::{PipelineRunner, report_skipped_and_failed};
use crate::stage::Stage;
use crate::utils::enricher_toml::{
    EnricherToml, apply_file_to_opts, load_enricher_toml, secs_to_duration, stages_from_file,
};
use crate::utils::{apply_env_to_opts, load_dotenv, setup_logging};

/// Defaults ← config file ← environment ← CLI flags.
fn setup_opts(cli: &Cli, file: Option<&EnricherToml>) -> Result<PipelineOpts> {
    let mut opts = PipelineOpts::default();
    if let Some(file) = file {
        apply_file_to_opts(file, &mut opts);
    }
    apply_env_to_opts(&mut opts)?;
    if let Some(v) = cli.queue_size {
        opts.queue_size = v;
    }
    if let Some(v) = cli.checkpoint_interval {
        opts.checkpoint_interval = v;
    }
    if let Some(v) = cli.workers {
        opts.max_concurrent_requests = v;
    }
    if let Some(ref dir) = cli.checkpoint_dir {
        opts.checkpoint_dir = dir.clone();
    }
    if cli.fresh {
        opts.resume = false;
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    opts.validate()?;
    Ok(opts)
}

/// Apply CLI limit flags on top of a stage's own settings.
fn apply_cli_limits(cli: &Cli, stage: &mut Stage) -> Result<()> {
    match (cli.rate_permits, cli.rate_period) {
        (Some(permits), period) => {
            let period = secs_to_duration(period.unwrap_or(1.0))?;
            stage.limits.rate = Some((permits, period));
        }
        (None, Some(secs)) => {
            let period = secs_to_duration(secs)?;
            match stage.limits.rate.as_mut() {
                Some(rate) => rate.1 = period,
                None => bail!("--rate-period needs --rate-permits"),
            }
        }
        (None, None) => {}
    }
    if let Some(v) = cli.max_sessions {
        stage.limits.max_concurrent_sessions = Some(v);
    }
    if let Some(secs) = cli.timeout {
        stage.timeout = Some(secs_to_duration(secs)?);
    }
    if let Some(ref output) = cli.output {
        stage.output = Some(output.clone());
    }
    Ok(())
}

/// Stages to act on: the single DIR from the command line, or the config file's `[[stage]]`s.
fn setup_stages(cli: &Cli, file: Option<&EnricherToml>) -> Result<Vec<Stage>> {
    let mut stages = match &cli.dir {
        Some(dir) => {
            let label = cli
                .dataset_label()
                .with_context(|| format!("cannot derive a label from {}; use --label", dir.display()))?;
            vec![Stage::new(&label, dir, cli.exec.clone())]
        }
        None => match file {
            Some(file) => stages_from_file(file)?,
            None => Vec::new(),
        },
    };
    if stages.is_empty() {
        bail!("no DIR given and no [[stage]] configured");
    }
    for stage in &mut stages {
        apply_cli_limits(cli, stage)?;
    }
    Ok(stages)
}

fn print_status(store: &CheckpointStore, stages: &[Stage]) {
    for stage in stages {
        let path = store.path_for(&stage.label);
        if !path.exists() {
            println!("{}: no checkpoint", stage.label.cyan());
            continue;
        }
        let state = store.load(&stage.label);
        println!(
            "{}: {} files done, {} items recorded, {} processed in total{}",
            stage.label.cyan(),
            state.processed_files.len(),
            state.recorded_items(),
            state.total_processed,
            state
                .current_file
                .as_deref()
                .map(|f| format!(", last file {f}"))
                .unwrap_or_default()
        );
    }
}

fn reset_checkpoints(store: &CheckpointStore, stages: &[Stage]) -> Result<()> {
    for stage in stages {
        if store.remove(&stage.label)? {
            info!("{}: checkpoint removed", stage.label);
        } else {
            info!("{}: no checkpoint to remove", stage.label);
        }
    }
    Ok(())
}

/// Run every stage in order. Ctrl+C stops scanning; queued items drain and the checkpoint is saved.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose.unwrap_or(false));
    let cwd = std::env::current_dir().context("resolve working directory")?;
    load_dotenv(&cwd);
    let file = load_enricher_toml(&cwd, cli.config.as_deref())?;
    let opts = setup_opts(cli, file.as_ref())?;
    let stages = setup_stages(cli, file.as_ref())?;
    debug!("{:#?}", opts);

    if cli.status {
        print_status(&CheckpointStore::at(&opts.checkpoint_dir), &stages);
        return Ok(());
    }
    let store = Arc::new(CheckpointStore::open(&opts.checkpoint_dir)?);
    if cli.reset {
        return reset_checkpoints(&store, &stages);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        cancel_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    for stage in &stages {
        if stage.command.is_empty() {
            bail!("stage {}: no enrichment command (use --exec CMD)", stage.label);
        }
        let mut runner = PipelineRunner::with_store(stage.opts(&opts), Arc::clone(&store))?
            .with_cancel_flag(Arc::clone(&cancel));
        let bar = opts.verbose.then(|| create_counter("Enriching"));
        if let Some(bar) = &bar {
            runner = runner.on_success(progress_callback(bar));
        }
        info!("Stage {} starting", stage.label);
        let outcome = stage.run(&mut runner)?;
        if let Some(bar) = &bar {
            finish_bar(bar);
        }
        if outcome.nothing_to_do() {
            info!("{}: nothing to do", stage.label);
        }
        report_skipped_and_failed(&stage.label, &outcome, opts.verbose);
        if cancel.load(Ordering::Relaxed) {
            warn!("Cancelled by user; progress was checkpointed");
            bail!("enrichment cancelled by user during stage {}", stage.label);
        }
        info!("Stage {} complete", stage.label);
    }
    Ok(())
}
