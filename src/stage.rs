//! Stages: named pipeline runs with their own input directory, external command, limits and output.

use anyhow::{Context, Result};
use log::info;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::{PipelineOutcome, PipelineRunner};
use crate::process::CommandProcessor;
use crate::utils::tempfiles::write_atomic;
use crate::{PipelineOpts, StageLimits};

/// One stage of an enrichment run, e.g. `business profiling` at 2 calls/s with one session.
#[derive(Clone, Debug)]
pub struct Stage {
    /// Dataset label; also names the checkpoint file.
    pub label: String,
    pub dir: PathBuf,
    /// External processor argv (see [`CommandProcessor`]).
    pub command: Vec<String>,
    /// Where to write this run's results as a JSON array. None: results are only counted.
    pub output: Option<PathBuf>,
    pub limits: StageLimits,
    pub timeout: Option<Duration>,
}

impl Stage {
    pub fn new(label: &str, dir: impl AsRef<Path>, command: Vec<String>) -> Self {
        Self {
            label: label.to_string(),
            dir: dir.as_ref().to_path_buf(),
            command,
            output: None,
            limits: StageLimits::default(),
            timeout: None,
        }
    }

    /// Pipeline options for this stage: the shared options with this stage's limits.
    pub fn opts(&self, base: &PipelineOpts) -> PipelineOpts {
        PipelineOpts {
            limits: self.limits,
            ..base.clone()
        }
    }

    /// Run the stage with a prepared runner and write its results.
    pub fn run(&self, runner: &mut PipelineRunner) -> Result<PipelineOutcome> {
        let processor = CommandProcessor::new(&self.command)
            .with_context(|| format!("stage {}", self.label))?
            .with_timeout(self.timeout);
        let outcome = runner.run(&self.label, &self.dir, Arc::new(processor))?;
        if let Some(output) = &self.output {
            write_results(output, &outcome.results)?;
            info!(
                "{}: {} results saved to {}",
                self.label,
                outcome.results.len(),
                output.display()
            );
        }
        Ok(outcome)
    }
}

/// Write results as a pretty-printed JSON array, atomically. Creates the parent directory.
pub fn write_results(path: &Path, results: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(results).context("serialize results")?;
    write_atomic(path, &bytes).with_context(|| format!("save results to {}", path.display()))
}
