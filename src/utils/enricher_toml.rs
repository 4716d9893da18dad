//! Load `.enricher.toml` (CLI only). Lib callers build [`PipelineOpts`] and [`Stage`]s directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::PipelineOpts;
use crate::stage::Stage;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EnricherToml {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    stage: Vec<StageSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    queue_size: Option<usize>,
    checkpoint_interval: Option<u64>,
    max_concurrent_requests: Option<usize>,
    checkpoint_dir: Option<String>,
    resume: Option<bool>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StageSection {
    label: String,
    dir: String,
    command: Vec<String>,
    output: Option<String>,
    rate_permits: Option<u32>,
    rate_period_secs: Option<f64>,
    max_sessions: Option<usize>,
    timeout_secs: Option<f64>,
}

/// Load the config file. With `explicit` the file must exist and parse; otherwise
/// `.enricher.toml` in `dir` is optional and a parse failure is only warned about.
pub(crate) fn load_enricher_toml(dir: &Path, explicit: Option<&Path>) -> Result<Option<EnricherToml>> {
    if let Some(path) = explicit {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let parsed = toml::from_str(&s)
            .with_context(|| format!("parse config file {}", path.display()))?;
        return Ok(Some(parsed));
    }
    let path = dir.join(PackagePaths::get().config_filename());
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    Ok(toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok())
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply the `[settings]` section to opts (only fields present in the file). Call before env and CLI.
pub(crate) fn apply_file_to_opts(file: &EnricherToml, opts: &mut PipelineOpts) {
    let s = &file.settings;
    apply_file_opt!(s, opts, queue_size => queue_size);
    apply_file_opt!(s, opts, checkpoint_interval => checkpoint_interval);
    apply_file_opt!(s, opts, max_concurrent_requests => max_concurrent_requests);
    apply_file_opt!(s, opts, resume => resume);
    apply_file_opt!(s, opts, verbose => verbose);
    if let Some(ref p) = s.checkpoint_dir {
        opts.checkpoint_dir = PathBuf::from(p);
    }
}

/// Build the `[[stage]]` list, in file order.
pub(crate) fn stages_from_file(file: &EnricherToml) -> Result<Vec<Stage>> {
    file.stage
        .iter()
        .map(|s| -> Result<Stage> {
            let rate = match (s.rate_permits, s.rate_period_secs) {
                (Some(permits), Some(secs)) => Some((permits, secs_to_duration(secs)?)),
                (Some(permits), None) => Some((permits, Duration::from_secs(1))),
                (None, Some(_)) => {
                    anyhow::bail!("stage {}: rate_period_secs set without rate_permits", s.label)
                }
                (None, None) => None,
            };
            let mut stage = Stage::new(&s.label, &s.dir, s.command.clone());
            stage.output = s.output.as_ref().map(PathBuf::from);
            stage.limits.rate = rate;
            stage.limits.max_concurrent_sessions = s.max_sessions;
            stage.timeout = s.timeout_secs.map(secs_to_duration).transpose()?;
            Ok(stage)
        })
        .collect()
}

/// Seconds (fractional allowed) to a `Duration`, rejecting negative and non-finite values.
pub(crate) fn secs_to_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid duration: {secs} seconds"))
}
