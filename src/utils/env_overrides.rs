//! Environment overrides for pipeline settings: process env → `.env` in dir.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::PipelineOpts;
use crate::utils::config::PackagePaths;

/// Load `.env` from `dir` if present. Variables already set in the process win.
pub fn load_dotenv(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.is_file()
        && let Err(e) = dotenvy::from_path(&env_path)
    {
        log::warn!("{}: {}", env_path.display(), e);
    }
}

fn env_value(setting: &str) -> Option<(String, String)> {
    let key = PackagePaths::get().env_key(setting);
    let value = std::env::var(&key).ok()?;
    let value = value.trim().to_string();
    (!value.is_empty()).then_some((key, value))
}

fn parse_env<T>(setting: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_value(setting) {
        Some((key, value)) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key}={value}")),
        None => Ok(None),
    }
}

/// Apply `ENRICHER_*` variables to opts. A malformed value is a configuration error.
pub fn apply_env_to_opts(opts: &mut PipelineOpts) -> Result<()> {
    if let Some(v) = parse_env::<usize>("QUEUE_SIZE")? {
        opts.queue_size = v;
    }
    if let Some(v) = parse_env::<u64>("CHECKPOINT_INTERVAL")? {
        opts.checkpoint_interval = v;
    }
    if let Some(v) = parse_env::<usize>("MAX_CONCURRENT_REQUESTS")? {
        opts.max_concurrent_requests = v;
    }
    if let Some((_, v)) = env_value("CHECKPOINT_DIR") {
        opts.checkpoint_dir = PathBuf::from(v);
    }
    Ok(())
}
