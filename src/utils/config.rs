//! Application configuration constants.
//! Defaults and file naming in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                env_prefix: format!("{}_", pkg.to_uppercase()),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// `.enricher.toml`, looked up in the working directory by the CLI.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable name for a setting, e.g. `ENRICHER_QUEUE_SIZE`.
    pub fn env_key(&self, setting: &str) -> String {
        format!("{}{}", self.env_prefix, setting)
    }
}

// ---- Pipeline ----

/// Defaults used when neither the config file, the environment nor the CLI set a value.
pub struct PipelineDefaults;

impl PipelineDefaults {
    /// Work queue capacity.
    pub const QUEUE_SIZE: usize = 100;
    /// Successful items between durable checkpoint saves.
    pub const CHECKPOINT_INTERVAL: u64 = 50;
    /// Consumer thread count.
    pub const MAX_CONCURRENT_REQUESTS: usize = 50;
    pub const CHECKPOINT_DIR: &'static str = "checkpoints";
}

// ---- Checkpoint files ----

/// Suffix of per-dataset checkpoint files: `<label>.checkpoint.json`.
pub const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

/// Extension of input files the producer picks up.
pub const INPUT_EXTENSION: &str = "json";
