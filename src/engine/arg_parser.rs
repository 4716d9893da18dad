use clap::Parser;
use std::path::PathBuf;

/// Resumable enrichment pipeline over directories of JSON records.
#[derive(Clone, Parser)]
#[command(name = "enricher")]
#[command(
    about = "Feed JSON records through an external enrichment command; resumes from checkpoints."
)]
pub struct Cli {
    /// Input directory of `*.json` files. When omitted, every `[[stage]]` of the config file runs in order.
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Dataset label (names the checkpoint). Default: DIR's name.
    #[arg(long, short = 'n')]
    pub label: Option<String>,

    /// Enrichment command: gets each payload as JSON on stdin, prints the result JSON on stdout.
    #[arg(long, short = 'e', num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    pub exec: Vec<String>,

    /// Write this run's results to PATH as a JSON array.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Config file. Default: `.enricher.toml` in the working directory, if present.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Checkpoint directory.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Work queue capacity.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub queue_size: Option<usize>,

    /// Successful items between checkpoint saves.
    #[arg(long, value_parser = clap::value_parser!(u64))]
    pub checkpoint_interval: Option<u64>,

    /// Number of consumer workers.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Max calls per rate period.
    #[arg(long, value_parser = clap::value_parser!(u32))]
    pub rate_permits: Option<u32>,

    /// Rate period in seconds (default 1 when --rate-permits is set).
    #[arg(long, value_parser = clap::value_parser!(f64))]
    pub rate_period: Option<f64>,

    /// Max simultaneous enrichment calls.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub max_sessions: Option<usize>,

    /// Kill the enrichment command after this many seconds.
    #[arg(long, value_parser = clap::value_parser!(f64))]
    pub timeout: Option<f64>,

    /// Ignore existing checkpoints and start from scratch.
    #[arg(long)]
    pub fresh: bool,

    /// Print checkpoint progress and exit.
    #[arg(long, conflicts_with = "reset")]
    pub status: bool,

    /// Delete checkpoints and exit.
    #[arg(long)]
    pub reset: bool,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl Cli {
    /// Label for a single-directory run: `--label`, else the directory's file name.
    pub fn dataset_label(&self) -> Option<String> {
        self.label.clone().or_else(|| {
            self.dir
                .as_ref()?
                .canonicalize()
                .ok()?
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
    }
}
