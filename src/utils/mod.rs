pub mod config;
pub mod enricher_toml;
pub mod env_overrides;
pub mod logger;
pub mod tempfiles;

pub use config::*;
pub use env_overrides::{apply_env_to_opts, load_dotenv};
pub use logger::setup_logging;
pub use tempfiles::{rename_temp_to_final, temp_path_for, write_atomic};
