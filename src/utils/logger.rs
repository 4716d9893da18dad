//! Terminal logging: `[enricher <component>] message`, with level tags on warnings and errors.

use colored::Colorize;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter};
use std::io::Write;

use crate::utils::config::PackagePaths;

/// Last segment of a module target: `enricher::pipeline::consumer` → `consumer`.
fn component(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Install the logger. `ENRICHER_LOG` (env_logger filter syntax) overrides the level choice.
pub fn setup_logging(verbose: bool) {
    let paths = PackagePaths::get();
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // try_init: a second stage in the same process must not panic on re-init.
    let _ = Builder::new()
        .filter_level(LevelFilter::Warn) // dependencies: warnings only
        .filter_module(paths.pkg_name(), level)
        .parse_env(Env::new().filter(paths.env_key("LOG")))
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME").cyan();
            let part = component(record.target());
            let line = match record.level() {
                Level::Error => format!("[{name} {} {part}] {}", "ERROR".red(), record.args()),
                Level::Warn => format!("[{name} {} {part}] {}", "WARN".yellow(), record.args()),
                Level::Info => format!("[{name} {}] {}", part.white(), record.args()),
                Level::Debug | Level::Trace => format!(
                    "[{name} {} {}] {}",
                    "DEBUG".dimmed(),
                    record.target().dimmed(),
                    record.args()
                ),
            };
            writeln!(buf, "{line}")
        })
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::component;

    #[test]
    fn component_is_last_module_segment() {
        assert_eq!(component("enricher::pipeline::consumer"), "consumer");
        assert_eq!(component("enricher"), "enricher");
        assert_eq!(component(""), "");
    }
}
