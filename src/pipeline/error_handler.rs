use log::warn;

use super::runner::PipelineOutcome;

/// Log what a run left behind for the next one: skipped files and failed items.
/// With `verbose`, list each one so it can be triaged by hand.
pub fn report_skipped_and_failed(label: &str, outcome: &PipelineOutcome, verbose: bool) {
    let skipped = outcome.skipped_files.len();
    if skipped > 0 {
        warn!("{label}: skipped {skipped} files that could not be read; they will be retried");
        if verbose {
            for f in &outcome.skipped_files {
                eprintln!("  skipped file: {} ({})", f.file_id, f.reason);
            }
        }
    }
    let failed = outcome.failed.len();
    if failed > 0 {
        warn!("{label}: {failed} items failed; they will be retried on the next run");
        if verbose {
            for f in &outcome.failed {
                eprintln!("  failed item: {}:{} ({})", f.file_id, f.item_id, f.error);
            }
        }
    }
}
