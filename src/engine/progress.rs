//! Progress counter for processed items (verbose CLI runs).

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::pipeline::ProgressFn;

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Counter for an unknown total (shows count and rate, no percentage).
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " items"
    )))
}

/// Final refresh so the last count is shown.
pub fn finish_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
        eprintln!();
    }
}

/// Progress callback for [`PipelineRunner::on_success`](crate::pipeline::PipelineRunner::on_success):
/// one tick per successful item.
pub fn progress_callback(bar: &ProgressBar) -> ProgressFn {
    let bar = Arc::clone(bar);
    Arc::new(move |_total: u64| {
        if let Ok(mut pb) = bar.lock() {
            let _ = pb.update(1);
        }
    })
}
