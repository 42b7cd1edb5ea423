//! Line progress bar for file digests.
//!
//! The bar is sized from a newline count taken before ingestion and advanced
//! by the framer, one tick per physical line.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::warn;

use super::slowlog::LineHook;

const TEMPLATE: &str = "{spinner} [{elapsed_precise}] [{wide_bar}] {pos}/{len} lines ({per_sec}, {eta})";

/// Bar drawn on stderr so reports on stdout stay clean.
pub fn line_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    match ProgressStyle::with_template(TEMPLATE) {
        Ok(style) => bar.set_style(style.progress_chars("=> ")),
        Err(e) => warn!("invalid progress template: {}", e),
    }
    bar
}

/// Framer hook advancing `bar`.
pub fn line_hook(bar: &ProgressBar) -> LineHook {
    let bar = bar.clone();
    Box::new(move |lines| bar.inc(lines))
}
