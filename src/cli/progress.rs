//! CLI progress display utilities

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar style for determinate progress
///
/// # Panics
/// Panics if the template string is invalid (this is a compile-time
/// constant).
#[must_use]
pub fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
        .expect("valid template")
}

/// Create a simple progress bar
#[must_use]
pub fn simple_bar(total: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(bar_style());
    pb.set_message(msg.to_string());
    pb
}
