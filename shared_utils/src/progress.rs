//! Progress Bar Module
//!
//! One batch bar on stderr. It is hidden when stderr is not a terminal or
//! when the caller asks (JSON output, quiet runs) so machine-readable stdout
//! and log files stay clean.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub mod progress_style {
    pub const PROGRESS_CHARS: &str = "█▓░";
    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
    pub const BATCH_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} (ETA: {eta}) • {msg}";
}

pub fn create_progress_bar(total: u64, prefix: &str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);

    if hidden || !console::Term::stderr().is_term() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_bar()
            .template(progress_style::BATCH_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(progress_style::PROGRESS_CHARS)
            .tick_chars(progress_style::SPINNER_CHARS);
        pb.set_style(style);
        pb.set_prefix(prefix.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb
}

/// Shorten a file name for the bar message, keeping both ends.
pub fn truncate_filename(filename: &str, max_len: usize) -> String {
    let chars: Vec<char> = filename.chars().collect();
    if chars.len() <= max_len || max_len < 5 {
        return filename.to_string();
    }
    let half = (max_len - 3) / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{}...{}", head, tail)
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
