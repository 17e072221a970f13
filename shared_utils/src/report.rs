//! Report Module
//!
//! Human-readable end-of-run summary.

use crate::progress::{format_bytes, format_duration};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Counts and byte totals for one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryCounts {
    pub replaced: usize,
    pub skipped_larger: usize,
    pub skipped_already_optimized: usize,
    pub errored: usize,
    pub cancelled: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub errors: Vec<(PathBuf, String)>,
}

impl SummaryCounts {
    pub fn total(&self) -> usize {
        self.replaced
            + self.skipped_larger
            + self.skipped_already_optimized
            + self.errored
            + self.cancelled
    }

    /// Percentage saved over the counted bytes; 0 when nothing was counted.
    pub fn reduction_percent(&self) -> f64 {
        if self.bytes_before == 0 {
            0.0
        } else {
            (1.0 - self.bytes_after as f64 / self.bytes_before as f64) * 100.0
        }
    }
}

pub fn print_summary_report(counts: &SummaryCounts, duration: Duration, operation_name: &str) {
    let line = "═".repeat(62);

    println!();
    println!("╔{}╗", line);
    println!("║  📊 {:<56}║", format!("{} Summary", operation_name));
    println!("╠{}╣", line);
    println!("║  📁 Files processed:        {:>10}                       ║", counts.total());
    println!("║  ✅ Replaced:               {:>10}                       ║", counts.replaced);
    println!("║  ⏭️  Skipped (larger):       {:>10}                       ║", counts.skipped_larger);
    println!(
        "║  ⏭️  Skipped (optimized):    {:>10}                       ║",
        counts.skipped_already_optimized
    );
    println!("║  ❌ Errored:                {:>10}                       ║", counts.errored);
    if counts.cancelled > 0 {
        println!("║  🛑 Cancelled:              {:>10}                       ║", counts.cancelled);
    }
    println!("╠{}╣", line);
    println!(
        "║  💾 Before:                 {:>10}                       ║",
        format_bytes(counts.bytes_before)
    );
    println!(
        "║  💾 After:                  {:>10}                       ║",
        format_bytes(counts.bytes_after)
    );
    println!(
        "║  📉 Reduction:              {:>9.1}%                       ║",
        counts.reduction_percent()
    );
    println!(
        "║  ⏱️  Total time:             {:>10}                       ║",
        format_duration(duration)
    );
    println!("╚{}╝", line);

    if !counts.errors.is_empty() {
        println!();
        println!("{}", style("❌ Errors encountered:").red().bold());
        for (path, error) in &counts.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
}
