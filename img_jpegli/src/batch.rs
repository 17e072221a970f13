//! Batch coordination
//!
//! Files run on a dedicated rayon pool. Each worker returns a [`FileReport`];
//! reports are collected in input order and folded into a [`BatchTally`] by a
//! single reducer, so there are no shared counters.

use crate::encoder::EncodeSetting;
use crate::error::ErrorKind;
use crate::pipeline::{FileReport, Pipeline};
use crate::safe_replace::{FileOutcome, ReplacementDecision};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use shared_utils::SummaryCounts;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared cancellation flag, set from the Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Replaced,
    SkippedLarger,
    SkippedAlreadyOptimized,
    Errored,
    Cancelled,
}

/// Flat, serializable view of a [`FileReport`] for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<EncodeSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl FileReport {
    pub fn status(&self) -> FileStatus {
        match &self.outcome {
            FileOutcome::Cancelled => FileStatus::Cancelled,
            FileOutcome::Decided(d) => match d {
                ReplacementDecision::Replaced { .. } => FileStatus::Replaced,
                ReplacementDecision::SkippedLarger { .. } => FileStatus::SkippedLarger,
                ReplacementDecision::SkippedAlreadyOptimized { .. } => {
                    FileStatus::SkippedAlreadyOptimized
                }
                ReplacementDecision::Errored(_) => FileStatus::Errored,
            },
        }
    }

    pub fn summary(&self) -> FileSummary {
        let mut summary = FileSummary {
            path: self.path.clone(),
            status: self.status(),
            original_size: None,
            new_size: None,
            setting: self.setting,
            score: self.analysis.as_ref().map(|a| a.score.value()),
            error_kind: None,
            error: None,
            elapsed_ms: self.elapsed.as_millis() as u64,
        };
        if let FileOutcome::Decided(d) = &self.outcome {
            match d {
                ReplacementDecision::Replaced {
                    original_size,
                    new_size,
                } => {
                    summary.original_size = Some(*original_size);
                    summary.new_size = Some(*new_size);
                }
                ReplacementDecision::SkippedLarger {
                    original_size,
                    candidate_size,
                }
                | ReplacementDecision::SkippedAlreadyOptimized {
                    original_size,
                    candidate_size,
                } => {
                    summary.original_size = Some(*original_size);
                    summary.new_size = Some(*candidate_size);
                }
                ReplacementDecision::Errored(e) => {
                    summary.error_kind = Some(e.kind());
                    summary.error = Some(e.to_string());
                }
            }
        }
        summary
    }
}

/// Aggregated batch result.
///
/// Byte totals cover replaced and skipped files only; a skipped file counts
/// its original size on both sides since it was left as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchTally {
    pub replaced: usize,
    pub skipped_larger: usize,
    pub skipped_already_optimized: usize,
    pub errored: usize,
    pub cancelled: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchTally {
    pub fn record(&mut self, report: &FileReport) {
        match &report.outcome {
            FileOutcome::Cancelled => self.cancelled += 1,
            FileOutcome::Decided(d) => match d {
                ReplacementDecision::Replaced {
                    original_size,
                    new_size,
                } => {
                    self.replaced += 1;
                    self.bytes_before += original_size;
                    self.bytes_after += new_size;
                }
                ReplacementDecision::SkippedLarger { original_size, .. } => {
                    self.skipped_larger += 1;
                    self.bytes_before += original_size;
                    self.bytes_after += original_size;
                }
                ReplacementDecision::SkippedAlreadyOptimized { original_size, .. } => {
                    self.skipped_already_optimized += 1;
                    self.bytes_before += original_size;
                    self.bytes_after += original_size;
                }
                ReplacementDecision::Errored(e) => {
                    self.errored += 1;
                    self.failures.push((report.path.clone(), e.to_string()));
                }
            },
        }
    }

    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a FileReport>) -> Self {
        reports.into_iter().fold(Self::default(), |mut tally, r| {
            tally.record(r);
            tally
        })
    }

    pub fn total(&self) -> usize {
        self.replaced
            + self.skipped_larger
            + self.skipped_already_optimized
            + self.errored
            + self.cancelled
    }

    pub fn to_summary_counts(&self) -> SummaryCounts {
        SummaryCounts {
            replaced: self.replaced,
            skipped_larger: self.skipped_larger,
            skipped_already_optimized: self.skipped_already_optimized,
            errored: self.errored,
            cancelled: self.cancelled,
            bytes_before: self.bytes_before,
            bytes_after: self.bytes_after,
            errors: self.failures.clone(),
        }
    }
}

pub struct BatchCoordinator<'a> {
    pipeline: &'a Pipeline,
    pool: rayon::ThreadPool,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(pipeline: &'a Pipeline, workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("jpegli-worker-{}", i))
            .build()?;
        Ok(Self { pipeline, pool })
    }

    /// Process every file. `on_report` runs on the worker as each file
    /// finishes; the returned reports keep input order.
    pub fn run<F>(
        &self,
        files: &[PathBuf],
        cancel: &CancelToken,
        progress: &ProgressBar,
        on_report: F,
    ) -> (Vec<FileReport>, BatchTally)
    where
        F: Fn(&FileReport) + Sync,
    {
        info!(files = files.len(), workers = self.pool.current_num_threads(), "Batch started");

        let reports: Vec<FileReport> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let report = self.pipeline.process(path, cancel);
                    on_report(&report);
                    progress.inc(1);
                    report
                })
                .collect()
        });

        let tally = BatchTally::from_reports(&reports);
        info!(
            replaced = tally.replaced,
            skipped_larger = tally.skipped_larger,
            skipped_already_optimized = tally.skipped_already_optimized,
            errored = tally.errored,
            cancelled = tally.cancelled,
            "Batch finished"
        );
        (reports, tally)
    }
}
