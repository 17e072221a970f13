//! Size-gated, metadata-preserving replacement
//!
//! Decision order for one candidate:
//!
//! 1. corrupt candidate            -> `Errored(EncodeCorruption)`
//! 2. size gate                    -> `SkippedLarger` / `SkippedAlreadyOptimized`
//! 3. cancellation checkpoint
//! 4. metadata copy onto candidate -> `Errored(MetadataTransferFailure)`
//! 5. size gate again (tags add bytes)
//! 6. fsync, then atomic rename    -> `Replaced` / `Errored(ReplacementIo)`
//!
//! Until step 6 succeeds the original is never written. Every other exit
//! drops the candidate, which deletes it.

use crate::batch::CancelToken;
use crate::encode_gate::{EncodeResult, Validity};
use crate::error::OptimizeError;
use crate::metadata::MetadataCopier;
use shared_utils::FileTimestamps;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum ReplacementDecision {
    Replaced {
        original_size: u64,
        new_size: u64,
    },
    SkippedLarger {
        original_size: u64,
        candidate_size: u64,
    },
    SkippedAlreadyOptimized {
        original_size: u64,
        candidate_size: u64,
    },
    Errored(OptimizeError),
}

/// Result of running one file: a decision, or cancellation before any change.
#[derive(Debug)]
pub enum FileOutcome {
    Decided(ReplacementDecision),
    Cancelled,
}

impl From<ReplacementDecision> for FileOutcome {
    fn from(decision: ReplacementDecision) -> Self {
        FileOutcome::Decided(decision)
    }
}

impl From<OptimizeError> for FileOutcome {
    fn from(err: OptimizeError) -> Self {
        FileOutcome::Decided(ReplacementDecision::Errored(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeVerdict {
    Smaller,
    Larger,
    /// Smaller, but by no more than the configured threshold.
    Negligible,
}

/// Compare sizes: not smaller is `Larger`; a reduction of at most
/// `min_reduction_percent` is `Negligible`.
pub fn size_verdict(original: u64, candidate: u64, min_reduction_percent: f64) -> SizeVerdict {
    if candidate >= original {
        return SizeVerdict::Larger;
    }
    let reduction = (original - candidate) as f64 / original as f64 * 100.0;
    if reduction <= min_reduction_percent {
        SizeVerdict::Negligible
    } else {
        SizeVerdict::Smaller
    }
}

pub struct SafeReplacer<'a> {
    copier: &'a dyn MetadataCopier,
    min_reduction_percent: f64,
}

impl<'a> SafeReplacer<'a> {
    pub fn new(copier: &'a dyn MetadataCopier, min_reduction_percent: f64) -> Self {
        Self {
            copier,
            min_reduction_percent,
        }
    }

    /// Replace `target` with the candidate in `result` if it earns it.
    ///
    /// `original` is the source file (metadata donor). It equals `target` for
    /// JPEG inputs; for PNG inputs `target` is the sibling `.jpg`, which must
    /// not exist, and `original` is removed once the `.jpg` is in place.
    /// `original_times` are handed to the metadata copier unchanged.
    pub fn replace(
        &self,
        original: &Path,
        target: &Path,
        original_size: u64,
        original_times: Option<FileTimestamps>,
        result: EncodeResult,
        cancel: &CancelToken,
    ) -> FileOutcome {
        if let Validity::Corrupt(reason) = result.validity() {
            return OptimizeError::EncodeCorruption(reason.clone()).into();
        }

        if let Some(skip) = self.size_gate(original_size, result.size()) {
            debug!(path = %original.display(), candidate_size = result.size(), "Candidate rejected by size gate");
            return skip.into();
        }

        if cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }

        let candidate = result.into_candidate();

        if let Err(e) = self.copier.copy_metadata(original, original_times, candidate.path()) {
            return e.into();
        }

        // exiftool rewrites in place, so the open handle sees the tagged file
        let new_size = match candidate.as_file().metadata() {
            Ok(m) => m.len(),
            Err(e) => return OptimizeError::io(candidate.path(), e).into(),
        };
        if let Some(skip) = self.size_gate(original_size, new_size) {
            debug!(path = %original.display(), new_size, "Candidate with metadata rejected by size gate");
            return skip.into();
        }

        if let Err(e) = candidate.as_file().sync_all() {
            return OptimizeError::ReplacementIo {
                path: target.to_path_buf(),
                source: e,
            }
            .into();
        }

        if original == target {
            if let Err(e) = candidate.persist(target) {
                return OptimizeError::ReplacementIo {
                    path: target.to_path_buf(),
                    source: e.error,
                }
                .into();
            }
        } else {
            if let Err(e) = candidate.persist_noclobber(target) {
                let err = if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    OptimizeError::OutputCollision(target.to_path_buf())
                } else {
                    OptimizeError::ReplacementIo {
                        path: target.to_path_buf(),
                        source: e.error,
                    }
                };
                return err.into();
            }
            if let Err(e) = std::fs::remove_file(original) {
                warn!(
                    path = %original.display(),
                    error = %e,
                    "Optimized copy written but the source could not be removed"
                );
            }
        }

        info!(
            path = %target.display(),
            original_size,
            new_size,
            "Replaced"
        );
        ReplacementDecision::Replaced {
            original_size,
            new_size,
        }
        .into()
    }

    fn size_gate(&self, original_size: u64, candidate_size: u64) -> Option<ReplacementDecision> {
        match size_verdict(original_size, candidate_size, self.min_reduction_percent) {
            SizeVerdict::Smaller => None,
            SizeVerdict::Larger => Some(ReplacementDecision::SkippedLarger {
                original_size,
                candidate_size,
            }),
            SizeVerdict::Negligible => Some(ReplacementDecision::SkippedAlreadyOptimized {
                original_size,
                candidate_size,
            }),
        }
    }
}
