//! Metadata carry-over seam
//!
//! [`ExifToolCopier`] moves embedded tags with exiftool, then filesystem
//! attributes and timestamps with `shared_utils::metadata`. Timestamps go
//! last because exiftool rewrites the file.

use crate::error::{OptimizeError, Result};
use shared_utils::{
    apply_file_attributes, apply_file_timestamps, has_extension, ExifToolArgs, FileTimestamps,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EXIFTOOL_TIMEOUT: Duration = Duration::from_secs(120);

pub trait MetadataCopier: Send + Sync {
    /// Copy every piece of preserved metadata from `source` onto `target`.
    ///
    /// `source_times` are the source's timestamps as they were before the
    /// pipeline read it; when absent they are read from `source` now.
    fn copy_metadata(
        &self,
        source: &Path,
        source_times: Option<FileTimestamps>,
        target: &Path,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ExifToolCopier {
    exiftool: PathBuf,
    timeout: Duration,
}

impl ExifToolCopier {
    pub fn new(exiftool: PathBuf, timeout: Duration) -> Self {
        Self { exiftool, timeout }
    }
}

impl MetadataCopier for ExifToolCopier {
    fn copy_metadata(
        &self,
        source: &Path,
        source_times: Option<FileTimestamps>,
        target: &Path,
    ) -> Result<()> {
        let fail = |stage: &str, e: &dyn std::fmt::Display| {
            OptimizeError::MetadataTransferFailure(format!("{}: {}", stage, e))
        };

        ExifToolArgs::new(source, target)
            .with_date_fallback(has_extension(source, &["png"]))
            .run(&self.exiftool, self.timeout)
            .map_err(|e| fail("exiftool", &e))?;

        apply_file_attributes(source, target).map_err(|e| fail("file attributes", &e))?;
        apply_file_timestamps(source, source_times, target).map_err(|e| fail("timestamps", &e))?;

        debug!(source = %source.display(), target = %target.display(), "Metadata copied");
        Ok(())
    }
}
