//! Batch Processing Module
//!
//! Input discovery: command-line paths may name files or directories;
//! directories are walked for image extensions. The result is sorted and
//! deduplicated so every run visits files in the same order.

use crate::common_utils::{has_extension, is_hidden_file};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Extensions the optimizer accepts. PNG inputs produce a sibling `.jpg`.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "jfif", "png"];

/// Image files under `dir`, skipping hidden files and hidden directories.
pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(false)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        // depth 0 is `dir` itself, which the caller chose explicitly
        .filter_entry(|e| e.depth() == 0 || !is_hidden_file(e.path()))
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    files
}

/// Expand a mix of file and directory arguments into a sorted, deduplicated
/// list of image files.
///
/// Explicit files are kept even when their extension is unusual; missing
/// paths are reported in the second list.
pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut files = BTreeSet::new();
    let mut missing = Vec::new();

    for input in inputs {
        if input.is_dir() {
            files.extend(collect_files(input, IMAGE_EXTENSIONS, recursive));
        } else if input.is_file() {
            files.insert(input.clone());
        } else {
            missing.push(input.clone());
        }
    }

    (files.into_iter().collect(), missing)
}
