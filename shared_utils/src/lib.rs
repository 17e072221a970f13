//! Shared Utilities for the img_jpegli optimizer
//!
//! This crate holds the plumbing that is independent of the distance policy:
//! - Logging (tracing to stderr + rolling file)
//! - External process execution with timeouts
//! - Metadata preservation (ExifTool, timestamps, permissions, xattr)
//! - Batch file collection and dangerous-directory checks
//! - Progress bar and summary reporting
//! - Worker count selection

pub mod batch;
pub mod common_utils;
pub mod logging;
pub mod metadata;
pub mod process;
pub mod progress;
pub mod report;
pub mod safety;
pub mod thread_manager;

pub use batch::{collect_files, collect_inputs, IMAGE_EXTENSIONS};
pub use common_utils::{
    get_extension_lowercase, has_extension, is_hidden_file, resolve_tool,
};
pub use metadata::{
    apply_file_attributes, apply_file_timestamps, ExifToolArgs, ExifToolError, FileTimestamps,
};
pub use process::{summarize_stderr, ToolError, ToolOutput, ToolProcess};
pub use progress::{create_progress_bar, format_bytes, format_duration, truncate_filename};
pub use report::{print_summary_report, SummaryCounts};
pub use safety::{check_dangerous_directory, UnsafeRoot};
pub use thread_manager::{default_worker_count, resolve_worker_count};
