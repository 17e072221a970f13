//! Common Utilities Module
//!
//! Small helpers used across the optimizer:
//! - Extension handling
//! - Hidden file detection
//! - External tool resolution (explicit path or `PATH` lookup)

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

// ═══════════════════════════════════════════════════════════════
// File Operations
// ═══════════════════════════════════════════════════════════════

/// Lowercase file extension, or an empty string when there is none.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("test.JPG")), "jpg");
/// assert_eq!(get_extension_lowercase(Path::new("noext")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Case-insensitive extension check against a list (no leading dots).
///
/// # Examples
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::has_extension;
///
/// let extensions = &["jpg", "jpeg", "png"];
/// assert!(has_extension(Path::new("photo.JPG"), extensions));
/// assert!(!has_extension(Path::new("video.mp4"), extensions));
/// ```
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.contains(&ext.as_str())
}

/// Dot-files (`.DS_Store`, our own `.name.tmp.jpg` candidates) are hidden.
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════
// External Tools
// ═══════════════════════════════════════════════════════════════

/// Resolve an external tool.
///
/// An explicit path must exist; otherwise `name` is looked up on `PATH`.
pub fn resolve_tool(name: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("{} not found at: {}", name, path.display());
        }
        debug!(tool = name, path = %path.display(), "Using explicit tool path");
        return Ok(path.to_path_buf());
    }

    let resolved = which::which(name)
        .with_context(|| format!("{} not found on PATH (install it or pass its path)", name))?;
    debug!(tool = name, path = %resolved.display(), "Resolved tool on PATH");
    Ok(resolved)
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
