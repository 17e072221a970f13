//! Safety Module
//!
//! Batch roots are rewritten in place, so system directories and home roots
//! are refused before any file is collected.

use std::path::{Path, PathBuf};
use thiserror::Error;

const PROTECTED_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/tmp",
    "/opt",
];

const HOME_PARENTS: &[&str] = &["/Users", "/home"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UnsafeRoot {
    #[error("'{0}' is a protected system directory; pick a subdirectory")]
    SystemDirectory(PathBuf),

    #[error("'{0}' is a home directory root; pick a subdirectory such as ~/Pictures/export")]
    HomeRoot(PathBuf),
}

/// Refuse `path` as a batch root when it is a protected system directory or
/// a user's home directory itself.
pub fn check_dangerous_directory(path: &Path) -> Result<(), UnsafeRoot> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    for candidate in [path, canonical.as_path()] {
        if PROTECTED_DIRS.iter().any(|d| candidate == Path::new(d)) {
            return Err(UnsafeRoot::SystemDirectory(path.to_path_buf()));
        }
        let is_home_root = candidate
            .parent()
            .is_some_and(|parent| HOME_PARENTS.iter().any(|h| parent == Path::new(h)));
        if is_home_root {
            return Err(UnsafeRoot::HomeRoot(path.to_path_buf()));
        }
    }

    Ok(())
}
