//! Metadata Preservation Module
//!
//! Two layers, applied in this order to a re-encoded candidate:
//! - Internal: embedded EXIF/IPTC/XMP/ICC via ExifTool ([`ExifToolArgs`])
//! - System: permissions, extended attributes, timestamps
//!
//! ExifTool rewrites the file, so timestamps are always set last.

use filetime::FileTime;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

mod exif;
#[cfg(target_os = "windows")]
mod windows;

pub use exif::{ExifToolArgs, ExifToolError};

/// Copy permissions and extended attributes from `src` to `dst`.
///
/// Permissions are required; an xattr that the destination filesystem rejects
/// is logged and skipped.
pub fn apply_file_attributes(src: &Path, dst: &Path) -> io::Result<()> {
    let metadata = std::fs::metadata(src)?;
    std::fs::set_permissions(dst, metadata.permissions())?;
    copy_xattrs(src, dst);
    Ok(())
}

/// Access and modification times of a file, taken before anything reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimestamps {
    pub atime: FileTime,
    pub mtime: FileTime,
}

impl FileTimestamps {
    pub fn capture(path: &Path) -> io::Result<Self> {
        Ok(Self::from_metadata(&std::fs::metadata(path)?))
    }

    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            atime: FileTime::from_last_access_time(metadata),
            mtime: FileTime::from_last_modification_time(metadata),
        }
    }

    pub fn apply(&self, dst: &Path) -> io::Result<()> {
        filetime::set_file_times(dst, self.atime, self.mtime)
    }
}

/// Copy access and modification times (and creation time on Windows).
///
/// `captured` wins over the live times of `src`, whose atime moves as soon
/// as the file is read.
pub fn apply_file_timestamps(
    src: &Path,
    captured: Option<FileTimestamps>,
    dst: &Path,
) -> io::Result<()> {
    let times = match captured {
        Some(times) => times,
        None => FileTimestamps::capture(src)?,
    };
    times.apply(dst)?;

    #[cfg(target_os = "windows")]
    if let Err(e) = windows::copy_creation_time(src, dst) {
        warn!(path = %dst.display(), error = %e, "Failed to set creation time");
    }

    Ok(())
}

fn copy_xattrs(src: &Path, dst: &Path) {
    if !xattr::SUPPORTED_PLATFORM {
        return;
    }
    let names = match xattr::list(src) {
        Ok(names) => names,
        Err(e) => {
            debug!(path = %src.display(), error = %e, "Cannot list extended attributes");
            return;
        }
    };
    for name in names {
        match xattr::get(src, &name) {
            Ok(Some(value)) => {
                if let Err(e) = xattr::set(dst, &name, &value) {
                    warn!(
                        path = %dst.display(),
                        attr = %name.to_string_lossy(),
                        error = %e,
                        "Failed to copy extended attribute"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(attr = %name.to_string_lossy(), error = %e, "Cannot read extended attribute");
            }
        }
    }
}
