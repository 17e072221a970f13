//! ExifTool wrapper for embedded metadata transfer
//!
//! The destination is rewritten in place (`-overwrite_original_in_place`) so an
//! open handle on it, and its inode, stay valid across the call. No
//! `_original` backup is left behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::process::{ToolError, ToolProcess};

#[derive(Error, Debug)]
pub enum ExifToolError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("exiftool exited with code {code:?}: {message}")]
    Failed { code: Option<i32>, message: String },
}

/// Arguments for one "copy every tag from source into target" invocation.
#[derive(Debug, Clone)]
pub struct ExifToolArgs {
    source: PathBuf,
    target: PathBuf,
    date_fallback: bool,
}

impl ExifToolArgs {
    pub fn new(source: &Path, target: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            date_fallback: false,
        }
    }

    /// Seed `DateTimeOriginal`/`CreateDate` from the file modification time.
    ///
    /// Used for PNG sources, which rarely carry EXIF dates. Tags that do exist
    /// in the source are copied afterwards and take precedence.
    pub fn with_date_fallback(mut self, enabled: bool) -> Self {
        self.date_fallback = enabled;
        self
    }

    pub fn build(&self) -> Vec<OsString> {
        // file names are passed as UTF-8, not the Windows ANSI code page
        let mut args: Vec<OsString> = vec![
            "-charset".into(),
            "filename=UTF8".into(),
            "-tagsfromfile".into(),
            self.source.clone().into(),
        ];
        if self.date_fallback {
            args.push("-DateTimeOriginal<FileModifyDate".into());
            args.push("-CreateDate<FileModifyDate".into());
        }
        args.extend(
            [
                "-all:all",
                "-ICC_Profile<ICC_Profile",
                "-api",
                "LargeFileSupport=1",
                "-overwrite_original_in_place",
                "-q",
                "-m",
            ]
            .map(OsString::from),
        );
        args.push(self.target.clone().into());
        args
    }

    /// Run the transfer with `exiftool` at the given path.
    pub fn run(&self, exiftool: &Path, timeout: Duration) -> Result<(), ExifToolError> {
        let output = ToolProcess::run(exiftool, &self.build(), timeout)?;
        if !output.success() {
            return Err(ExifToolError::Failed {
                code: output.status.code(),
                message: output.error_summary(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_build_copies_all_tags_and_icc() {
        let args = ExifToolArgs::new(Path::new("/a/src.jpg"), Path::new("/a/.src.tmp.jpg")).build();
        let args = as_strings(&args);

        assert_eq!(args[..2], ["-charset", "filename=UTF8"]);
        assert_eq!(args[2], "-tagsfromfile");
        assert_eq!(args[3], "/a/src.jpg");
        assert!(args.contains(&"-all:all".to_string()));
        assert!(args.contains(&"-ICC_Profile<ICC_Profile".to_string()));
        assert!(args.contains(&"-overwrite_original_in_place".to_string()));
        assert!(!args.iter().any(|a| a.contains("FileModifyDate")));
        assert_eq!(args.last().unwrap(), "/a/.src.tmp.jpg");
    }

    #[test]
    fn test_date_fallback_precedes_tag_copy() {
        let args = ExifToolArgs::new(Path::new("in.png"), Path::new("out.jpg"))
            .with_date_fallback(true)
            .build();
        let args = as_strings(&args);

        let dto = args
            .iter()
            .position(|a| a == "-DateTimeOriginal<FileModifyDate")
            .unwrap();
        let all = args.iter().position(|a| a == "-all:all").unwrap();
        assert!(dto < all);
        assert!(args.contains(&"-CreateDate<FileModifyDate".to_string()));
    }

    #[test]
    fn test_run_with_missing_binary() {
        let err = ExifToolArgs::new(Path::new("a.jpg"), Path::new("b.jpg"))
            .run(Path::new("nonexistent_exiftool_xyz"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ExifToolError::Tool(ToolError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_failure_exit() {
        let temp = tempfile::TempDir::new().unwrap();
        let fake = temp.path().join("exiftool");
        std::fs::write(&fake, "#!/bin/sh\necho 'Error: File not found' >&2\nexit 1\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let err = ExifToolArgs::new(Path::new("a.jpg"), Path::new("b.jpg"))
            .run(&fake, Duration::from_secs(10))
            .unwrap_err();
        match err {
            ExifToolError::Failed { code, message } => {
                assert_eq!(code, Some(1));
                assert_eq!(message, "Error: File not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
