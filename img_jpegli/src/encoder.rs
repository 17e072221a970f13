//! Lossy encoder seam
//!
//! The pipeline talks to the encoder through [`Encoder`]; production uses
//! [`CjpegliEncoder`], tests inject in-process fakes.

use crate::distance::DistanceTier;
use crate::error::{OptimizeError, Result};
use serde::Serialize;
use shared_utils::{ToolError, ToolProcess};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENCODER_TIMEOUT: Duration = Duration::from_secs(300);

/// What the encoder is asked for: an adaptive distance, or a fixed quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeSetting {
    Distance(DistanceTier),
    Quality(u8),
}

impl fmt::Display for EncodeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeSetting::Distance(tier) => write!(f, "distance {}", tier),
            EncodeSetting::Quality(q) => write!(f, "quality {}", q),
        }
    }
}

pub trait Encoder: Send + Sync {
    /// Encode `source` into a JPEG at `output`, which already exists and is
    /// overwritten.
    fn encode(&self, source: &Path, setting: EncodeSetting, output: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CjpegliEncoder {
    binary: PathBuf,
    timeout: Duration,
}

impl CjpegliEncoder {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    pub fn args(source: &Path, setting: EncodeSetting, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![source.into(), output.into()];
        match setting {
            EncodeSetting::Distance(tier) => {
                args.push(format!("--distance={}", tier.distance()).into());
                args.push("--chroma_subsampling=444".into());
                args.push("--progressive_level=2".into());
            }
            EncodeSetting::Quality(q) => args.push(format!("--quality={}", q).into()),
        }
        args
    }
}

impl Encoder for CjpegliEncoder {
    fn encode(&self, source: &Path, setting: EncodeSetting, output: &Path) -> Result<()> {
        let args = Self::args(source, setting, output);
        let result = ToolProcess::run(&self.binary, &args, self.timeout).map_err(|e| match e {
            ToolError::TimedOut { timeout, .. } => {
                OptimizeError::EncodeFailure(format!("cjpegli timed out after {:?}", timeout))
            }
            other => OptimizeError::EncodeFailure(other.to_string()),
        })?;

        if !result.success() {
            return Err(OptimizeError::EncodeFailure(format!(
                "cjpegli exited with code {:?}: {}",
                result.status.code(),
                result.error_summary()
            )));
        }
        Ok(())
    }
}
