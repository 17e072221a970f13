//! Per-file error types
//!
//! Every variant is caught at file level and becomes an `Errored` decision;
//! none of them aborts a batch.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("encoder failed: {0}")]
    EncodeFailure(String),

    #[error("encoder produced an invalid file: {0}")]
    EncodeCorruption(String),

    #[error("metadata transfer failed: {0}")]
    MetadataTransferFailure(String),

    #[error("replacing {path} failed: {source}")]
    ReplacementIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output already exists: {0}")]
    OutputCollision(PathBuf),
}

/// Stable, serializable classification of an [`OptimizeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    EncodeFailure,
    EncodeCorruption,
    MetadataTransferFailure,
    ReplacementIo,
    Io,
    OutputCollision,
}

impl OptimizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptimizeError::Decode { .. } => ErrorKind::Decode,
            OptimizeError::EncodeFailure(_) => ErrorKind::EncodeFailure,
            OptimizeError::EncodeCorruption(_) => ErrorKind::EncodeCorruption,
            OptimizeError::MetadataTransferFailure(_) => ErrorKind::MetadataTransferFailure,
            OptimizeError::ReplacementIo { .. } => ErrorKind::ReplacementIo,
            OptimizeError::Io { .. } => ErrorKind::Io,
            OptimizeError::OutputCollision(_) => ErrorKind::OutputCollision,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OptimizeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimizeError>;
