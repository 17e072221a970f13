//! Adaptive-distance JPEG re-encoding with safe in-place replacement
//!
//! Each image is scored by how much visual complexity it carries, the score
//! picks a jpegli butteraugli distance, and the re-encoded candidate only
//! replaces the original when it is valid, meaningfully smaller, and has
//! received the original's metadata.

pub mod batch;
pub mod complexity;
pub mod config;
pub mod distance;
pub mod encode_gate;
pub mod encoder;
pub mod error;
pub mod features;
pub mod metadata;
pub mod pipeline;
pub mod safe_replace;
pub mod sample;

pub use batch::{BatchCoordinator, BatchTally, CancelToken, FileStatus, FileSummary};
pub use complexity::{ComplexityScore, ComplexityScorer, ComplexityWeights};
pub use config::{ConfigError, OptimizeConfig, DEFAULT_MIN_REDUCTION_PERCENT};
pub use distance::{DistanceSelector, DistanceTier, EdgeGuard};
pub use encode_gate::{fit_within, EncodeGate, EncodeResult, Validity};
pub use encoder::{CjpegliEncoder, EncodeSetting, Encoder, DEFAULT_ENCODER_TIMEOUT};
pub use error::{ErrorKind, OptimizeError, Result};
pub use features::{extract, extract_luma, FeatureVector};
pub use metadata::{ExifToolCopier, MetadataCopier, DEFAULT_EXIFTOOL_TIMEOUT};
pub use pipeline::{Analysis, Analyzer, FileReport, Pipeline};
pub use safe_replace::{size_verdict, FileOutcome, ReplacementDecision, SafeReplacer, SizeVerdict};
pub use sample::{ImageSample, Pixels, SourceKind};
