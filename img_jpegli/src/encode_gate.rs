//! Candidate encoding and validation
//!
//! The candidate is a dot-prefixed temp file in the target's own directory,
//! so the final replacement is a same-filesystem rename. The original path is
//! never opened for writing here. Dropping an [`EncodeResult`] deletes the
//! candidate.

use crate::encoder::{EncodeSetting, Encoder};
use crate::error::{OptimizeError, Result};
use crate::sample::{ImageSample, SourceKind};
use image::imageops::FilterType;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Corrupt(String),
}

#[derive(Debug)]
pub struct EncodeResult {
    candidate: NamedTempFile,
    size: u64,
    validity: Validity,
    setting: EncodeSetting,
}

impl EncodeResult {
    pub fn path(&self) -> &Path {
        self.candidate.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn setting(&self) -> EncodeSetting {
        self.setting
    }

    pub(crate) fn into_candidate(self) -> NamedTempFile {
        self.candidate
    }
}

/// Input handed to the encoder: the original file, or a lossless PNG of the
/// prepared pixels that lives as long as this value.
enum EncoderSource {
    Original(PathBuf),
    Prepared(NamedTempFile),
}

impl EncoderSource {
    fn path(&self) -> &Path {
        match self {
            EncoderSource::Original(path) => path,
            EncoderSource::Prepared(file) => file.path(),
        }
    }
}

pub struct EncodeGate<'a> {
    encoder: &'a dyn Encoder,
    max_dimension: Option<u32>,
}

impl<'a> EncodeGate<'a> {
    pub fn new(encoder: &'a dyn Encoder, max_dimension: Option<u32>) -> Self {
        Self {
            encoder,
            max_dimension,
        }
    }

    /// Encode `sample` with `setting` and measure the result.
    ///
    /// A candidate that is larger than the original is not an error here; a
    /// candidate that cannot be decoded is returned as [`Validity::Corrupt`].
    pub fn gate(&self, sample: &ImageSample, setting: EncodeSetting) -> Result<EncodeResult> {
        let target = sample.target_path();
        let (source, expected) = self.prepare_source(sample)?;

        let candidate = candidate_file(&target)?;
        self.encoder.encode(source.path(), setting, candidate.path())?;
        drop(source);

        let bytes =
            std::fs::read(candidate.path()).map_err(|e| OptimizeError::io(candidate.path(), e))?;
        let validity = validate(&bytes, expected);

        debug!(
            path = %sample.path().display(),
            %setting,
            candidate_size = bytes.len(),
            ?validity,
            "Candidate encoded"
        );

        Ok(EncodeResult {
            candidate,
            size: bytes.len() as u64,
            validity,
            setting,
        })
    }

    fn prepare_source(&self, sample: &ImageSample) -> Result<(EncoderSource, (u32, u32))> {
        let (w, h) = sample.dimensions();
        let resized = self.max_dimension.and_then(|max| fit_within(w, h, max));

        match (sample.kind(), resized) {
            (SourceKind::Jpeg, None) => Ok((EncoderSource::Original(sample.path().to_path_buf()), (w, h))),
            (_, dims) => {
                let mut image = sample.to_dynamic();
                if let Some((nw, nh)) = dims {
                    image = image.resize_exact(nw, nh, FilterType::Lanczos3);
                }
                let expected = (image.width(), image.height());

                let file = tempfile::Builder::new()
                    .prefix(".jpegli-src-")
                    .suffix(".png")
                    .tempfile()
                    .map_err(|e| OptimizeError::io(std::env::temp_dir(), e))?;
                image
                    .save_with_format(file.path(), ImageFormat::Png)
                    .map_err(|e| {
                        OptimizeError::EncodeFailure(format!("cannot write encoder source: {}", e))
                    })?;
                Ok((EncoderSource::Prepared(file), expected))
            }
        }
    }
}

/// Scaled dimensions when the longest side exceeds `max`, truncating like a
/// plain ratio multiply; `None` when no resize is needed.
pub fn fit_within(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max || max == 0 {
        return None;
    }
    let ratio = max as f64 / longest as f64;
    let scale = |v: u32| ((v as f64 * ratio) as u32).max(1);
    Some((scale(width), scale(height)))
}

fn candidate_file(target: &Path) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{}.", stem))
        .suffix(".tmp.jpg")
        .tempfile_in(&dir)
        .map_err(|e| OptimizeError::io(dir, e))
}

fn validate(bytes: &[u8], expected: (u32, u32)) -> Validity {
    if bytes.is_empty() {
        return Validity::Corrupt("empty output".to_string());
    }
    match image::load_from_memory_with_format(bytes, ImageFormat::Jpeg) {
        Err(e) => Validity::Corrupt(format!("not a decodable JPEG: {}", e)),
        Ok(img) if (img.width(), img.height()) != expected => Validity::Corrupt(format!(
            "dimensions {}x{} differ from expected {}x{}",
            img.width(),
            img.height(),
            expected.0,
            expected.1
        )),
        Ok(_) => Validity::Valid,
    }
}
