//! Decoded source images
//!
//! An [`ImageSample`] owns the 8-bit pixels of one input file. Transparency is
//! flattened onto white at load time, so everything downstream (features,
//! temporary encoder sources) sees an opaque grey or RGB grid.

use crate::error::{OptimizeError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use serde::Serialize;
use shared_utils::{has_extension, FileTimestamps};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Jpeg,
    Png,
}

#[derive(Debug, Clone)]
pub enum Pixels {
    Luma(GrayImage),
    Rgb(RgbImage),
}

#[derive(Debug, Clone)]
pub struct ImageSample {
    path: PathBuf,
    kind: SourceKind,
    original_size: u64,
    pixels: Pixels,
    times: Option<FileTimestamps>,
}

impl ImageSample {
    /// Read and decode `path`. The format is taken from the file content, not
    /// the extension.
    /// The source's timestamps are captured before the read moves its atime.
    pub fn load(path: &Path) -> Result<Self> {
        let times = FileTimestamps::capture(path).map_err(|e| OptimizeError::io(path, e))?;
        let bytes = std::fs::read(path).map_err(|e| OptimizeError::io(path, e))?;
        let mut sample = Self::from_bytes(path, &bytes)?;
        sample.times = Some(times);
        Ok(sample)
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let decode_err = |reason: String| OptimizeError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let format = image::guess_format(bytes).map_err(|e| decode_err(e.to_string()))?;
        let kind = match format {
            ImageFormat::Jpeg => SourceKind::Jpeg,
            ImageFormat::Png => SourceKind::Png,
            other => return Err(decode_err(format!("unsupported format {:?}", other))),
        };

        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| decode_err(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            original_size: bytes.len() as u64,
            pixels: flatten(image),
            times: None,
        })
    }

    /// Build a sample from pixels already in memory.
    pub fn from_pixels(path: &Path, kind: SourceKind, original_size: u64, pixels: Pixels) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            original_size,
            pixels,
            times: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    /// Timestamps taken by [`ImageSample::load`]; `None` for in-memory samples.
    pub fn times(&self) -> Option<FileTimestamps> {
        self.times
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match &self.pixels {
            Pixels::Luma(img) => img.dimensions(),
            Pixels::Rgb(img) => img.dimensions(),
        }
    }

    /// The file the optimized JPEG ends up at: the source itself, or the
    /// sibling `.jpg` of a PNG. A PNG already named `.jpg`/`.jpeg` is
    /// replaced in place.
    pub fn target_path(&self) -> PathBuf {
        match self.kind {
            SourceKind::Png if !has_extension(&self.path, &["jpg", "jpeg"]) => {
                self.path.with_extension("jpg")
            }
            _ => self.path.clone(),
        }
    }

    /// The optimized JPEG goes to a new file next to the source.
    pub fn writes_sibling(&self) -> bool {
        self.target_path() != self.path
    }

    /// Luminance plane. Rec.601 weights in integer arithmetic.
    pub fn luma(&self) -> GrayImage {
        match &self.pixels {
            Pixels::Luma(img) => img.clone(),
            Pixels::Rgb(img) => {
                let (w, h) = img.dimensions();
                let data = img
                    .pixels()
                    .map(|p| {
                        let [r, g, b] = p.0;
                        ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
                    })
                    .collect();
                // buffer length is w*h by construction
                GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
            }
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match &self.pixels {
            Pixels::Luma(img) => DynamicImage::ImageLuma8(img.clone()),
            Pixels::Rgb(img) => DynamicImage::ImageRgb8(img.clone()),
        }
    }
}

/// Reduce any decoded image to opaque 8-bit grey or RGB.
fn flatten(image: DynamicImage) -> Pixels {
    let is_grey = !image.color().has_color();
    let has_alpha = image.color().has_alpha();

    match (is_grey, has_alpha) {
        (true, false) => Pixels::Luma(image.into_luma8()),
        (false, false) => Pixels::Rgb(image.into_rgb8()),
        (true, true) => {
            let la = image.into_luma_alpha8();
            let (w, h) = la.dimensions();
            let mut out = GrayImage::new(w, h);
            for (dst, src) in out.pixels_mut().zip(la.pixels()) {
                let [l, a] = src.0;
                dst.0 = [over_white(l, a)];
            }
            Pixels::Luma(out)
        }
        (false, true) => {
            let rgba = image.into_rgba8();
            let (w, h) = rgba.dimensions();
            let mut out = RgbImage::new(w, h);
            for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
                let [r, g, b, a] = src.0;
                dst.0 = [over_white(r, a), over_white(g, a), over_white(b, a)];
            }
            Pixels::Rgb(out)
        }
    }
}

fn over_white(value: u8, alpha: u8) -> u8 {
    let (v, a) = (value as u32, alpha as u32);
    ((v * a + 255 * (255 - a) + 127) / 255) as u8
}
