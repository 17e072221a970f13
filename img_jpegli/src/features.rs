//! Pixel-content features
//!
//! Three resolution-invariant scalars in [0, 1], measured on the luminance
//! plane:
//!
//! ```text
//! noise        mean |Y - gauss3x3(Y)|              / NOISE_REFERENCE
//! texture      mean 3x3 local standard deviation   / TEXTURE_REFERENCE
//! edge_density Sobel pixels with |g| > EDGE_THRESHOLD / all pixels
//! ```
//!
//! Per-pixel work is integer arithmetic. Rows are evaluated in parallel but
//! their partial sums are collected in row order and added sequentially, so
//! the result is bit-identical from run to run regardless of thread count.

use crate::sample::ImageSample;
use image::GrayImage;
use rayon::prelude::*;
use serde::Serialize;

/// Grey levels of mean blur residual that count as fully noisy.
pub const NOISE_REFERENCE: f64 = 12.0;
/// Grey levels of mean local deviation that count as fully textured.
pub const TEXTURE_REFERENCE: f64 = 40.0;
/// Sobel magnitude above which a pixel is an edge.
pub const EDGE_THRESHOLD: i64 = 96;
/// Noise is measured on the centered crop of this size for larger images.
pub const NOISE_CROP: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FeatureVector {
    pub noise: f64,
    pub texture: f64,
    pub edge_density: f64,
}

pub fn extract(sample: &ImageSample) -> FeatureVector {
    extract_luma(&sample.luma())
}

/// Features of a luminance plane. Planes smaller than 3x3 have no interior
/// and yield all zeros.
pub fn extract_luma(luma: &GrayImage) -> FeatureVector {
    let (width, height) = luma.dimensions();
    if width < 3 || height < 3 {
        return FeatureVector::default();
    }
    let plane = Plane {
        data: luma.as_raw(),
        width: width as usize,
    };

    FeatureVector {
        noise: noise_level(&plane, noise_region(width, height)),
        texture: texture_level(&plane, height as usize),
        edge_density: edge_density(&plane, height as usize),
    }
}

struct Plane<'a> {
    data: &'a [u8],
    width: usize,
}

impl Plane<'_> {
    #[inline]
    fn at(&self, x: usize, y: usize) -> i64 {
        self.data[y * self.width + x] as i64
    }
}

/// `(x0, y0, w, h)` of the region used for noise estimation.
fn noise_region(width: u32, height: u32) -> (usize, usize, usize, usize) {
    if width > NOISE_CROP && height > NOISE_CROP {
        let x0 = (width - NOISE_CROP) / 2;
        let y0 = (height - NOISE_CROP) / 2;
        (x0 as usize, y0 as usize, NOISE_CROP as usize, NOISE_CROP as usize)
    } else {
        (0, 0, width as usize, height as usize)
    }
}

fn noise_level(plane: &Plane, (x0, y0, w, h): (usize, usize, usize, usize)) -> f64 {
    let rows: Vec<u64> = (y0 + 1..y0 + h - 1)
        .into_par_iter()
        .map(|y| {
            let mut sum = 0u64;
            for x in x0 + 1..x0 + w - 1 {
                let blur16 = plane.at(x - 1, y - 1)
                    + 2 * plane.at(x, y - 1)
                    + plane.at(x + 1, y - 1)
                    + 2 * plane.at(x - 1, y)
                    + 4 * plane.at(x, y)
                    + 2 * plane.at(x + 1, y)
                    + plane.at(x - 1, y + 1)
                    + 2 * plane.at(x, y + 1)
                    + plane.at(x + 1, y + 1);
                sum += (16 * plane.at(x, y) - blur16).unsigned_abs();
            }
            sum
        })
        .collect();

    let total: u64 = rows.iter().sum();
    let count = ((w - 2) * (h - 2)) as f64;
    normalize(total as f64 / 16.0 / count, NOISE_REFERENCE)
}

fn texture_level(plane: &Plane, height: usize) -> f64 {
    let width = plane.width;
    let rows: Vec<f64> = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            let mut sum_std = 0.0f64;
            for x in 1..width - 1 {
                let mut sum = 0i64;
                let mut sq_sum = 0i64;
                for yy in y - 1..=y + 1 {
                    for xx in x - 1..=x + 1 {
                        let v = plane.at(xx, yy);
                        sum += v;
                        sq_sum += v * v;
                    }
                }
                // 81 * variance, exact in integers
                let var81 = 9 * sq_sum - sum * sum;
                sum_std += (var81 as f64).sqrt() / 9.0;
            }
            sum_std
        })
        .collect();

    let total: f64 = rows.iter().sum();
    let count = ((width - 2) * (height - 2)) as f64;
    normalize(total / count, TEXTURE_REFERENCE)
}

fn edge_density(plane: &Plane, height: usize) -> f64 {
    let width = plane.width;
    let threshold_sq = EDGE_THRESHOLD * EDGE_THRESHOLD;
    let rows: Vec<u64> = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            let mut edges = 0u64;
            for x in 1..width - 1 {
                let gx = (plane.at(x + 1, y - 1) + 2 * plane.at(x + 1, y) + plane.at(x + 1, y + 1))
                    - (plane.at(x - 1, y - 1) + 2 * plane.at(x - 1, y) + plane.at(x - 1, y + 1));
                let gy = (plane.at(x - 1, y + 1) + 2 * plane.at(x, y + 1) + plane.at(x + 1, y + 1))
                    - (plane.at(x - 1, y - 1) + 2 * plane.at(x, y - 1) + plane.at(x + 1, y - 1));
                if gx * gx + gy * gy > threshold_sq {
                    edges += 1;
                }
            }
            edges
        })
        .collect();

    let total: u64 = rows.iter().sum();
    (total as f64 / (width * height) as f64).clamp(0.0, 1.0)
}

fn normalize(value: f64, reference: f64) -> f64 {
    if value.is_finite() {
        (value / reference).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
