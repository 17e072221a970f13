//! Optimizer configuration
//!
//! Built from command-line flags in `main`; library callers use the builder
//! methods. There is no persisted config file.

use crate::complexity::ComplexityWeights;
use crate::distance::EdgeGuard;
use crate::encoder::DEFAULT_ENCODER_TIMEOUT;
use crate::metadata::DEFAULT_EXIFTOOL_TIMEOUT;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MIN_REDUCTION_PERCENT: f64 = 5.0;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("quality must be between 1 and 100, got {0}")]
    Quality(u8),

    #[error("minimum reduction must be within [0, 100), got {0}")]
    MinReduction(f64),

    #[error("max size must be at least 1 pixel")]
    MaxDimension,

    #[error("{0} timeout must be non-zero")]
    Timeout(&'static str),
}

#[derive(Debug, Clone)]
pub struct OptimizeConfig {
    /// A candidate must be more than this many percent smaller to replace.
    pub min_reduction_percent: f64,
    /// Manual quality; `None` selects the adaptive distance.
    pub quality: Option<u8>,
    /// Longest side after optional Lanczos3 downscale.
    pub max_dimension: Option<u32>,
    pub edge_guard: Option<EdgeGuard>,
    pub weights: ComplexityWeights,
    /// Worker threads, and so the bound on concurrent encoder processes.
    pub workers: usize,
    pub encoder_timeout: Duration,
    pub exiftool_timeout: Duration,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            min_reduction_percent: DEFAULT_MIN_REDUCTION_PERCENT,
            quality: None,
            max_dimension: None,
            edge_guard: Some(EdgeGuard::default()),
            weights: ComplexityWeights::default(),
            workers: shared_utils::default_worker_count(),
            encoder_timeout: DEFAULT_ENCODER_TIMEOUT,
            exiftool_timeout: DEFAULT_EXIFTOOL_TIMEOUT,
        }
    }
}

impl OptimizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_reduction(mut self, percent: f64) -> Self {
        self.min_reduction_percent = percent;
        self
    }

    pub fn with_quality(mut self, quality: Option<u8>) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_max_dimension(mut self, max: Option<u32>) -> Self {
        self.max_dimension = max;
        self
    }

    pub fn with_edge_guard(mut self, guard: Option<EdgeGuard>) -> Self {
        self.edge_guard = guard;
        self
    }

    pub fn with_weights(mut self, weights: ComplexityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = shared_utils::resolve_worker_count(workers);
        self
    }

    pub fn with_timeouts(mut self, encoder: Duration, exiftool: Duration) -> Self {
        self.encoder_timeout = encoder;
        self.exiftool_timeout = exiftool;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(q) = self.quality {
            if !(1..=100).contains(&q) {
                return Err(ConfigError::Quality(q));
            }
        }
        let r = self.min_reduction_percent;
        if !r.is_finite() || !(0.0..100.0).contains(&r) {
            return Err(ConfigError::MinReduction(r));
        }
        if self.max_dimension == Some(0) {
            return Err(ConfigError::MaxDimension);
        }
        if self.encoder_timeout.is_zero() {
            return Err(ConfigError::Timeout("encoder"));
        }
        if self.exiftool_timeout.is_zero() {
            return Err(ConfigError::Timeout("exiftool"));
        }
        Ok(())
    }
}
