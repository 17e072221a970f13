//! Complexity scoring
//!
//! A weighted sum of the three features. Weights are non-negative and
//! normalized, so the score is monotonic non-decreasing in every feature and
//! stays in [0, 1].

use crate::features::FeatureVector;
use serde::Serialize;

/// Scalar in [0, 1]; higher means busier content that hides more artifacts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct ComplexityScore(f64);

impl ComplexityScore {
    /// Clamp into [0, 1]; NaN becomes 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityWeights {
    pub noise: f64,
    pub texture: f64,
    pub edge_density: f64,
}

impl Default for ComplexityWeights {
    /// Edges weigh less, so text and line art land in finer tiers than noisy,
    /// busy photographs with the same raw activity.
    fn default() -> Self {
        Self {
            noise: 0.40,
            texture: 0.40,
            edge_density: 0.20,
        }
    }
}

impl ComplexityWeights {
    /// Negative or non-finite weights become 0; the rest are scaled to sum 1.
    /// All-zero input falls back to the defaults.
    pub fn normalized(self) -> Self {
        let sanitize = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let (n, t, e) = (
            sanitize(self.noise),
            sanitize(self.texture),
            sanitize(self.edge_density),
        );
        let sum = n + t + e;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            noise: n / sum,
            texture: t / sum,
            edge_density: e / sum,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ComplexityScorer {
    weights: ComplexityWeights,
}

impl Default for ComplexityScorer {
    fn default() -> Self {
        Self::new(ComplexityWeights::default())
    }
}

impl ComplexityScorer {
    pub fn new(weights: ComplexityWeights) -> Self {
        Self {
            weights: weights.normalized(),
        }
    }

    pub fn weights(&self) -> ComplexityWeights {
        self.weights
    }

    pub fn score(&self, features: &FeatureVector) -> ComplexityScore {
        let w = &self.weights;
        let clean = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        ComplexityScore::new(
            w.noise * clean(features.noise)
                + w.texture * clean(features.texture)
                + w.edge_density * clean(features.edge_density),
        )
    }
}
