//! Complexity score to cjpegli distance
//!
//! One table of band lower bounds drives the mapping. Bands are contiguous,
//! lower-inclusive, and the top band also takes a score of exactly 1.0.

use crate::complexity::ComplexityScore;
use crate::features::FeatureVector;
use serde::{Serialize, Serializer};
use std::fmt;

/// Discrete cjpegli distances, ordered from finest to most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DistanceTier {
    Fine,
    Balanced,
    Standard,
    Aggressive,
}

impl DistanceTier {
    pub const ALL: [DistanceTier; 4] = [
        DistanceTier::Fine,
        DistanceTier::Balanced,
        DistanceTier::Standard,
        DistanceTier::Aggressive,
    ];

    pub fn distance(self) -> f32 {
        match self {
            DistanceTier::Fine => 0.65,
            DistanceTier::Balanced => 0.80,
            DistanceTier::Standard => 1.00,
            DistanceTier::Aggressive => 1.20,
        }
    }

    pub fn lowest() -> Self {
        DistanceTier::Fine
    }
}

impl fmt::Display for DistanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.distance())
    }
}

impl Serialize for DistanceTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(self.distance())
    }
}

/// `(lower bound, tier)`, ascending.
const TIER_TABLE: [(f64, DistanceTier); 4] = [
    (0.00, DistanceTier::Fine),
    (0.25, DistanceTier::Balanced),
    (0.50, DistanceTier::Standard),
    (0.75, DistanceTier::Aggressive),
];

/// Clean synthetic content (text, screenshots, line art): many hard edges and
/// almost no sensor noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeGuard {
    pub min_edge_density: f64,
    pub max_noise: f64,
}

impl Default for EdgeGuard {
    fn default() -> Self {
        Self {
            min_edge_density: 0.20,
            max_noise: 0.05,
        }
    }
}

impl EdgeGuard {
    pub fn triggers(&self, features: &FeatureVector) -> bool {
        features.edge_density >= self.min_edge_density && features.noise < self.max_noise
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceSelector {
    edge_guard: Option<EdgeGuard>,
}

impl DistanceSelector {
    pub fn new(edge_guard: Option<EdgeGuard>) -> Self {
        Self { edge_guard }
    }

    /// Pure table lookup.
    pub fn select(score: ComplexityScore) -> DistanceTier {
        let s = score.value();
        TIER_TABLE
            .iter()
            .rev()
            .find(|(lower, _)| s >= *lower)
            .map(|(_, tier)| *tier)
            .unwrap_or(DistanceTier::Fine)
    }

    /// Table lookup with the edge guard applied: guarded content always gets
    /// the lowest tier.
    pub fn select_for(&self, features: &FeatureVector, score: ComplexityScore) -> DistanceTier {
        match self.edge_guard {
            Some(guard) if guard.triggers(features) => DistanceTier::lowest(),
            _ => Self::select(score),
        }
    }
}
