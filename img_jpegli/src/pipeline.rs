//! One file, end to end
//!
//! ```text
//! path -> ImageSample -> FeatureVector -> ComplexityScore -> DistanceTier
//!      -> EncodeGate -> SafeReplacer -> FileReport
//! ```

use crate::batch::CancelToken;
use crate::complexity::{ComplexityScore, ComplexityScorer};
use crate::config::OptimizeConfig;
use crate::distance::{DistanceSelector, DistanceTier};
use crate::encode_gate::EncodeGate;
use crate::encoder::{EncodeSetting, Encoder};
use crate::error::{OptimizeError, Result};
use crate::features::{extract, FeatureVector};
use crate::metadata::MetadataCopier;
use crate::safe_replace::{FileOutcome, ReplacementDecision, SafeReplacer};
use crate::sample::{ImageSample, SourceKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What the analyzer concluded about one image.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub width: u32,
    pub height: u32,
    pub original_size: u64,
    pub features: FeatureVector,
    pub score: ComplexityScore,
    pub tier: DistanceTier,
    /// The edge guard overrode the table lookup.
    pub edge_guarded: bool,
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
    pub analysis: Option<Analysis>,
    pub setting: Option<EncodeSetting>,
    pub elapsed: Duration,
}

/// The three pure stages: extract, score, select.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer {
    scorer: ComplexityScorer,
    selector: DistanceSelector,
}

impl Analyzer {
    pub fn new(config: &OptimizeConfig) -> Self {
        Self {
            scorer: ComplexityScorer::new(config.weights),
            selector: DistanceSelector::new(config.edge_guard),
        }
    }

    /// Decode and analyze without encoding.
    pub fn analyze(&self, path: &Path) -> Result<Analysis> {
        let sample = ImageSample::load(path)?;
        Ok(self.analyze_sample(&sample))
    }

    pub fn analyze_sample(&self, sample: &ImageSample) -> Analysis {
        let features = extract(sample);
        let score = self.scorer.score(&features);
        let tier = self.selector.select_for(&features, score);
        let (width, height) = sample.dimensions();

        Analysis {
            path: sample.path().to_path_buf(),
            kind: sample.kind(),
            width,
            height,
            original_size: sample.original_size(),
            features,
            score,
            tier,
            edge_guarded: tier != DistanceSelector::select(score),
        }
    }
}

pub struct Pipeline {
    config: OptimizeConfig,
    analyzer: Analyzer,
    encoder: Arc<dyn Encoder>,
    copier: Arc<dyn MetadataCopier>,
}

impl Pipeline {
    pub fn new(
        config: OptimizeConfig,
        encoder: Arc<dyn Encoder>,
        copier: Arc<dyn MetadataCopier>,
    ) -> Self {
        Self {
            analyzer: Analyzer::new(&config),
            config,
            encoder,
            copier,
        }
    }

    pub fn config(&self) -> &OptimizeConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Run the whole pipeline on `path`. Never panics on bad input; every
    /// failure is folded into the report.
    pub fn process(&self, path: &Path, cancel: &CancelToken) -> FileReport {
        let started = Instant::now();
        let mut report = FileReport {
            path: path.to_path_buf(),
            outcome: FileOutcome::Cancelled,
            analysis: None,
            setting: None,
            elapsed: Duration::ZERO,
        };

        if !cancel.is_cancelled() {
            report.outcome = self.run(path, cancel, &mut report);
        }
        report.elapsed = started.elapsed();

        if let FileOutcome::Decided(ReplacementDecision::Errored(e)) = &report.outcome {
            warn!(path = %path.display(), kind = ?e.kind(), error = %e, "File failed");
        }
        report
    }

    fn run(&self, path: &Path, cancel: &CancelToken, report: &mut FileReport) -> FileOutcome {
        let sample = match ImageSample::load(path) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };

        let setting = match self.config.quality {
            Some(q) => EncodeSetting::Quality(q),
            None => {
                let analysis = self.analyzer.analyze_sample(&sample);
                debug!(
                    path = %path.display(),
                    noise = analysis.features.noise,
                    texture = analysis.features.texture,
                    edge_density = analysis.features.edge_density,
                    score = analysis.score.value(),
                    tier = %analysis.tier,
                    edge_guarded = analysis.edge_guarded,
                    "Analyzed"
                );
                let setting = EncodeSetting::Distance(analysis.tier);
                report.analysis = Some(analysis);
                setting
            }
        };
        report.setting = Some(setting);

        let target = sample.target_path();
        if sample.writes_sibling() && target.exists() {
            return OptimizeError::OutputCollision(target).into();
        }

        let gate = EncodeGate::new(self.encoder.as_ref(), self.config.max_dimension);
        let result = match gate.gate(&sample, setting) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };

        SafeReplacer::new(self.copier.as_ref(), self.config.min_reduction_percent).replace(
            sample.path(),
            &target,
            sample.original_size(),
            sample.times(),
            result,
            cancel,
        )
    }
}
