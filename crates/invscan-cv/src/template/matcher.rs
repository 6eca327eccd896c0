//! Ensemble template matching over one grid cell

use super::strategy::{Strategy, StrategyKind};
use super::{Template, TemplateLibrary};
use crate::resolution::ResolutionProfile;
use crate::scoring::{MetricScores, MetricWeights, ScoringConfig, compare_patches_with};
use crate::utils::{ImageUtils, LumaPlane};
use image::RgbaImage;
use invscan_core::Entity;
use serde::Serialize;
use tracing::{debug, trace};

pub const DEFAULT_EARLY_EXIT: f64 = 0.9;
/// Cells whose luma deviates less than this are empty slots.
pub const DEFAULT_EMPTY_SLOT_STD: f64 = 4.0;

/// Best template found for a cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleMatch {
    pub entity: Entity,
    pub confidence: f64,
    pub strategy: StrategyKind,
    pub scale: f64,
    pub scores: MetricScores,
    /// `confidence * strategy.weight`, used to rank across strategies.
    pub rank_score: f64,
}

/// Runs every selected strategy against a cell and keeps the best match
#[derive(Debug, Clone)]
pub struct EnsembleMatcher {
    dynamic_threshold: f64,
    early_exit_threshold: f64,
    empty_slot_std: f64,
}

impl EnsembleMatcher {
    /// Create a matcher for one frame; `dynamic_threshold` is the frame's
    /// minimum acceptable confidence.
    pub fn new(dynamic_threshold: f64) -> Self {
        Self {
            dynamic_threshold,
            early_exit_threshold: DEFAULT_EARLY_EXIT,
            empty_slot_std: DEFAULT_EMPTY_SLOT_STD,
        }
    }

    pub fn with_early_exit(mut self, threshold: f64) -> Self {
        self.early_exit_threshold = threshold;
        self
    }

    pub fn with_empty_slot_std(mut self, std: f64) -> Self {
        self.empty_slot_std = std;
        self
    }

    pub fn dynamic_threshold(&self) -> f64 {
        self.dynamic_threshold
    }

    /// Identify the icon in `cell`, or `None` when the slot is empty or no
    /// template clears the thresholds. Strategies whose template set is not
    /// loaded are skipped.
    pub fn run_ensemble_detection(
        &self,
        cell: &RgbaImage,
        library: &TemplateLibrary,
        strategies: &[Strategy],
        scoring: &ScoringConfig,
        profile: &ResolutionProfile,
    ) -> Option<EnsembleMatch> {
        if cell.width() == 0 || cell.height() == 0 {
            return None;
        }
        let (_, std) = LumaPlane::from_rgba(cell).mean_std();
        if std < self.empty_slot_std {
            trace!(std, "Uniform cell, treating as empty slot");
            return None;
        }

        let mut best: Option<EnsembleMatch> = None;

        'strategies: for strategy in strategies {
            let Some(set) = library.get(&strategy.template_set) else {
                debug!(strategy = %strategy.kind, set = %strategy.template_set, "Template set not loaded, skipping");
                continue;
            };

            let weights = strategy.metric_weights.unwrap_or(scoring.weights);
            let floor = strategy.min_confidence.max(self.dynamic_threshold);
            let scales: &[f64] = if strategy.multi_scale { &profile.template_scales } else { &[1.0] };

            for &scale in scales {
                let window = ImageUtils::center_crop(cell, scale);
                let mut resized: Option<((u32, u32), RgbaImage)> = None;

                for template in set.iter() {
                    let size = template.image.dimensions();
                    if resized.as_ref().is_none_or(|(s, _)| *s != size) {
                        resized = Some((size, ImageUtils::resize(&window, size.0, size.1)));
                    }
                    let Some((_, patch)) = resized.as_ref() else { continue };

                    let Some(candidate) = score_candidate(patch, template, &weights, scoring, floor) else {
                        continue;
                    };

                    let rank_score = candidate.1 * strategy.weight;
                    if best.as_ref().is_none_or(|b| rank_score > b.rank_score) {
                        best = Some(EnsembleMatch {
                            entity: template.entity.clone(),
                            confidence: candidate.1,
                            strategy: strategy.kind,
                            scale,
                            scores: candidate.0,
                            rank_score,
                        });
                    }

                    if candidate.1 > self.early_exit_threshold {
                        trace!(id = %template.entity.id, score = candidate.1, "Early exit");
                        break 'strategies;
                    }
                }
            }
        }

        if let Some(found) = &best {
            debug!(
                id = %found.entity.id,
                confidence = found.confidence,
                strategy = %found.strategy,
                scale = found.scale,
                "Cell matched"
            );
        }
        best
    }
}

impl Default for EnsembleMatcher {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Score one template; `None` unless it passes both the rarity threshold
/// and `floor`.
fn score_candidate(
    patch: &RgbaImage,
    template: &Template,
    weights: &MetricWeights,
    scoring: &ScoringConfig,
    floor: f64,
) -> Option<(MetricScores, f64)> {
    let scores = compare_patches_with(patch, &template.image, Some(weights));
    let score = scoring.score_metrics(weights, &scores);

    if !scoring.passes_for(score, template.entity.rarity) || score < floor {
        return None;
    }
    Some((scores, score))
}
