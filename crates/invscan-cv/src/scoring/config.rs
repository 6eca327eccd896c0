//! Scoring configuration
//!
//! A `ScoringConfig` is a plain value handed to every scoring call. Swapping
//! presets at runtime goes through [`SharedScoringConfig`], which hands out
//! immutable snapshots.

use super::similarity::MetricScores;
use invscan_core::Rarity;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Relative weight of each similarity metric, roughly summing to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub ncc: f64,
    pub ssim: f64,
    pub histogram: f64,
    pub edge: f64,
}

impl MetricWeights {
    pub fn total(&self) -> f64 {
        self.ncc + self.ssim + self.histogram + self.edge
    }
}

/// Bonus for several metrics agreeing on a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementConfig {
    pub enabled: bool,
    /// A metric "agrees" when it is strictly above this value.
    pub threshold: f64,
    pub min_metrics_for_bonus: usize,
    pub bonus_per_metric: f64,
    pub max_bonus: f64,
}

/// Per-rarity offsets added to the base threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RarityThresholds {
    pub common: f64,
    pub uncommon: f64,
    pub rare: f64,
    pub epic: f64,
    pub legendary: f64,
    pub unknown: f64,
}

impl RarityThresholds {
    pub fn get(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Uncommon => self.uncommon,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
            Rarity::Unknown => self.unknown,
        }
    }
}

/// Named scoring presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringPreset {
    Default,
    Precision,
    Recall,
    Fast,
}

/// Everything that turns raw metric values into an accept/reject decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: MetricWeights,
    pub agreement: AgreementConfig,
    pub base_threshold: f64,
    pub rarity_thresholds: RarityThresholds,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

const DEFAULT_RARITY_THRESHOLDS: RarityThresholds = RarityThresholds {
    common: 0.05,
    uncommon: 0.03,
    rare: 0.0,
    epic: -0.02,
    legendary: -0.04,
    unknown: 0.08,
};

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: MetricWeights {
                ncc: 0.35,
                ssim: 0.25,
                histogram: 0.20,
                edge: 0.20,
            },
            agreement: AgreementConfig {
                enabled: true,
                threshold: 0.6,
                min_metrics_for_bonus: 3,
                bonus_per_metric: 0.02,
                max_bonus: 0.08,
            },
            base_threshold: 0.45,
            rarity_thresholds: DEFAULT_RARITY_THRESHOLDS,
            min_confidence: 0.0,
            max_confidence: 0.99,
        }
    }
}

impl ScoringConfig {
    /// Factory for the named presets
    pub fn preset(preset: ScoringPreset) -> Self {
        match preset {
            ScoringPreset::Default => Self::default(),
            ScoringPreset::Precision => Self::precision(),
            ScoringPreset::Recall => Self::recall(),
            ScoringPreset::Fast => Self::fast(),
        }
    }

    /// Fewer false positives: higher base threshold, stricter agreement
    pub fn precision() -> Self {
        Self {
            weights: MetricWeights {
                ncc: 0.35,
                ssim: 0.30,
                histogram: 0.15,
                edge: 0.20,
            },
            agreement: AgreementConfig {
                enabled: true,
                threshold: 0.65,
                min_metrics_for_bonus: 3,
                bonus_per_metric: 0.015,
                max_bonus: 0.05,
            },
            base_threshold: 0.55,
            ..Self::default()
        }
    }

    /// More matches at the cost of some misidentifications
    pub fn recall() -> Self {
        Self {
            weights: MetricWeights {
                ncc: 0.30,
                ssim: 0.25,
                histogram: 0.25,
                edge: 0.20,
            },
            agreement: AgreementConfig {
                enabled: true,
                threshold: 0.5,
                min_metrics_for_bonus: 2,
                bonus_per_metric: 0.03,
                max_bonus: 0.10,
            },
            base_threshold: 0.38,
            ..Self::default()
        }
    }

    /// Only the cheap metrics; SSIM and edges are skipped entirely
    pub fn fast() -> Self {
        Self {
            weights: MetricWeights {
                ncc: 0.6,
                ssim: 0.0,
                histogram: 0.4,
                edge: 0.0,
            },
            agreement: AgreementConfig {
                enabled: false,
                ..Self::default().agreement
            },
            ..Self::default()
        }
    }

    /// Combine four metric values with the configured weights.
    ///
    /// Metrics are clamped to [0, 1] first. When agreement is enabled and at
    /// least `min_metrics_for_bonus` metrics are above the agreement
    /// threshold, `min(count * bonus_per_metric, max_bonus)` is added. The
    /// result is clamped to `[min_confidence, max_confidence]`.
    pub fn calculate_weighted_score(&self, ncc: f64, ssim: f64, histogram: f64, edge: f64) -> f64 {
        self.weighted_score_with(&self.weights, ncc, ssim, histogram, edge)
    }

    /// [`calculate_weighted_score`](Self::calculate_weighted_score) with
    /// substitute weights, as used by strategies that emphasise one metric.
    pub fn weighted_score_with(
        &self,
        weights: &MetricWeights,
        ncc: f64,
        ssim: f64,
        histogram: f64,
        edge: f64,
    ) -> f64 {
        let metrics = [ncc, ssim, histogram, edge].map(|m| if m.is_finite() { m.clamp(0.0, 1.0) } else { 0.0 });

        let mut score = weights.ncc * metrics[0]
            + weights.ssim * metrics[1]
            + weights.histogram * metrics[2]
            + weights.edge * metrics[3];

        if self.agreement.enabled {
            let agreeing = metrics.iter().filter(|&&m| m > self.agreement.threshold).count();
            if agreeing >= self.agreement.min_metrics_for_bonus {
                score += (agreeing as f64 * self.agreement.bonus_per_metric).min(self.agreement.max_bonus);
            }
        }

        self.clamp_confidence(score)
    }

    pub fn score_metrics(&self, weights: &MetricWeights, scores: &MetricScores) -> f64 {
        self.weighted_score_with(weights, scores.ncc, scores.ssim, scores.histogram, scores.edge)
    }

    pub fn clamp_confidence(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.min_confidence;
        }
        value.clamp(self.min_confidence, self.max_confidence.max(self.min_confidence))
    }

    /// Acceptance threshold for a rarity name. Case-insensitive; anything
    /// unrecognised uses the `unknown` offset.
    pub fn get_threshold_for_rarity(&self, rarity: &str) -> f64 {
        self.threshold_for(Rarity::normalize(rarity))
    }

    pub fn threshold_for(&self, rarity: Rarity) -> f64 {
        (self.base_threshold + self.rarity_thresholds.get(rarity)).max(self.min_confidence)
    }

    pub fn passes_threshold(&self, score: f64, rarity: &str) -> bool {
        score >= self.get_threshold_for_rarity(rarity)
    }

    pub fn passes_for(&self, score: f64, rarity: Rarity) -> bool {
        score >= self.threshold_for(rarity)
    }

    /// Apply a deep-partial override on top of this config.
    pub fn apply(&mut self, overrides: &ScoringOverrides) {
        if let Some(w) = &overrides.weights {
            set(&mut self.weights.ncc, w.ncc);
            set(&mut self.weights.ssim, w.ssim);
            set(&mut self.weights.histogram, w.histogram);
            set(&mut self.weights.edge, w.edge);
        }
        if let Some(a) = &overrides.agreement {
            set(&mut self.agreement.enabled, a.enabled);
            set(&mut self.agreement.threshold, a.threshold);
            set(&mut self.agreement.min_metrics_for_bonus, a.min_metrics_for_bonus);
            set(&mut self.agreement.bonus_per_metric, a.bonus_per_metric);
            set(&mut self.agreement.max_bonus, a.max_bonus);
        }
        if let Some(r) = &overrides.rarity_thresholds {
            set(&mut self.rarity_thresholds.common, r.common);
            set(&mut self.rarity_thresholds.uncommon, r.uncommon);
            set(&mut self.rarity_thresholds.rare, r.rare);
            set(&mut self.rarity_thresholds.epic, r.epic);
            set(&mut self.rarity_thresholds.legendary, r.legendary);
            set(&mut self.rarity_thresholds.unknown, r.unknown);
        }
        set(&mut self.base_threshold, overrides.base_threshold);
        set(&mut self.min_confidence, overrides.min_confidence);
        set(&mut self.max_confidence, overrides.max_confidence);
    }
}

fn set<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Default config with `overrides` applied.
pub fn merge_with_defaults(overrides: &ScoringOverrides) -> ScoringConfig {
    let mut config = ScoringConfig::default();
    config.apply(overrides);
    config
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightOverrides {
    pub ncc: Option<f64>,
    pub ssim: Option<f64>,
    pub histogram: Option<f64>,
    pub edge: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementOverrides {
    pub enabled: Option<bool>,
    pub threshold: Option<f64>,
    pub min_metrics_for_bonus: Option<usize>,
    pub bonus_per_metric: Option<f64>,
    pub max_bonus: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RarityThresholdOverrides {
    pub common: Option<f64>,
    pub uncommon: Option<f64>,
    pub rare: Option<f64>,
    pub epic: Option<f64>,
    pub legendary: Option<f64>,
    pub unknown: Option<f64>,
}

/// Deep-partial [`ScoringConfig`]; every leaf is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOverrides {
    pub weights: Option<WeightOverrides>,
    pub agreement: Option<AgreementOverrides>,
    pub base_threshold: Option<f64>,
    pub rarity_thresholds: Option<RarityThresholdOverrides>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
}

/// Swappable scoring config shared between callers.
///
/// Readers get an `Arc` snapshot, so a swap never changes the config under
/// a run that already started. Mutating a plain `ScoringConfig` that several
/// runs read at once still needs outside synchronisation.
#[derive(Debug, Default)]
pub struct SharedScoringConfig {
    inner: RwLock<Arc<ScoringConfig>>,
}

impl SharedScoringConfig {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    pub fn get_scoring_config(&self) -> Arc<ScoringConfig> {
        Arc::clone(&self.inner.read())
    }

    /// Replace the whole config.
    pub fn set_scoring_config(&self, config: ScoringConfig) {
        *self.inner.write() = Arc::new(config);
    }

    pub fn use_preset(&self, preset: ScoringPreset) {
        self.set_scoring_config(ScoringConfig::preset(preset));
    }
}
