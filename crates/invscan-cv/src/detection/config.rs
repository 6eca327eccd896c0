//! Detection configuration

use super::postprocess::DEFAULT_NMS_IOU;
use super::uncertainty::UncertaintyConfig;
use crate::palette::RarityPalette;
use crate::region::BandRegion;
use crate::resolution::{ResolutionProfile, ResolutionTier};
use crate::scoring::{ScoringConfig, ScoringPreset};
use crate::template::StrategyKind;
use crate::template::matcher::{DEFAULT_EARLY_EXIT, DEFAULT_EMPTY_SLOT_STD};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub template_dirs: Vec<PathBuf>,
    /// Root for relative catalog `image` paths.
    pub template_base_path: Option<String>,
    pub template_timeout_ms: u64,
    pub catalog_file: PathBuf,
    pub scoring_preset: ScoringPreset,
    pub nms_iou_threshold: f64,
    pub palette: RarityPalette,
    pub matching: MatchingConfig,
    pub grid: GridConfig,
    pub uncertainty: UncertaintyConfig,
    pub metrics_enabled: bool,
}

/// Per-cell matching knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub early_exit_threshold: f64,
    pub empty_slot_std: f64,
    /// Added to the profile's minimum confidence when the hotbar band is
    /// only a positional guess.
    pub fallback_band_penalty: f64,
}

/// Grid verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub verify: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            early_exit_threshold: DEFAULT_EARLY_EXIT,
            empty_slot_std: DEFAULT_EMPTY_SLOT_STD,
            fallback_band_penalty: 0.05,
        }
    }
}

impl MatchingConfig {
    /// Frame-level confidence floor for template candidates.
    pub fn dynamic_threshold(&self, profile: &ResolutionProfile, band: &BandRegion) -> f64 {
        let penalty = if band.is_fallback() { self.fallback_band_penalty } else { 0.0 };
        (profile.min_confidence + penalty).clamp(0.0, 0.95)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { verify: true }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            template_dirs: vec!["assets/items".into()],
            template_base_path: None,
            template_timeout_ms: 5_000,
            catalog_file: "assets/data/items.json".into(),
            scoring_preset: ScoringPreset::Default,
            nms_iou_threshold: DEFAULT_NMS_IOU,
            palette: RarityPalette::default(),
            matching: MatchingConfig::default(),
            grid: GridConfig::default(),
            uncertainty: UncertaintyConfig::default(),
            metrics_enabled: true,
        }
    }
}

impl DetectionConfig {
    /// Fewer false positives: precision scoring, tighter suppression
    pub fn for_precision() -> Self {
        Self {
            scoring_preset: ScoringPreset::Precision,
            nms_iou_threshold: 0.2,
            matching: MatchingConfig {
                early_exit_threshold: 0.95,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// More detections: recall scoring, looser suppression
    pub fn for_recall() -> Self {
        Self {
            scoring_preset: ScoringPreset::Recall,
            nms_iou_threshold: 0.4,
            matching: MatchingConfig {
                fallback_band_penalty: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Fast scoring, earlier exit, no grid verification
    pub fn fast() -> Self {
        Self {
            scoring_preset: ScoringPreset::Fast,
            matching: MatchingConfig {
                early_exit_threshold: 0.85,
                ..Default::default()
            },
            grid: GridConfig { verify: false },
            ..Default::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read detection config: {:?}", path.as_ref()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse detection config: {:?}", path.as_ref()))
    }

    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig::preset(self.scoring_preset)
    }
}

/// Read-only view of the settings one run actually used
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionConfigSnapshot {
    pub dynamic_threshold: f64,
    pub resolution_tier: ResolutionTier,
    pub selected_strategies: Vec<StrategyKind>,
    pub scoring_config: ScoringConfig,
}
