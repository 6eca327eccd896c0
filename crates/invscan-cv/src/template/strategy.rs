//! Matching strategies and the per-tier registry

use super::DEFAULT_TEMPLATE_SET;
use crate::resolution::ResolutionTier;
use crate::scoring::MetricWeights;
use crate::utils::{ImageUtils, mean_std};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Frames darker than this lean on colour rather than structure.
const DARK_FRAME_LUMA: f64 = 50.0;
/// Frames flatter than this have too little gradient for edge matching.
const LOW_CONTRAST_STD: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Standard,
    EdgeFocused,
    ColorFocused,
    MultiScale,
}

impl StrategyKind {
    /// Weights that replace the scoring config's, if the strategy has its own
    pub fn metric_weights(self) -> Option<MetricWeights> {
        match self {
            StrategyKind::Standard | StrategyKind::MultiScale => None,
            StrategyKind::EdgeFocused => Some(MetricWeights {
                ncc: 0.30,
                ssim: 0.20,
                histogram: 0.10,
                edge: 0.40,
            }),
            StrategyKind::ColorFocused => Some(MetricWeights {
                ncc: 0.25,
                ssim: 0.15,
                histogram: 0.50,
                edge: 0.10,
            }),
        }
    }

    fn default_weight(self) -> f64 {
        match self {
            StrategyKind::Standard | StrategyKind::MultiScale => 1.0,
            StrategyKind::EdgeFocused => 0.95,
            StrategyKind::ColorFocused => 0.9,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Standard => "standard",
            StrategyKind::EdgeFocused => "edge_focused",
            StrategyKind::ColorFocused => "color_focused",
            StrategyKind::MultiScale => "multi_scale",
        };
        f.write_str(name)
    }
}

/// One way of scoring a cell against a template set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub min_confidence: f64,
    /// Multiplier used when ranking candidates across strategies.
    pub weight: f64,
    pub template_set: String,
    pub metric_weights: Option<MetricWeights>,
    /// Try every profile template scale instead of the full cell only.
    pub multi_scale: bool,
}

impl Strategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            min_confidence: 0.5,
            weight: kind.default_weight(),
            template_set: DEFAULT_TEMPLATE_SET.to_string(),
            metric_weights: kind.metric_weights(),
            multi_scale: kind == StrategyKind::MultiScale,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_template_set(mut self, name: impl Into<String>) -> Self {
        self.template_set = name.into();
        self
    }
}

/// Strategy lists per resolution tier
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRegistry {
    by_tier: HashMap<ResolutionTier, Vec<Strategy>>,
}

impl StrategyRegistry {
    /// A registry with no strategies at all
    pub fn empty() -> Self {
        Self { by_tier: HashMap::new() }
    }

    pub fn register(&mut self, tier: ResolutionTier, strategies: Vec<Strategy>) {
        self.by_tier.insert(tier, strategies);
    }

    pub fn strategies_for(&self, tier: ResolutionTier) -> &[Strategy] {
        self.by_tier.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        use StrategyKind::*;
        let list = |kinds: &[StrategyKind]| -> Vec<Strategy> { kinds.iter().map(|&k| Strategy::new(k)).collect() };

        let mut registry = Self::empty();
        registry.register(ResolutionTier::Low, list(&[ColorFocused, Standard]));
        registry.register(ResolutionTier::Medium, list(&[Standard, EdgeFocused]));
        registry.register(ResolutionTier::High, list(&[Standard, EdgeFocused, MultiScale]));
        registry.register(ResolutionTier::Ultra, list(&[EdgeFocused, Standard, MultiScale]));
        registry
    }
}

/// Strategies for a frame: the tier's list, adjusted for lighting.
///
/// Dark frames move colour matching to the front (adding it if the tier
/// lacks it). Low-contrast frames drop edge matching.
pub fn select_strategies_for_image(
    img: &RgbaImage,
    tier: ResolutionTier,
    registry: &StrategyRegistry,
) -> Vec<Strategy> {
    let mut strategies = registry.strategies_for(tier).to_vec();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return strategies;
    }

    let stride = (width.min(height) / 100).max(1) as usize;
    let (mean, std) = mean_std(
        (0..height)
            .step_by(stride)
            .flat_map(|y| (0..width).step_by(stride).map(move |x| (x, y)))
            .map(|(x, y)| ImageUtils::brightness(img.get_pixel(x, y))),
    );

    if mean < DARK_FRAME_LUMA {
        let color = match strategies.iter().position(|s| s.kind == StrategyKind::ColorFocused) {
            Some(i) => strategies.remove(i),
            None => Strategy::new(StrategyKind::ColorFocused),
        };
        strategies.insert(0, color);
    }

    if std < LOW_CONTRAST_STD {
        strategies.retain(|s| s.kind != StrategyKind::EdgeFocused);
        if strategies.is_empty() {
            strategies.push(Strategy::new(StrategyKind::Standard));
        }
    }

    debug!(
        ?tier,
        mean,
        std,
        selected = ?strategies.iter().map(|s| s.kind).collect::<Vec<_>>(),
        "Selected strategies"
    );
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use image::Rgba;

    fn kinds(strategies: &[Strategy]) -> Vec<StrategyKind> {
        strategies.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_default_registry_by_tier() {
        let registry = StrategyRegistry::default();
        use StrategyKind::*;
        assert_eq!(kinds(registry.strategies_for(ResolutionTier::Low)), vec![ColorFocused, Standard]);
        assert_eq!(kinds(registry.strategies_for(ResolutionTier::Medium)), vec![Standard, EdgeFocused]);
        assert_eq!(
            kinds(registry.strategies_for(ResolutionTier::Ultra)),
            vec![EdgeFocused, Standard, MultiScale]
        );
        assert!(StrategyRegistry::empty().strategies_for(ResolutionTier::High).is_empty());
    }

    #[test]
    fn test_strategy_defaults() {
        let multi = Strategy::new(StrategyKind::MultiScale);
        assert!(multi.multi_scale);
        assert!(multi.metric_weights.is_none());
        let edge = Strategy::new(StrategyKind::EdgeFocused);
        assert!(!edge.multi_scale);
        assert!((edge.metric_weights.unwrap().total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_busy_frame_keeps_tier_order() {
        let frame = testutil::busy_frame(400, 300);
        let selected = select_strategies_for_image(&frame, ResolutionTier::High, &StrategyRegistry::default());
        use StrategyKind::*;
        assert_eq!(kinds(&selected), vec![Standard, EdgeFocused, MultiScale]);
    }

    #[test]
    fn test_dark_flat_frame_prefers_colour_and_drops_edges() {
        let frame = RgbaImage::from_pixel(400, 300, Rgba([15, 15, 20, 255]));
        let selected = select_strategies_for_image(&frame, ResolutionTier::Medium, &StrategyRegistry::default());
        use StrategyKind::*;
        assert_eq!(kinds(&selected), vec![ColorFocused, Standard]);
    }

    #[test]
    fn test_bright_flat_frame_drops_edges_only() {
        let frame = RgbaImage::from_pixel(400, 300, Rgba([180, 180, 180, 255]));
        let selected = select_strategies_for_image(&frame, ResolutionTier::Ultra, &StrategyRegistry::default());
        use StrategyKind::*;
        assert_eq!(kinds(&selected), vec![Standard, MultiScale]);
    }
}
