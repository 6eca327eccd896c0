//! Flag ambiguous detections for human confirmation

use super::result::DetectionResult;
use invscan_core::{Catalog, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyConfig {
    /// Inclusive confidence band considered ambiguous.
    pub band: (f64, f64),
    pub max_alternatives: usize,
    /// Confidence drop per alternative rank.
    pub alternative_step: f64,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            band: (0.4, 0.6),
            max_alternatives: 3,
            alternative_step: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alternative {
    pub entity: Entity,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertainDetection {
    pub detection: DetectionResult,
    pub alternatives: Vec<Alternative>,
}

/// Detections inside the ambiguous band, each with ranked lookalikes.
pub fn get_uncertain_detections_from_results(
    detections: &[DetectionResult],
    catalog: &Catalog,
    config: &UncertaintyConfig,
) -> Vec<UncertainDetection> {
    let (low, high) = config.band;

    detections
        .iter()
        .filter(|d| d.confidence >= low && d.confidence <= high)
        .map(|d| {
            let alternatives = catalog
                .similar_entities(&d.entity, config.max_alternatives)
                .into_iter()
                .enumerate()
                .map(|(rank, entity)| Alternative {
                    entity: entity.clone(),
                    confidence: (d.confidence - config.alternative_step * (rank + 1) as f64).max(0.0),
                })
                .collect();

            UncertainDetection {
                detection: d.clone(),
                alternatives,
            }
        })
        .collect()
}
