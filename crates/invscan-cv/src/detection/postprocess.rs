//! Detection post-processing: suppression, aggregation and OCR fusion

use super::result::{DetectionMethod, DetectionResult};
use crate::bbox::Roi;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const DEFAULT_NMS_IOU: f64 = 0.3;

/// Confidence added when OCR and template matching agree on an entity.
const HYBRID_BOOST: f64 = 0.1;

/// Intersection over union of two boxes
pub fn calculate_iou(a: &Roi, b: &Roi) -> f64 {
    a.iou(b)
}

/// Greedy non-maximum suppression.
///
/// Results come back sorted by confidence, highest first; ties keep their
/// input order. Detections without a position are never suppressed.
pub fn non_max_suppression(detections: &[DetectionResult], iou_threshold: f64) -> Vec<DetectionResult> {
    let mut sorted: Vec<&DetectionResult> = detections.iter().collect();
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DetectionResult> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        let suppressed = candidate.position.as_ref().is_some_and(|pos| {
            kept.iter()
                .filter_map(|k| k.position.as_ref())
                .any(|k| calculate_iou(k, pos) > iou_threshold)
        });
        if !suppressed {
            kept.push(candidate.clone());
        }
    }

    kept
}

/// Collapse results that name the same entity.
///
/// Groups keep first-seen order. Each group becomes the copy of its most
/// confident member, with `count` summed over the group.
pub fn aggregate_duplicates(detections: &[DetectionResult]) -> Vec<DetectionResult> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, (usize, u32)> = HashMap::new();

    for (index, detection) in detections.iter().enumerate() {
        let id = detection.id();
        match groups.get_mut(id) {
            Some((best, count)) => {
                *count += detection.occurrences();
                if detection.confidence > detections[*best].confidence {
                    *best = index;
                }
            }
            None => {
                order.push(id);
                groups.insert(id, (index, detection.occurrences()));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| groups.get(id))
        .map(|&(best, count)| {
            let mut merged = detections[best].clone();
            merged.count = Some(count);
            merged
        })
        .collect()
}

/// Union of OCR and template results by entity id.
///
/// An entity seen by both becomes `Hybrid` with a boosted confidence, the
/// template match's position and the OCR text. Output is sorted by
/// confidence, highest first.
///
/// Within each list the first result for an id wins and later repeats are
/// dropped. A result in `ocr` whose method is not `Ocr` is kept as given and
/// never fused, so a template result for the same id is dropped.
pub fn combine_detections(ocr: &[DetectionResult], cv: &[DetectionResult]) -> Vec<DetectionResult> {
    let mut combined: Vec<DetectionResult> = Vec::with_capacity(ocr.len() + cv.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for detection in ocr {
        if index.contains_key(detection.id()) {
            debug!(id = detection.id(), "Dropping repeated OCR result");
            continue;
        }
        index.insert(detection.id().to_string(), combined.len());
        combined.push(detection.clone());
    }

    let mut seen_cv: HashSet<&str> = HashSet::new();

    for detection in cv {
        if !seen_cv.insert(detection.id()) {
            debug!(id = detection.id(), "Dropping repeated template result");
            continue;
        }
        match index.get(detection.id()) {
            Some(&i) => {
                let from_ocr = &combined[i];
                if from_ocr.method != DetectionMethod::Ocr {
                    debug!(
                        id = detection.id(),
                        method = ?from_ocr.method,
                        "OCR list entry is not an OCR result; template result dropped"
                    );
                } else {
                    let confidence =
                        (from_ocr.confidence.max(detection.confidence) + HYBRID_BOOST).min(1.0);
                    let mut hybrid = DetectionResult {
                        entity: detection.entity.clone(),
                        confidence,
                        method: DetectionMethod::Hybrid,
                        position: detection.position.clone(),
                        count: detection.count.or(from_ocr.count),
                        raw_text: from_ocr.raw_text.clone(),
                    };
                    if hybrid.position.is_none() {
                        hybrid.position = from_ocr.position.clone();
                    }
                    combined[i] = hybrid;
                }
            }
            None => {
                index.insert(detection.id().to_string(), combined.len());
                combined.push(detection.clone());
            }
        }
    }

    combined.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use invscan_core::{Entity, Rarity};

    fn detection(id: &str, confidence: f64, roi: Option<Roi>) -> DetectionResult {
        let result = DetectionResult::new(
            Entity::new(id, id, Rarity::Common),
            confidence,
            DetectionMethod::TemplateMatch,
        );
        match roi {
            Some(roi) => result.with_position(roi),
            None => result,
        }
    }

    #[test]
    fn test_iou_examples() {
        let a = Roi::new(0, 0, 100, 100);
        let b = Roi::new(50, 50, 100, 100);
        assert!((calculate_iou(&a, &b) - 2500.0 / 17500.0).abs() < 1e-4);
        assert_eq!(calculate_iou(&Roi::new(0, 0, 10, 10), &Roi::new(0, 0, 20, 20)), 0.25);
        assert_eq!(calculate_iou(&a, &a), 1.0);
        assert_eq!(calculate_iou(&a, &Roi::new(200, 200, 10, 10)), 0.0);
        assert_eq!(calculate_iou(&Roi::new(0, 0, 0, 10), &a), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let detections = vec![
            detection("a", 0.7, Some(Roi::new(2, 2, 50, 50))),
            detection("b", 0.9, Some(Roi::new(0, 0, 50, 50))),
            detection("c", 0.8, Some(Roi::new(5, 0, 50, 50))),
        ];
        let kept = non_max_suppression(&detections, DEFAULT_NMS_IOU);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id(), "b");
    }

    #[test]
    fn test_nms_properties() {
        let detections = vec![
            detection("a", 0.6, Some(Roi::new(0, 0, 40, 40))),
            detection("text", 0.5, None),
            detection("b", 0.95, Some(Roi::new(10, 10, 40, 40))),
            detection("c", 0.7, Some(Roi::new(100, 0, 40, 40))),
            detection("d", 0.7, Some(Roi::new(200, 0, 40, 40))),
        ];
        let kept = non_max_suppression(&detections, DEFAULT_NMS_IOU);

        assert!(kept.len() <= detections.len());
        assert!(kept.iter().any(|d| d.id() == "text"));
        assert!(kept.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        let ids: Vec<&str> = kept.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["b", "c", "d", "text"]);
        assert_eq!(non_max_suppression(&kept, DEFAULT_NMS_IOU), kept);
    }

    #[test]
    fn test_nms_keeps_full_grid() {
        let detections: Vec<_> = (0..25)
            .map(|i| {
                let roi = Roi::new((i % 5) * 60, (i / 5) * 60, 50, 50);
                detection(&format!("item_{i}"), 0.5 + i as f64 / 100.0, Some(roi))
            })
            .collect();
        assert_eq!(non_max_suppression(&detections, DEFAULT_NMS_IOU).len(), 25);
    }

    #[test]
    fn test_aggregate_duplicates() {
        let detections = vec![
            detection("sword", 0.6, Some(Roi::new(0, 0, 10, 10))),
            detection("shield", 0.8, None),
            detection("sword", 0.9, Some(Roi::new(20, 0, 10, 10))),
            detection("sword", 0.7, None).with_count(2),
        ];
        let aggregated = aggregate_duplicates(&detections);

        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated[0].id(), "sword");
        assert_eq!(aggregated[0].count, Some(4));
        assert_eq!(aggregated[0].confidence, 0.9);
        assert_eq!(aggregated[0].position, Some(Roi::new(20, 0, 10, 10)));
        assert_eq!(aggregated[1].id(), "shield");
        assert_eq!(aggregated[1].count, Some(1));
    }

    #[test]
    fn test_combine_detections() {
        let ocr = vec![
            DetectionResult::new(Entity::new("sword", "Sword", Rarity::Rare), 0.6, DetectionMethod::Ocr)
                .with_raw_text("Sword"),
            DetectionResult::new(Entity::new("ring", "Ring", Rarity::Epic), 0.5, DetectionMethod::Ocr),
        ];
        let cv = vec![
            detection("sword", 0.75, Some(Roi::new(5, 5, 40, 40))),
            detection("boots", 0.65, Some(Roi::new(50, 5, 40, 40))),
        ];

        let combined = combine_detections(&ocr, &cv);
        assert_eq!(combined.len(), 3);

        let sword = &combined[0];
        assert_eq!(sword.id(), "sword");
        assert_eq!(sword.method, DetectionMethod::Hybrid);
        assert!((sword.confidence - 0.85).abs() < 1e-9);
        assert_eq!(sword.position, Some(Roi::new(5, 5, 40, 40)));
        assert_eq!(sword.raw_text.as_deref(), Some("Sword"));

        assert_eq!(combined[1].id(), "boots");
        assert_eq!(combined[1].method, DetectionMethod::TemplateMatch);
        assert_eq!(combined[2].id(), "ring");
        assert_eq!(combined[2].method, DetectionMethod::Ocr);
    }

    #[test]
    fn test_combine_caps_at_one() {
        let ocr = vec![DetectionResult::new(
            Entity::new("x", "X", Rarity::Common),
            0.97,
            DetectionMethod::Ocr,
        )];
        let cv = vec![detection("x", 0.95, None)];
        assert_eq!(combine_detections(&ocr, &cv)[0].confidence, 1.0);
    }

    #[test]
    fn test_combine_first_result_per_id_wins() {
        let ocr = vec![detection("shield", 0.4, None)];
        let cv = vec![
            detection("shield", 0.9, Some(Roi::new(0, 0, 40, 40))),
            detection("boots", 0.7, Some(Roi::new(50, 0, 40, 40))),
            detection("boots", 0.8, Some(Roi::new(100, 0, 40, 40))),
        ];

        let combined = combine_detections(&ocr, &cv);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].id(), "boots");
        assert_eq!(combined[0].confidence, 0.7);
        assert_eq!(combined[0].position, Some(Roi::new(50, 0, 40, 40)));

        // Not an OCR result, so it is never fused.
        assert_eq!(combined[1].id(), "shield");
        assert_eq!(combined[1].method, DetectionMethod::TemplateMatch);
        assert_eq!(combined[1].confidence, 0.4);
    }
}
