//! High-level detection module

pub mod config;
pub mod detector;
pub mod postprocess;
pub mod result;
pub mod uncertainty;

pub use config::{DetectionConfig, DetectionConfigSnapshot, GridConfig, MatchingConfig};
pub use detector::{DetectionOutput, DetectionStats, InventoryDetector};
pub use postprocess::{aggregate_duplicates, calculate_iou, combine_detections, non_max_suppression};
pub use result::{DetectionMethod, DetectionResult};
pub use uncertainty::{Alternative, UncertainDetection, UncertaintyConfig, get_uncertain_detections_from_results};
