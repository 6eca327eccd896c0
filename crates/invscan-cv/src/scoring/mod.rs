//! Similarity metrics and the configuration that turns them into a score

pub mod config;
pub mod similarity;

pub use config::{
    merge_with_defaults, AgreementConfig, MetricWeights, RarityThresholds, ScoringConfig,
    ScoringOverrides, ScoringPreset, SharedScoringConfig,
};
pub use similarity::{
    calculate_edge_similarity, calculate_histogram_similarity, calculate_ncc, calculate_ssim,
    calculate_windowed_ssim, compare_patches, compare_patches_with, MetricScores,
};
