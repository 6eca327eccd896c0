//! Inventory parser using invscan-cv

use invscan_core::Catalog;
use invscan_cv::{
    detection::{DetectionConfig, DetectionOutput, InventoryDetector},
    Result, TemplateLibrary,
};
use std::path::Path;
use tracing::{info, warn};

/// Detect the inventory, trying stricter and looser presets until enough
/// slots are identified. Falls back to the run with the most detections.
pub fn detect_inventory(
    input_image_path: &Path,
    catalog: &Catalog,
    base: DetectionConfig,
    library: &TemplateLibrary,
    min_detections: usize,
) -> Result<DetectionOutput> {
    let configs_to_try = vec![
        ("configured", base.clone()),
        ("precision", with_paths(DetectionConfig::for_precision(), &base)),
        ("recall", with_paths(DetectionConfig::for_recall(), &base)),
    ];

    let mut best: Option<DetectionOutput> = None;
    for (name, cfg) in configs_to_try {
        info!(config = name, "Trying configuration");
        let scoring = cfg.scoring_config();
        let detector = InventoryDetector::new(cfg, catalog.clone()).with_library(library.clone());
        let output = detector.detect_from_file(input_image_path, &scoring)?;

        if output.detections.len() >= min_detections {
            return Ok(output);
        }
        info!(
            config = name,
            detections = output.detections.len(),
            "Too few detections, trying next configuration"
        );

        if best
            .as_ref()
            .is_none_or(|b| output.detections.len() > b.detections.len())
        {
            best = Some(output);
        }
    }

    warn!("Using best available detection");
    match best {
        Some(output) => Ok(output),
        None => anyhow::bail!("No configuration produced a result"),
    }
}

/// Load templates once so every preset run shares them.
pub async fn load_library(config: &DetectionConfig, catalog: &Catalog) -> TemplateLibrary {
    let mut detector = InventoryDetector::new(config.clone(), catalog.clone());
    if detector.load_templates_async().await == 0 {
        warn!(dirs = ?config.template_dirs, "No templates found; nothing can be identified");
    }
    detector.library().clone()
}

/// Presets only change matching behaviour; keep the caller's paths.
fn with_paths(mut preset: DetectionConfig, base: &DetectionConfig) -> DetectionConfig {
    preset.template_dirs = base.template_dirs.clone();
    preset.template_base_path = base.template_base_path.clone();
    preset.catalog_file = base.catalog_file.clone();
    preset.palette = base.palette.clone();
    preset
}

/// Write the full run as pretty JSON.
pub fn write_output(
    output: &DetectionOutput,
    config: DetectionConfig,
    catalog: &Catalog,
    path: &Path,
) -> Result<()> {
    InventoryDetector::new(config, catalog.clone()).export_json(output, path)
}

/// Print a short human summary of one run
pub fn print_summary(output: &DetectionOutput) {
    println!("Detection completed:");
    println!("  - Tier: {}", output.config.resolution_tier);
    println!("  - Screen: {:?}", output.screen_type);
    println!("  - Slots scanned: {}", output.stats.cells_scanned);
    println!("  - Items: {}", output.detections.len());
    for detection in &output.detections {
        println!(
            "      {:<24} {:.3} ({:?})",
            detection.entity.name, detection.confidence, detection.method
        );
    }
    if !output.uncertain.is_empty() {
        println!("  - Needs confirmation: {}", output.uncertain.len());
        for flagged in &output.uncertain {
            let alternatives: Vec<&str> = flagged
                .alternatives
                .iter()
                .map(|a| a.entity.name.as_str())
                .collect();
            println!(
                "      {} ({:.3}) or: {}",
                flagged.detection.entity.name,
                flagged.detection.confidence,
                alternatives.join(", ")
            );
        }
    }
    println!("  - Avg confidence: {:.3}", output.stats.avg_confidence);
    println!("  - Time: {}ms", output.stats.processing_time_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use invscan_cv::ScoringConfig;

    #[test]
    fn test_write_output_round_trips_through_json() {
        let config = DetectionConfig::default();
        let detector = InventoryDetector::new(config.clone(), Catalog::new());
        let frame = RgbaImage::from_pixel(1280, 720, Rgba([20, 20, 24, 255]));
        let output = detector.detect(&frame, &ScoringConfig::default());

        let path = std::env::temp_dir().join(format!("invscan_out_{}.json", std::process::id()));
        write_output(&output, config, &Catalog::new(), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["detections"], serde_json::json!([]));
        assert_eq!(written["config"]["resolution_tier"], "low");
        let _ = std::fs::remove_file(&path);
    }
}
