//! Inventory detector: the full screenshot-to-items pipeline

use super::config::{DetectionConfig, DetectionConfigSnapshot};
use super::postprocess::non_max_suppression;
use super::result::{DetectionMethod, DetectionResult};
use super::uncertainty::{UncertainDetection, get_uncertain_detections_from_results};
use crate::bbox::Roi;
use crate::error::ScanError;
use crate::grid::{
    GridModel, IconScale, detect_grid_positions, detect_icon_scale, grid_positions_for_scale, verify_grid_pattern,
};
use crate::metrics::{MetricsRecorder, MetricsSnapshot, RunRecord};
use crate::region::{BandRegion, ScreenType, detect_hotbar_region, detect_screen_type};
use crate::resolution::{ResolutionProfile, get_profile_for_resolution};
use crate::scoring::{ScoringConfig, SharedScoringConfig};
use crate::template::{
    DEFAULT_TEMPLATE_SET, EnsembleMatcher, Strategy, StrategyRegistry, TemplateLibrary, TemplateLoader,
    select_strategies_for_image,
};
use crate::utils::ImageUtils;
use crate::Result;
use anyhow::Context;
use image::RgbaImage;
use invscan_core::Catalog;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Detection statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    pub cells_scanned: usize,
    pub total_detections: usize,
    /// Dropped by non-maximum suppression.
    pub suppressed: usize,
    /// Dropped by grid verification.
    pub off_grid: usize,
    pub avg_confidence: f64,
    pub grid_confidence: f64,
    pub processing_time_ms: u64,
}

/// Everything one run found, plus the settings it ran with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionOutput {
    pub detections: Vec<DetectionResult>,
    pub uncertain: Vec<UncertainDetection>,
    pub config: DetectionConfigSnapshot,
    pub screen_type: ScreenType,
    pub hotbar: Option<BandRegion>,
    pub icon_scale: Option<IconScale>,
    pub grid: Option<GridModel>,
    pub stats: DetectionStats,
}

impl DetectionOutput {
    fn empty(config: DetectionConfigSnapshot) -> Self {
        Self {
            detections: Vec::new(),
            uncertain: Vec::new(),
            config,
            screen_type: ScreenType::Unknown,
            hotbar: None,
            icon_scale: None,
            grid: None,
            stats: DetectionStats::default(),
        }
    }
}

/// Main inventory detector
pub struct InventoryDetector {
    config: DetectionConfig,
    catalog: Catalog,
    library: TemplateLibrary,
    registry: StrategyRegistry,
    metrics: MetricsRecorder,
}

impl InventoryDetector {
    /// Create a detector with no templates loaded yet
    pub fn new(config: DetectionConfig, catalog: Catalog) -> Self {
        let metrics = MetricsRecorder::new(config.metrics_enabled);
        Self {
            config,
            catalog,
            library: TemplateLibrary::new(),
            registry: StrategyRegistry::default(),
            metrics,
        }
    }

    pub fn with_library(mut self, library: TemplateLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn template_loader(&self) -> TemplateLoader {
        let mut loader = self
            .config
            .template_dirs
            .iter()
            .fold(TemplateLoader::new(), |loader, dir| loader.add_template_dir(dir));
        if let Some(base) = &self.config.template_base_path {
            loader.set_base_path(base);
        }
        loader
    }

    /// Load the default template set for every catalog entity. Returns the
    /// number of templates found.
    pub fn load_templates(&mut self) -> usize {
        let set = self
            .template_loader()
            .load_template_set(DEFAULT_TEMPLATE_SET, self.catalog.entities());
        let count = set.len();
        self.library.insert(set);
        info!(templates = count, "Templates loaded");
        count
    }

    /// Same as [`load_templates`](Self::load_templates), on a blocking task
    /// bounded by `template_timeout_ms`. A late load leaves the library as it was.
    pub async fn load_templates_async(&mut self) -> usize {
        let timeout = Duration::from_millis(self.config.template_timeout_ms);
        let fetch = self
            .template_loader()
            .fetch(DEFAULT_TEMPLATE_SET, self.catalog.entities().to_vec(), timeout);
        let loaded = self.library.load_sets(vec![fetch]).await;
        let count = self.library.template_count();
        info!(sets = loaded, templates = count, "Templates loaded");
        count
    }

    /// Run the whole pipeline on one frame.
    pub fn detect(&self, frame: &RgbaImage, scoring: &ScoringConfig) -> DetectionOutput {
        let start_time = Instant::now();
        let (width, height) = frame.dimensions();
        let profile = get_profile_for_resolution(width, height);
        let strategies = select_strategies_for_image(frame, profile.tier, &self.registry);

        let mut snapshot = DetectionConfigSnapshot {
            dynamic_threshold: profile.min_confidence,
            resolution_tier: profile.tier,
            selected_strategies: strategies.iter().map(|s| s.kind).collect(),
            scoring_config: scoring.clone(),
        };

        if width == 0 || height == 0 {
            debug!("Empty frame, nothing to detect");
            return DetectionOutput::empty(snapshot);
        }

        let screen_type = detect_screen_type(frame);
        let band = detect_hotbar_region(frame, &self.config.palette);
        let icon_scale = detect_icon_scale(frame, width, height, &band, &self.config.palette);

        let cells = if band.is_fallback() && icon_scale.origin_x.is_none() {
            detect_grid_positions(width, height)
        } else {
            grid_positions_for_scale(width, &band, &icon_scale)
        };

        let matching = &self.config.matching;
        snapshot.dynamic_threshold = matching.dynamic_threshold(&profile, &band);
        let matcher = EnsembleMatcher::new(snapshot.dynamic_threshold)
            .with_early_exit(matching.early_exit_threshold)
            .with_empty_slot_std(matching.empty_slot_std);

        let raw = self.match_cells(frame, &cells, &matcher, &strategies, scoring, &profile);
        let raw_count = raw.len();

        let kept = non_max_suppression(&raw, self.config.nms_iou_threshold);
        let suppressed = raw_count - kept.len();

        let (detections, grid, grid_confidence) = if self.config.grid.verify {
            let verification = verify_grid_pattern(&kept, icon_scale.icon_size);
            if verification.is_valid {
                (verification.filtered, verification.grid, verification.confidence)
            } else {
                debug!(confidence = verification.confidence, "Grid pattern not confirmed, keeping all");
                (kept, None, verification.confidence)
            }
        } else {
            (kept, None, 1.0)
        };
        let off_grid = raw_count - suppressed - detections.len();

        let uncertain = get_uncertain_detections_from_results(&detections, &self.catalog, &self.config.uncertainty);

        let avg_confidence = if detections.is_empty() {
            0.0
        } else {
            detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
        };
        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        self.metrics.record(RunRecord {
            timestamp_ms: RunRecord::now_ms(),
            width,
            height,
            resolution_tier: profile.tier,
            strategies: snapshot.selected_strategies.clone(),
            cells_scanned: cells.len(),
            detections: detections.len(),
            uncertain: uncertain.len(),
            avg_confidence,
            duration_ms: processing_time_ms,
        });

        info!(
            tier = %profile.tier,
            ?screen_type,
            cells = cells.len(),
            detections = detections.len(),
            uncertain = uncertain.len(),
            ms = processing_time_ms,
            "Detection finished"
        );

        DetectionOutput {
            stats: DetectionStats {
                cells_scanned: cells.len(),
                total_detections: detections.len(),
                suppressed,
                off_grid,
                avg_confidence,
                grid_confidence,
                processing_time_ms,
            },
            detections,
            uncertain,
            config: snapshot,
            screen_type,
            hotbar: Some(band),
            icon_scale: Some(icon_scale),
            grid,
        }
    }

    /// Run against the shared config's current value. The snapshot is taken
    /// once, so a concurrent `set_scoring_config` only affects later runs.
    pub fn detect_shared(&self, frame: &RgbaImage, shared: &SharedScoringConfig) -> DetectionOutput {
        let scoring = shared.get_scoring_config();
        self.detect(frame, &scoring)
    }

    fn match_cells(
        &self,
        frame: &RgbaImage,
        cells: &[Roi],
        matcher: &EnsembleMatcher,
        strategies: &[Strategy],
        scoring: &ScoringConfig,
        profile: &ResolutionProfile,
    ) -> Vec<DetectionResult> {
        let match_cell = |cell: &Roi| -> Option<DetectionResult> {
            let patch = ImageUtils::crop(frame, cell)?;
            let found = matcher.run_ensemble_detection(&patch, &self.library, strategies, scoring, profile)?;
            Some(
                DetectionResult::new(found.entity, found.confidence, DetectionMethod::TemplateMatch)
                    .with_position(cell.clone()),
            )
        };

        #[cfg(feature = "parallel")]
        let detections: Vec<DetectionResult> = {
            use rayon::prelude::*;
            cells.par_iter().filter_map(match_cell).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let detections: Vec<DetectionResult> = cells.iter().filter_map(match_cell).collect();

        detections
    }

    /// Detect from a raw RGBA buffer
    pub fn detect_from_rgba(
        &self,
        bytes: &[u8],
        width: u32,
        height: u32,
        scoring: &ScoringConfig,
    ) -> std::result::Result<DetectionOutput, ScanError> {
        let frame = ImageUtils::from_rgba(bytes, width, height)?;
        Ok(self.detect(&frame, scoring))
    }

    /// Detect from an image file
    pub fn detect_from_file<P: AsRef<Path>>(&self, image_path: P, scoring: &ScoringConfig) -> Result<DetectionOutput> {
        let frame = ImageUtils::load_rgba(&image_path)
            .with_context(|| format!("Failed to load image: {:?}", image_path.as_ref()))?;
        Ok(self.detect(&frame, scoring))
    }

    /// Detect from a `data:image/...;base64,` URL, decoded off the async runtime.
    pub async fn detect_from_data_url(
        &self,
        url: &str,
        timeout: Duration,
        scoring: &ScoringConfig,
    ) -> std::result::Result<DetectionOutput, ScanError> {
        let frame = crate::template::load_image(crate::template::ImageSource::DataUrl(url.to_string()), timeout).await?;
        Ok(self.detect(&frame, scoring))
    }

    /// Export detection results in JSON format
    pub fn export_json(&self, output: &DetectionOutput, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(output).context("Failed to serialize detection results")?;

        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write JSON to: {:?}", output_path))?;

        Ok(())
    }
}
