//! Grid inference
//!
//! Estimates icon size from border columns, lays out candidate cells, and
//! checks that detections line up on a regular grid.

use crate::bbox::Roi;
use crate::detection::DetectionResult;
use crate::palette::RarityPalette;
use crate::region::BandRegion;
use crate::resolution::get_profile_for_resolution;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_ICON_SIZE: u32 = 25;
const MAX_ICON_SIZE: u32 = 100;
const EDGE_COLUMN_FRACTION: f64 = 0.4;
const PITCH_TOLERANCE: f64 = 2.0;
const MIN_PITCH_CONSISTENCY: f64 = 0.5;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const MAX_FALLBACK_SLOTS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    EdgeAnalysis,
    ResolutionFallback,
}

/// Icon size estimate for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconScale {
    pub icon_size: u32,
    /// Distance between the left edges of neighbouring slots.
    pub pitch: u32,
    pub confidence: f64,
    pub method: ScaleMethod,
    /// Left edge of the first bordered slot, when borders were found.
    pub origin_x: Option<u32>,
    pub slot_count: Option<u32>,
}

/// Start x of every rarity-border column run inside `band`.
///
/// A column counts when at least 40% of its band pixels are border colour.
/// Runs wider than a border are solid fills and are dropped.
pub fn detect_icon_edges(
    img: &RgbaImage,
    width: u32,
    band: &BandRegion,
    palette: &RarityPalette,
) -> Vec<u32> {
    let width = width.min(img.width());
    let top = band.top_y.min(img.height());
    let bottom = band.bottom_y.min(img.height());
    let band_height = bottom.saturating_sub(top);
    if width == 0 || band_height == 0 {
        return Vec::new();
    }

    let max_border = (band_height / 12).max(3);
    let is_edge_column = |x: u32| {
        let hits = (top..bottom)
            .filter(|&y| palette.is_border(img.get_pixel(x, y)))
            .count();
        hits as f64 / band_height as f64 >= EDGE_COLUMN_FRACTION
    };

    let mut edges = Vec::new();
    let mut run_start: Option<u32> = None;
    for x in 0..=width {
        let hit = x < width && is_edge_column(x);
        match (hit, run_start) {
            (true, None) => run_start = Some(x),
            (false, Some(start)) => {
                if x - start <= max_border {
                    edges.push(start);
                }
                run_start = None;
            }
            _ => {}
        }
    }

    edges
}

/// Estimate icon size from border spacing, falling back to the
/// resolution profile when borders are missing or irregular.
pub fn detect_icon_scale(
    img: &RgbaImage,
    width: u32,
    height: u32,
    band: &BandRegion,
    palette: &RarityPalette,
) -> IconScale {
    let profile = get_profile_for_resolution(width, height);
    let fallback = || {
        let icon_size = profile.icon_size.typical.clamp(MIN_ICON_SIZE, MAX_ICON_SIZE);
        IconScale {
            icon_size,
            pitch: icon_size + profile.spacing,
            confidence: FALLBACK_CONFIDENCE,
            method: ScaleMethod::ResolutionFallback,
            origin_x: None,
            slot_count: None,
        }
    };

    let min_gap = profile.icon_size.min / 2;
    let mut merged: Vec<u32> = Vec::new();
    for edge in detect_icon_edges(img, width, band, palette) {
        match merged.last() {
            Some(&last) if edge - last < min_gap => {}
            _ => merged.push(edge),
        }
    }

    if merged.len() < 2 {
        debug!(edges = merged.len(), "Too few icon edges, using resolution fallback");
        return fallback();
    }

    let gaps: Vec<f64> = merged.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let Some((pitch, support)) = modal_value(&gaps, |_| PITCH_TOLERANCE) else {
        return fallback();
    };
    let consistency = support as f64 / gaps.len() as f64;
    if consistency < MIN_PITCH_CONSISTENCY {
        debug!(consistency, "Irregular icon edges, using resolution fallback");
        return fallback();
    }

    let pitch = pitch.round() as u32;
    let icon_size = pitch
        .saturating_sub(profile.spacing)
        .clamp(MIN_ICON_SIZE, MAX_ICON_SIZE);
    let first = merged[0];
    let last = merged[merged.len() - 1];
    let slot_count = (last - first) / pitch.max(1) + 1;

    debug!(icon_size, pitch, consistency, slot_count, "Icon scale from edges");
    IconScale {
        icon_size,
        pitch,
        confidence: consistency,
        method: ScaleMethod::EdgeAnalysis,
        origin_x: Some(first),
        slot_count: Some(slot_count),
    }
}

/// Most supported value, where `value` supports `candidate` if it lies
/// within `band(candidate)`. Returns the mean of the supporting values and
/// how many there were. Ties go to the earlier candidate.
fn modal_value(values: &[f64], band: impl Fn(f64) -> f64) -> Option<(f64, usize)> {
    let mut best: Option<(f64, usize)> = None;
    for &candidate in values {
        let tolerance = band(candidate);
        let support: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| (v - candidate).abs() <= tolerance)
            .collect();
        if best.is_none_or(|(_, count)| support.len() > count) {
            let mean = support.iter().sum::<f64>() / support.len() as f64;
            best = Some((mean, support.len()));
        }
    }
    best
}

/// Whether `value` sits within `tolerance` of some `origin + k * spacing`.
/// Boundary inclusive; a spacing of zero or less matches everything.
pub fn fits_grid(value: f64, origin: f64, spacing: f64, tolerance: f64) -> bool {
    if spacing <= 0.0 {
        return true;
    }
    let offset = (value - origin).rem_euclid(spacing);
    offset.min(spacing - offset) <= tolerance
}

/// Regular lattice that detections are expected to sit on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridModel {
    pub origin_x: f64,
    pub origin_y: f64,
    pub spacing_x: f64,
    pub spacing_y: f64,
    pub tolerance: f64,
}

impl GridModel {
    pub fn fits(&self, roi: &Roi) -> bool {
        fits_grid(roi.x as f64, self.origin_x, self.spacing_x, self.tolerance)
            && fits_grid(roi.y as f64, self.origin_y, self.spacing_y, self.tolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridVerification {
    pub is_valid: bool,
    pub confidence: f64,
    pub filtered: Vec<DetectionResult>,
    pub grid: Option<GridModel>,
}

/// Check that positioned detections form a grid and drop the stragglers.
///
/// Detections without a position are always kept. With fewer than three
/// positioned detections there is nothing to infer and everything passes.
pub fn verify_grid_pattern(detections: &[DetectionResult], icon_size: u32) -> GridVerification {
    let positioned: Vec<&Roi> = detections.iter().filter_map(|d| d.position.as_ref()).collect();
    if positioned.len() < 3 {
        return GridVerification {
            is_valid: true,
            confidence: 0.5,
            filtered: detections.to_vec(),
            grid: None,
        };
    }

    let xs: Vec<f64> = positioned.iter().map(|r| r.x as f64).collect();
    let ys: Vec<f64> = positioned.iter().map(|r| r.y as f64).collect();
    let spread = |v: &[f64]| {
        let max = v.iter().copied().fold(f64::MIN, f64::max);
        let min = v.iter().copied().fold(f64::MAX, f64::min);
        max - min
    };

    let icon = icon_size as f64;
    let horizontal = spread(&xs) >= spread(&ys);
    let spacing = axis_spacing(if horizontal { &xs } else { &ys }, icon);
    let (spacing_x, spacing_y) = if horizontal { (spacing, 0.0) } else { (0.0, spacing) };
    let tolerance = (0.2 * icon).max(2.0);

    let mut grid = GridModel { origin_x: 0.0, origin_y: 0.0, spacing_x, spacing_y, tolerance };
    let mut best_fits = 0;
    for roi in &positioned {
        let candidate = GridModel { origin_x: roi.x as f64, origin_y: roi.y as f64, ..grid };
        let fits = positioned.iter().filter(|r| candidate.fits(r)).count();
        if fits > best_fits {
            best_fits = fits;
            grid = candidate;
        }
    }

    let confidence = best_fits as f64 / positioned.len() as f64;
    let filtered: Vec<DetectionResult> = detections
        .iter()
        .filter(|d| d.position.as_ref().is_none_or(|p| grid.fits(p)))
        .cloned()
        .collect();

    debug!(
        spacing,
        horizontal,
        fitting = best_fits,
        total = positioned.len(),
        "Verified grid pattern"
    );

    GridVerification {
        is_valid: confidence >= 0.5,
        confidence,
        filtered,
        grid: Some(grid),
    }
}

/// Modal gap between sorted positions, ignoring gaps under half an icon.
/// Zero when no gap qualifies.
fn axis_spacing(values: &[f64], icon: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&g| g >= icon / 2.0)
        .collect();

    modal_value(&gaps, |g| (0.15 * g).max(2.0))
        .map(|(spacing, _)| spacing)
        .unwrap_or(0.0)
}

/// Default hotbar layout for a frame size, centred near the bottom.
pub fn detect_grid_positions(width: u32, height: u32) -> Vec<Roi> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let profile = get_profile_for_resolution(width, height);
    let icon = profile.icon_size.typical;
    let band = BandRegion {
        top_y: (height as f64 * 0.91 - icon as f64 / 2.0).max(0.0).round() as u32,
        bottom_y: (height as f64 * 0.91 + icon as f64 / 2.0).round() as u32,
        confidence: FALLBACK_CONFIDENCE,
    };
    grid_positions_in_band(width, &band, icon, profile.spacing)
}

/// A centred row of square cells inside `band`.
pub fn grid_positions_in_band(width: u32, band: &BandRegion, icon_size: u32, spacing: u32) -> Vec<Roi> {
    if width == 0 || icon_size == 0 {
        return Vec::new();
    }
    let pitch = icon_size + spacing;
    let usable = (width as f64 * 0.6) as u32;
    let count = ((usable + spacing) / pitch).clamp(1, MAX_FALLBACK_SLOTS);
    let row_width = count * pitch - spacing;
    let origin_x = width.saturating_sub(row_width) / 2;
    row_cells(origin_x, count, band, icon_size, pitch, width)
}

/// Cells for a frame, anchored on detected borders when there are any.
pub fn grid_positions_for_scale(width: u32, band: &BandRegion, scale: &IconScale) -> Vec<Roi> {
    match (scale.origin_x, scale.slot_count) {
        (Some(origin_x), Some(count)) => {
            row_cells(origin_x, count, band, scale.icon_size, scale.pitch.max(1), width)
        }
        _ => grid_positions_in_band(width, band, scale.icon_size, scale.pitch.saturating_sub(scale.icon_size)),
    }
}

fn row_cells(origin_x: u32, count: u32, band: &BandRegion, icon: u32, pitch: u32, width: u32) -> Vec<Roi> {
    let y = band.top_y as i64 + (band.height() as i64 - icon as i64) / 2;
    (0..count)
        .map(|i| origin_x + i * pitch)
        .take_while(|&x| x + icon <= width)
        .enumerate()
        .map(|(i, x)| Roi::new(x as i32, y.max(0) as i32, icon, icon).with_label(format!("slot_{i}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionMethod;
    use crate::testutil;
    use invscan_core::{Entity, Rarity};

    fn at(id: &str, x: i32, y: i32) -> DetectionResult {
        DetectionResult::new(Entity::new(id, id, Rarity::Common), 0.8, DetectionMethod::TemplateMatch)
            .with_position(Roi::new(x, y, 50, 50))
    }

    #[test]
    fn test_fits_grid_examples() {
        assert!(fits_grid(53.0, 0.0, 50.0, 5.0));
        assert!(!fits_grid(56.0, 0.0, 50.0, 5.0));
        assert!(fits_grid(55.0, 0.0, 50.0, 5.0));
        assert!(fits_grid(-47.0, 0.0, 50.0, 5.0));
        assert!(fits_grid(1234.0, 0.0, 0.0, 0.0));
        assert!(fits_grid(7.0, 3.0, -10.0, 0.0));
    }

    #[test]
    fn test_verify_small_sets_pass() {
        let detections = vec![at("a", 0, 0), at("b", 77, 0)];
        let result = verify_grid_pattern(&detections, 50);
        assert!(result.is_valid);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.filtered.len(), 2);
        assert!(result.grid.is_none());
    }

    #[test]
    fn test_verify_drops_off_grid_detection() {
        let mut detections: Vec<_> = (0..5).map(|i| at("slot", i * 60, 100)).collect();
        detections.push(at("stray", 150, 100));
        detections.push(DetectionResult::new(
            Entity::new("ocr", "Ocr", Rarity::Rare),
            0.7,
            DetectionMethod::Ocr,
        ));

        let result = verify_grid_pattern(&detections, 50);
        assert!(result.is_valid);
        assert!((result.confidence - 5.0 / 6.0).abs() < 1e-9);
        assert_eq!(result.filtered.len(), 6);
        assert!(result.filtered.iter().all(|d| d.id() != "stray"));
        assert!(result.filtered.iter().any(|d| d.id() == "ocr"));
        let grid = result.grid.unwrap();
        assert!((grid.spacing_x - 60.0).abs() < 1e-9);
        assert_eq!(grid.spacing_y, 0.0);
    }

    #[test]
    fn test_verify_full_inventory_grid() {
        let detections: Vec<_> = (0..25)
            .map(|i| at(&format!("item_{i}"), (i % 5) * 60, (i / 5) * 60))
            .collect();
        let result = verify_grid_pattern(&detections, 50);
        assert!(result.is_valid);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.filtered.len(), 25);
    }

    #[test]
    fn test_icon_edges_and_scale_from_borders() {
        let (frame, slots) = testutil::hotbar_frame(1280, 720, 40, 4, 400, 640, &[0, 1, 2, 3, 4, 5]);
        let band = BandRegion { top_y: 640, bottom_y: 680, confidence: 1.0 };
        let palette = RarityPalette::default();

        let edges = detect_icon_edges(&frame, 1280, &band, &palette);
        assert_eq!(edges.len(), 12);
        assert_eq!(edges[0], 400);
        assert_eq!(edges[1], 438);

        let scale = detect_icon_scale(&frame, 1280, 720, &band, &palette);
        assert_eq!(scale.method, ScaleMethod::EdgeAnalysis);
        assert_eq!(scale.pitch, 44);
        assert_eq!(scale.icon_size, 40);
        assert_eq!(scale.origin_x, Some(400));
        assert_eq!(scale.slot_count, Some(6));

        let cells = grid_positions_for_scale(1280, &band, &scale);
        assert_eq!(cells.len(), 6);
        for (cell, slot) in cells.iter().zip(&slots) {
            assert_eq!((cell.x, cell.y, cell.width), (slot.x, slot.y, slot.width));
        }
    }

    #[test]
    fn test_icon_scale_fallback() {
        let frame = RgbaImage::from_pixel(1920, 1080, testutil::BACKGROUND);
        let band = BandRegion { top_y: 900, bottom_y: 1000, confidence: 0.15 };
        let scale = detect_icon_scale(&frame, 1920, 1080, &band, &RarityPalette::default());
        assert_eq!(scale.method, ScaleMethod::ResolutionFallback);
        assert_eq!(scale.icon_size, 56);
        assert_eq!(scale.confidence, 0.3);
        assert!(scale.origin_x.is_none());
    }

    #[test]
    fn test_default_grid_positions() {
        let cells = detect_grid_positions(1920, 1080);
        assert!(!cells.is_empty());
        assert_eq!(cells, detect_grid_positions(1920, 1080));
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.width, cell.height);
            assert_eq!(cell.label.as_deref(), Some(format!("slot_{i}").as_str()));
            assert!(cell.bottom() <= 1080 && cell.y as u32 > 1080 / 2);
        }
        for pair in cells.windows(2) {
            assert!(pair[0].iou(&pair[1]) == 0.0);
        }
        assert!(detect_grid_positions(0, 0).is_empty());
    }
}
