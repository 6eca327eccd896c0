//! Screen region locator
//!
//! Works out what kind of screen a frame shows and where the hotbar sits.
//! All of it is brightness statistics and palette hits over the lower part
//! of the frame; nothing here knows about templates.

use crate::bbox::Roi;
use crate::palette::RarityPalette;
use crate::utils::{ImageUtils, mean_std};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PAUSE_MAX_BRIGHTNESS: f64 = 45.0;
const PAUSE_MAX_VARIANCE: f64 = 250.0;
const GAMEPLAY_MIN_BRIGHTNESS: f64 = 55.0;
const GAMEPLAY_MIN_VARIANCE: f64 = 400.0;

/// Share of the frame height, from the bottom, scanned for the hotbar.
const HOTBAR_SCAN_FRACTION: f64 = 0.35;
const FALLBACK_BAND: (f64, f64) = (0.85, 0.97);
const FALLBACK_CONFIDENCE: f64 = 0.15;
const MIN_BAND_CONFIDENCE: f64 = 0.3;
const RUNS_FOR_FULL_CONFIDENCE: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenType {
    PauseMenu,
    Gameplay,
    Unknown,
}

/// Horizontal band of the frame, `top_y` inclusive and `bottom_y` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRegion {
    pub top_y: u32,
    pub bottom_y: u32,
    pub confidence: f64,
}

impl BandRegion {
    pub fn height(&self) -> u32 {
        self.bottom_y.saturating_sub(self.top_y)
    }

    /// True when the band came from the positional fallback.
    pub fn is_fallback(&self) -> bool {
        self.confidence < MIN_BAND_CONFIDENCE
    }

    pub fn to_roi(&self, width: u32, label: &str) -> Roi {
        Roi::new(0, self.top_y as i32, width, self.height()).with_label(label)
    }

    fn fallback(height: u32) -> Self {
        let h = height as f64;
        Self {
            top_y: (h * FALLBACK_BAND.0).round() as u32,
            bottom_y: (h * FALLBACK_BAND.1).round() as u32,
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

/// Sample the bottom 20% of the frame and classify it.
///
/// Transparent pixels count as black, so an empty overlay reads as a menu.
pub fn detect_screen_type(img: &RgbaImage) -> ScreenType {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return ScreenType::Unknown;
    }

    let band = (height / 5).max(1);
    let top = height - band;
    let step_x = (width / 160).max(1) as usize;
    let step_y = (band / 24).max(1) as usize;

    let samples = (top..height)
        .step_by(step_y)
        .flat_map(|y| (0..width).step_by(step_x).map(move |x| (x, y)))
        .map(|(x, y)| ImageUtils::brightness(img.get_pixel(x, y)));
    let (mean, std) = mean_std(samples);
    let variance = std * std;

    let screen = if mean < PAUSE_MAX_BRIGHTNESS && variance < PAUSE_MAX_VARIANCE {
        ScreenType::PauseMenu
    } else if mean > GAMEPLAY_MIN_BRIGHTNESS && variance > GAMEPLAY_MIN_VARIANCE {
        ScreenType::Gameplay
    } else {
        ScreenType::Unknown
    };

    debug!(mean, variance, screen = ?screen, "Classified screen");
    screen
}

/// Locate the hotbar band from rarity-coloured slot borders.
pub fn detect_hotbar_region(img: &RgbaImage, palette: &RarityPalette) -> BandRegion {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return BandRegion::fallback(height);
    }

    let scan_top = height - ((height as f64 * HOTBAR_SCAN_FRACTION).round() as u32).min(height);
    let scan_height = (height - scan_top) as usize;
    let min_run = ((height as f64 * 0.015).round() as u32).max(3);
    let max_run = ((height as f64 * 0.15).round() as u32).max(min_run);

    let mut runs: Vec<(u32, u32)> = Vec::new();
    for x in 0..width {
        let mut start: Option<u32> = None;
        for y in scan_top..=height {
            let hit = y < height && palette.is_border(img.get_pixel(x, y));
            match (hit, start) {
                (true, None) => start = Some(y),
                (false, Some(s)) => {
                    let len = y - s;
                    if len >= min_run && len <= max_run {
                        runs.push((s, y));
                    }
                    start = None;
                }
                _ => {}
            }
        }
    }

    if runs.is_empty() {
        debug!("No border runs found, using fallback hotbar band");
        return BandRegion::fallback(height);
    }

    let mut coverage = vec![0u32; scan_height];
    for &(s, e) in &runs {
        for y in s..e {
            coverage[(y - scan_top) as usize] += 1;
        }
    }

    let (peak_row, peak) = coverage
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best });
    let cutoff = peak as f64 * 0.5;

    let mut lo = peak_row;
    while lo > 0 && coverage[lo - 1] as f64 >= cutoff {
        lo -= 1;
    }
    let mut hi = peak_row;
    while hi + 1 < scan_height && coverage[hi + 1] as f64 >= cutoff {
        hi += 1;
    }

    let top_y = scan_top + lo as u32;
    let bottom_y = scan_top + hi as u32 + 1;
    let supporting = runs
        .iter()
        .filter(|&&(s, e)| s < bottom_y && e > top_y)
        .count();
    let confidence = (supporting as f64 / RUNS_FOR_FULL_CONFIDENCE)
        .min(1.0)
        .max(MIN_BAND_CONFIDENCE);

    debug!(top_y, bottom_y, supporting, confidence, "Located hotbar band");
    BandRegion { top_y, bottom_y, confidence }
}

/// Input device family, which changes how large the UI is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiLayout {
    Pc,
    Handheld,
}

impl UiLayout {
    pub fn for_resolution(width: u32, height: u32) -> Self {
        if height == 0 {
            return UiLayout::Pc;
        }
        let aspect = width as f64 / height as f64;
        if aspect <= 1.61 && height <= 800 {
            UiLayout::Handheld
        } else {
            UiLayout::Pc
        }
    }

    fn scale(self) -> f64 {
        match self {
            UiLayout::Pc => 1.0,
            UiLayout::Handheld => 1.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiRegions {
    pub layout: UiLayout,
    pub screen_type: Option<ScreenType>,
    pub regions: Vec<Roi>,
}

impl UiRegions {
    pub fn get(&self, label: &str) -> Option<&Roi> {
        self.regions
            .iter()
            .find(|r| r.label.as_deref() == Some(label))
    }
}

/// (label, x, y, w, h) as fractions of the frame
type Fractions = (&'static str, f64, f64, f64, f64);

const MENU_REGIONS: [Fractions; 3] = [
    ("pause_menu", 0.30, 0.15, 0.40, 0.70),
    ("inventory", 0.20, 0.62, 0.60, 0.28),
    ("stats", 0.02, 0.15, 0.22, 0.50),
];

const GAMEPLAY_REGIONS: [Fractions; 2] = [
    ("stats", 0.01, 0.02, 0.22, 0.18),
    ("character", 0.40, 0.35, 0.20, 0.30),
];

/// Proportional UI regions for a frame size.
///
/// With an image and palette the screen type is detected first; gameplay
/// frames get a `hotbar` region from the located band.
pub fn detect_ui_regions(
    width: u32,
    height: u32,
    ctx: Option<(&RgbaImage, &RarityPalette)>,
) -> UiRegions {
    let layout = UiLayout::for_resolution(width, height);
    let scale = layout.scale();
    let place = |f: &Fractions| scaled_region(f, scale, width, height);

    let Some((img, palette)) = ctx else {
        return UiRegions {
            layout,
            screen_type: None,
            regions: MENU_REGIONS.iter().map(place).collect(),
        };
    };

    let screen = detect_screen_type(img);
    let regions = if screen == ScreenType::Gameplay {
        let band = detect_hotbar_region(img, palette);
        let hotbar_width = (width as f64 * 0.7).round() as u32;
        let hotbar_x = ((width - hotbar_width.min(width)) / 2) as i32;
        let mut regions = vec![
            Roi::new(hotbar_x, band.top_y as i32, hotbar_width, band.height()).with_label("hotbar"),
        ];
        regions.extend(GAMEPLAY_REGIONS.iter().map(place));
        regions
    } else {
        MENU_REGIONS.iter().map(place).collect()
    };

    UiRegions { layout, screen_type: Some(screen), regions }
}

/// Scale a fractional region about its centre, then map it to pixels.
fn scaled_region(f: &Fractions, scale: f64, width: u32, height: u32) -> Roi {
    let &(label, fx, fy, fw, fh) = f;
    let w = (fw * scale).min(1.0);
    let h = (fh * scale).min(1.0);
    let x = (fx + fw / 2.0 - w / 2.0).clamp(0.0, 1.0 - w);
    let y = (fy + fh / 2.0 - h / 2.0).clamp(0.0, 1.0 - h);

    Roi::from_f64(
        x * width as f64,
        y * height as f64,
        w * width as f64,
        h * height as f64,
    )
    .with_label(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use image::Rgba;

    #[test]
    fn test_dark_frame_is_pause_menu() {
        let frame = RgbaImage::from_pixel(640, 360, Rgba([25, 25, 30, 255]));
        assert_eq!(detect_screen_type(&frame), ScreenType::PauseMenu);
    }

    #[test]
    fn test_transparent_frame_counts_as_black() {
        let frame = RgbaImage::from_pixel(320, 200, Rgba([255, 255, 255, 0]));
        assert_eq!(detect_screen_type(&frame), ScreenType::PauseMenu);
    }

    #[test]
    fn test_busy_frame_is_gameplay() {
        let frame = testutil::busy_frame(640, 360);
        assert_eq!(detect_screen_type(&frame), ScreenType::Gameplay);
    }

    #[test]
    fn test_flat_mid_grey_is_unknown() {
        let frame = RgbaImage::from_pixel(320, 200, Rgba([128, 128, 128, 255]));
        assert_eq!(detect_screen_type(&frame), ScreenType::Unknown);
        assert_eq!(detect_screen_type(&RgbaImage::new(0, 0)), ScreenType::Unknown);
    }

    #[test]
    fn test_hotbar_band_follows_borders() {
        let (frame, slots) = testutil::hotbar_frame(1280, 720, 40, 4, 400, 640, &[0, 1, 2, 3, 4, 5]);
        let band = detect_hotbar_region(&frame, &RarityPalette::default());

        assert_eq!(band.top_y, slots[0].y as u32);
        assert_eq!(band.bottom_y, slots[0].bottom() as u32);
        assert!(band.confidence >= 0.99);
        assert!(!band.is_fallback());
    }

    #[test]
    fn test_hotbar_fallback_without_borders() {
        let frame = RgbaImage::from_pixel(1000, 1000, Rgba([20, 20, 20, 255]));
        let band = detect_hotbar_region(&frame, &RarityPalette::default());
        assert_eq!(band.top_y, 850);
        assert_eq!(band.bottom_y, 970);
        assert_eq!(band.confidence, 0.15);
        assert!(band.is_fallback());
    }

    #[test]
    fn test_ui_layout_detection() {
        assert_eq!(UiLayout::for_resolution(1280, 800), UiLayout::Handheld);
        assert_eq!(UiLayout::for_resolution(1920, 1080), UiLayout::Pc);
        assert_eq!(UiLayout::for_resolution(1280, 720), UiLayout::Pc);
    }

    #[test]
    fn test_ui_regions_without_context() {
        let regions = detect_ui_regions(1920, 1080, None);
        assert_eq!(regions.layout, UiLayout::Pc);
        assert!(regions.screen_type.is_none());
        for label in ["pause_menu", "inventory", "stats"] {
            let roi = regions.get(label).unwrap();
            assert!(roi.right() <= 1920 && roi.bottom() <= 1080, "{label} out of frame");
        }

        let handheld = detect_ui_regions(1280, 800, None);
        let menu_width = handheld.get("pause_menu").unwrap().width;
        assert_eq!(handheld.layout, UiLayout::Handheld);
        assert!(menu_width as f64 > 0.40 * 1280.0);
    }

    #[test]
    fn test_ui_regions_gameplay_has_hotbar() {
        let frame = testutil::busy_frame(640, 360);
        let regions = detect_ui_regions(640, 360, Some((&frame, &RarityPalette::default())));
        assert_eq!(regions.screen_type, Some(ScreenType::Gameplay));
        assert!(regions.get("hotbar").is_some());
        assert!(regions.get("character").is_some());
        assert!(regions.get("pause_menu").is_none());
    }
}
