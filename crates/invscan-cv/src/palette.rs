//! Rarity border colours
//!
//! Icon slots are framed in a rarity colour. The exact shades depend on the
//! game's theme and the capture gamma, so the palette is data: load a
//! different one from JSON when a theme misses borders.

use crate::Result;
use anyhow::Context;
use image::Rgba;
use invscan_core::Rarity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One reference colour and how far (Euclidean RGB) a pixel may drift from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRule {
    pub rarity: Rarity,
    pub rgb: [u8; 3],
    pub tolerance: f64,
}

impl ColorRule {
    pub fn new(rarity: Rarity, rgb: [u8; 3], tolerance: f64) -> Self {
        Self { rarity, rgb, tolerance }
    }

    fn distance(&self, r: u8, g: u8, b: u8) -> f64 {
        let dr = r as f64 - self.rgb[0] as f64;
        let dg = g as f64 - self.rgb[1] as f64;
        let db = b as f64 - self.rgb[2] as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

/// Colours that mark a rarity border
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityPalette {
    pub rules: Vec<ColorRule>,
    /// Pixels more transparent than this never classify.
    pub min_alpha: u8,
    /// Minimum `max(r,g,b) - min(r,g,b)`; greys and UI chrome stay out.
    pub min_chroma: u8,
}

impl Default for RarityPalette {
    fn default() -> Self {
        Self {
            rules: vec![
                ColorRule::new(Rarity::Uncommon, [70, 200, 90], 70.0),
                ColorRule::new(Rarity::Rare, [60, 130, 240], 70.0),
                ColorRule::new(Rarity::Epic, [170, 70, 230], 70.0),
                ColorRule::new(Rarity::Legendary, [250, 160, 30], 70.0),
            ],
            min_alpha: 128,
            min_chroma: 60,
        }
    }
}

impl RarityPalette {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read palette: {:?}", path.as_ref()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse palette: {:?}", path.as_ref()))
    }

    /// Rarity of the closest rule within tolerance
    pub fn classify(&self, pixel: &Rgba<u8>) -> Option<Rarity> {
        let [r, g, b, a] = pixel.0;
        if a < self.min_alpha {
            return None;
        }
        let chroma = r.max(g).max(b) - r.min(g).min(b);
        if chroma < self.min_chroma {
            return None;
        }

        self.rules
            .iter()
            .map(|rule| (rule, rule.distance(r, g, b)))
            .filter(|(rule, d)| *d <= rule.tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(rule, _)| rule.rarity)
    }

    pub fn is_border(&self, pixel: &Rgba<u8>) -> bool {
        self.classify(pixel).is_some()
    }
}
