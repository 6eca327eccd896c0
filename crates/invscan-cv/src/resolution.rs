//! Resolution profiles
//!
//! Maps a frame size to the icon geometry the rest of the pipeline expects.
//! Presets are static; sizes between two preset heights are interpolated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse resolution class, decided by frame height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 4] = [
        ResolutionTier::Low,
        ResolutionTier::Medium,
        ResolutionTier::High,
        ResolutionTier::Ultra,
    ];

    fn index(self) -> usize {
        match self {
            ResolutionTier::Low => 0,
            ResolutionTier::Medium => 1,
            ResolutionTier::High => 2,
            ResolutionTier::Ultra => 3,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionTier::Low => "low",
            ResolutionTier::Medium => "medium",
            ResolutionTier::High => "high",
            ResolutionTier::Ultra => "ultra",
        };
        f.write_str(name)
    }
}

/// Expected on-screen icon size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconSize {
    pub min: u32,
    pub typical: u32,
    pub max: u32,
}

/// Geometry and matching parameters for one frame size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionProfile {
    pub tier: ResolutionTier,
    pub name: String,
    pub icon_size: IconSize,
    pub spacing: u32,
    pub scan_step: u32,
    pub template_scales: Vec<f64>,
    pub min_confidence: f64,
}

struct TierPreset {
    tier: ResolutionTier,
    name: &'static str,
    height: u32,
    icon_size: IconSize,
    spacing: u32,
    scan_step: u32,
    template_scales: &'static [f64],
    min_confidence: f64,
}

impl TierPreset {
    fn to_profile(&self) -> ResolutionProfile {
        ResolutionProfile {
            tier: self.tier,
            name: self.name.to_string(),
            icon_size: self.icon_size,
            spacing: self.spacing,
            scan_step: self.scan_step,
            template_scales: self.template_scales.to_vec(),
            min_confidence: self.min_confidence,
        }
    }
}

static TIER_PRESETS: [TierPreset; 4] = [
    TierPreset {
        tier: ResolutionTier::Low,
        name: "720p",
        height: 720,
        icon_size: IconSize { min: 32, typical: 40, max: 48 },
        spacing: 4,
        scan_step: 4,
        template_scales: &[1.0, 0.9, 0.8],
        min_confidence: 0.50,
    },
    TierPreset {
        tier: ResolutionTier::Medium,
        name: "1080p",
        height: 1080,
        icon_size: IconSize { min: 44, typical: 56, max: 68 },
        spacing: 6,
        scan_step: 6,
        template_scales: &[1.0, 0.9, 0.8],
        min_confidence: 0.55,
    },
    TierPreset {
        tier: ResolutionTier::High,
        name: "1440p",
        height: 1440,
        icon_size: IconSize { min: 60, typical: 74, max: 88 },
        spacing: 8,
        scan_step: 8,
        template_scales: &[1.0, 0.92, 0.85],
        min_confidence: 0.58,
    },
    TierPreset {
        tier: ResolutionTier::Ultra,
        name: "4K",
        height: 2160,
        icon_size: IconSize { min: 88, typical: 110, max: 132 },
        spacing: 12,
        scan_step: 12,
        template_scales: &[1.0, 0.94, 0.88],
        min_confidence: 0.60,
    },
];

/// Upper height bound (inclusive) of low, medium and high.
const TIER_BOUNDARIES: [u32; 3] = [800, 1200, 1800];

/// A named screen size, used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionPreset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

pub static KNOWN_PRESETS: [ResolutionPreset; 10] = [
    ResolutionPreset { name: "720p", width: 1280, height: 720 },
    ResolutionPreset { name: "Steam Deck", width: 1280, height: 800 },
    ResolutionPreset { name: "WXGA", width: 1366, height: 768 },
    ResolutionPreset { name: "900p", width: 1600, height: 900 },
    ResolutionPreset { name: "1080p", width: 1920, height: 1080 },
    ResolutionPreset { name: "1200p", width: 1920, height: 1200 },
    ResolutionPreset { name: "Ultrawide 1080p", width: 2560, height: 1080 },
    ResolutionPreset { name: "1440p", width: 2560, height: 1440 },
    ResolutionPreset { name: "Ultrawide 1440p", width: 3440, height: 1440 },
    ResolutionPreset { name: "4K", width: 3840, height: 2160 },
];

/// Classify a frame by height.
pub fn get_resolution_tier(_width: u32, height: u32) -> ResolutionTier {
    if height <= TIER_BOUNDARIES[0] {
        ResolutionTier::Low
    } else if height <= TIER_BOUNDARIES[1] {
        ResolutionTier::Medium
    } else if height <= TIER_BOUNDARIES[2] {
        ResolutionTier::High
    } else {
        ResolutionTier::Ultra
    }
}

/// Profile for a frame size. Same as [`interpolate_profile`].
pub fn get_profile_for_resolution(width: u32, height: u32) -> ResolutionProfile {
    interpolate_profile(width, height)
}

/// The static preset of one tier, no blending.
pub fn tier_profile(tier: ResolutionTier) -> ResolutionProfile {
    TIER_PRESETS[tier.index()].to_profile()
}

/// Profile for a frame size, blended between the two nearest presets.
///
/// At a preset's own height this is that preset exactly. Between two
/// adjacent preset heights numeric fields move linearly, weighted by the
/// distance to each preset: `t = (h - h_lo) / (h_hi - h_lo)`. Below the
/// lowest or above the highest preset the outer preset is returned. The
/// result is continuous in `height`; `tier` always follows
/// [`get_resolution_tier`].
pub fn interpolate_profile(width: u32, height: u32) -> ResolutionProfile {
    let tier = get_resolution_tier(width, height);
    let h = height as f64;

    for pair in TIER_PRESETS.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if h >= lo.height as f64 && h < hi.height as f64 {
            let t = (h - lo.height as f64) / (hi.height as f64 - lo.height as f64);
            let mut profile = blend(lo, hi, t);
            profile.tier = tier;
            return profile;
        }
    }

    tier_profile(tier)
}

fn blend(lo: &TierPreset, hi: &TierPreset, t: f64) -> ResolutionProfile {
    if t <= 0.0 {
        return lo.to_profile();
    }
    if t >= 1.0 {
        return hi.to_profile();
    }

    let lerp = |a: u32, b: u32| (a as f64 + (b as f64 - a as f64) * t).round() as u32;
    let nearer = if t < 0.5 { lo } else { hi };

    ResolutionProfile {
        tier: nearer.tier,
        name: format!("{}~{}", lo.name, hi.name),
        icon_size: IconSize {
            min: lerp(lo.icon_size.min, hi.icon_size.min),
            typical: lerp(lo.icon_size.typical, hi.icon_size.typical),
            max: lerp(lo.icon_size.max, hi.icon_size.max),
        },
        spacing: lerp(lo.spacing, hi.spacing),
        scan_step: lerp(lo.scan_step, hi.scan_step).max(1),
        template_scales: nearer.template_scales.to_vec(),
        min_confidence: lo.min_confidence + (hi.min_confidence - lo.min_confidence) * t,
    }
}

/// Nearest known screen size by Euclidean distance on (width, height).
pub fn get_closest_preset(width: u32, height: u32) -> &'static ResolutionPreset {
    let distance = |p: &ResolutionPreset| {
        let dw = p.width as f64 - width as f64;
        let dh = p.height as f64 - height as f64;
        dw * dw + dh * dh
    };

    let mut best = &KNOWN_PRESETS[0];
    for preset in KNOWN_PRESETS.iter().skip(1) {
        if distance(preset) < distance(best) {
            best = preset;
        }
    }
    best
}
