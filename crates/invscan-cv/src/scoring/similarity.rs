//! Patch similarity metrics
//!
//! Every metric compares two RGBA patches and returns a plain score. None of
//! them fail: mismatched or empty inputs score 0.

use crate::scoring::MetricWeights;
use crate::utils::LumaPlane;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// SSIM window edge length in pixels.
pub const SSIM_WINDOW: u32 = 8;
const HISTOGRAM_BINS: usize = 32;
const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);
/// Strongest Sobel response below which a patch counts as edgeless.
const MIN_EDGE_MAGNITUDE: f32 = 8.0;

/// The four metrics of one comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub ncc: f64,
    pub ssim: f64,
    pub histogram: f64,
    pub edge: f64,
}

impl MetricScores {
    pub fn as_array(&self) -> [f64; 4] {
        [self.ncc, self.ssim, self.histogram, self.edge]
    }
}

fn same_size(a: &RgbaImage, b: &RgbaImage) -> bool {
    a.dimensions() == b.dimensions() && a.width() > 0 && a.height() > 0
}

/// Zero-mean normalized cross-correlation of luma, in [-1, 1].
pub fn calculate_ncc(a: &RgbaImage, b: &RgbaImage) -> f64 {
    if !same_size(a, b) {
        return 0.0;
    }
    ncc_slices(&LumaPlane::from_rgba(a).data, &LumaPlane::from_rgba(b).data)
}

/// Global structural similarity of luma. 1.0 for identical patches.
pub fn calculate_ssim(a: &RgbaImage, b: &RgbaImage) -> f64 {
    if !same_size(a, b) {
        return 0.0;
    }
    ssim_slices(&LumaPlane::from_rgba(a).data, &LumaPlane::from_rgba(b).data)
}

/// Mean SSIM over non-overlapping 8x8 tiles; global SSIM when a patch is
/// smaller than one tile.
pub fn calculate_windowed_ssim(a: &RgbaImage, b: &RgbaImage) -> f64 {
    if !same_size(a, b) {
        return 0.0;
    }
    windowed_ssim_planes(&LumaPlane::from_rgba(a), &LumaPlane::from_rgba(b))
}

/// Per-channel RGB histogram intersection over opaque pixels, averaged.
/// Ignores layout entirely; sizes may differ.
pub fn calculate_histogram_similarity(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let (Some(hist_a), Some(hist_b)) = (color_histogram(a), color_histogram(b)) else {
        return 0.0;
    };

    let mut total = 0.0;
    for channel in 0..3 {
        total += hist_a[channel]
            .iter()
            .zip(hist_b[channel].iter())
            .map(|(x, y)| x.min(*y))
            .sum::<f64>();
    }
    (total / 3.0).clamp(0.0, 1.0)
}

/// Zero-mean normalized correlation of Sobel gradient magnitudes, clamped to
/// [0, 1]. 0 when either patch has no edges.
pub fn calculate_edge_similarity(a: &RgbaImage, b: &RgbaImage) -> f64 {
    if !same_size(a, b) {
        return 0.0;
    }
    edge_similarity_planes(&LumaPlane::from_rgba(a), &LumaPlane::from_rgba(b))
}

/// All four metrics, sharing one luma conversion. The SSIM slot holds the
/// windowed variant.
pub fn compare_patches(a: &RgbaImage, b: &RgbaImage) -> MetricScores {
    compare_patches_with(a, b, None)
}

/// Like [`compare_patches`] but skips metrics whose weight is zero.
pub fn compare_patches_with(
    a: &RgbaImage,
    b: &RgbaImage,
    weights: Option<&MetricWeights>,
) -> MetricScores {
    let wanted = |w: fn(&MetricWeights) -> f64| weights.is_none_or(|ws| w(ws) > 0.0);

    let histogram = if wanted(|w| w.histogram) {
        calculate_histogram_similarity(a, b)
    } else {
        0.0
    };

    if !same_size(a, b) {
        return MetricScores {
            histogram,
            ..MetricScores::default()
        };
    }

    let luma_a = LumaPlane::from_rgba(a);
    let luma_b = LumaPlane::from_rgba(b);

    MetricScores {
        ncc: if wanted(|w| w.ncc) { ncc_slices(&luma_a.data, &luma_b.data) } else { 0.0 },
        ssim: if wanted(|w| w.ssim) { windowed_ssim_planes(&luma_a, &luma_b) } else { 0.0 },
        histogram,
        edge: if wanted(|w| w.edge) { edge_similarity_planes(&luma_a, &luma_b) } else { 0.0 },
    }
}

fn ncc_slices(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= 1e-9 {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

fn ssim_slices(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    ssim_from_pairs(a.iter().zip(b).map(|(&x, &y)| (x as f64, y as f64)), a.len())
}

fn ssim_from_pairs<I: Iterator<Item = (f64, f64)> + Clone>(pairs: I, n: usize) -> f64 {
    let n = n as f64;
    let (sum_x, sum_y) = pairs.clone().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut cov = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov += dx * dy;
    }
    var_x /= n;
    var_y /= n;
    cov /= n;

    let numerator = (2.0 * mean_x * mean_y + SSIM_C1) * (2.0 * cov + SSIM_C2);
    let denominator = (mean_x * mean_x + mean_y * mean_y + SSIM_C1) * (var_x + var_y + SSIM_C2);
    (numerator / denominator).clamp(-1.0, 1.0)
}

fn windowed_ssim_planes(a: &LumaPlane, b: &LumaPlane) -> f64 {
    if a.width != b.width || a.height != b.height || a.is_empty() {
        return 0.0;
    }
    if a.width < SSIM_WINDOW || a.height < SSIM_WINDOW {
        return ssim_slices(&a.data, &b.data);
    }

    let width = a.width as usize;
    let win = SSIM_WINDOW as usize;
    let mut total = 0.0;
    let mut windows = 0usize;

    for wy in (0..=(a.height - SSIM_WINDOW) as usize).step_by(win) {
        for wx in (0..=(a.width - SSIM_WINDOW) as usize).step_by(win) {
            let pairs = (0..win).flat_map(move |dy| {
                (0..win).map(move |dx| (wy + dy) * width + wx + dx)
            });
            let pairs = pairs.map(|i| (a.data[i] as f64, b.data[i] as f64));
            total += ssim_from_pairs(pairs, win * win);
            windows += 1;
        }
    }

    if windows == 0 {
        return ssim_slices(&a.data, &b.data);
    }
    total / windows as f64
}

fn color_histogram(image: &RgbaImage) -> Option<[[f64; HISTOGRAM_BINS]; 3]> {
    let mut hist = [[0.0f64; HISTOGRAM_BINS]; 3];
    let mut count = 0usize;

    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        for (channel, value) in [r, g, b].into_iter().enumerate() {
            hist[channel][value as usize * HISTOGRAM_BINS / 256] += 1.0;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }
    for channel in hist.iter_mut() {
        for bin in channel.iter_mut() {
            *bin /= count as f64;
        }
    }
    Some(hist)
}

/// Sobel gradient magnitude; border pixels stay 0.
pub(crate) fn sobel_magnitude(plane: &LumaPlane) -> Vec<f32> {
    let (w, h) = (plane.width as usize, plane.height as usize);
    let mut out = vec![0.0f32; w * h];
    if w < 3 || h < 3 {
        return out;
    }

    let px = |x: usize, y: usize| plane.data[y * w + x];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x, y - 1)
                - px(x + 1, y - 1);
            out[y * w + x] = (gx * gx + gy * gy).sqrt();
        }
    }
    out
}

/// Zero-mean correlation of the two Sobel maps; anti-correlated layouts
/// clamp to 0.
fn edge_similarity_planes(a: &LumaPlane, b: &LumaPlane) -> f64 {
    if a.width != b.width || a.height != b.height || a.is_empty() {
        return 0.0;
    }
    let edges_a = sobel_magnitude(a);
    let edges_b = sobel_magnitude(b);

    let has_edges = |m: &[f32]| m.iter().any(|&v| v >= MIN_EDGE_MAGNITUDE);
    if !has_edges(&edges_a) || !has_edges(&edges_b) {
        return 0.0;
    }

    ncc_slices(&edges_a, &edges_b).max(0.0)
}
