//! Pixel buffer helpers built on the `image` crate

use crate::bbox::Roi;
use crate::error::ScanError;
use crate::Result;
use anyhow::Context;
use base64::Engine;
use image::{imageops, Rgba, RgbaImage};
use std::path::Path;

/// Image utility functions
pub struct ImageUtils;

impl ImageUtils {
    /// Wrap a raw RGBA8 buffer, rejecting buffers whose length disagrees
    /// with the stated dimensions.
    pub fn from_rgba(bytes: &[u8], width: u32, height: u32) -> std::result::Result<RgbaImage, ScanError> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(ScanError::InvalidBuffer {
                width,
                height,
                expected,
                actual: bytes.len(),
            });
        }

        RgbaImage::from_raw(width, height, bytes.to_vec()).ok_or(ScanError::InvalidBuffer {
            width,
            height,
            expected,
            actual: bytes.len(),
        })
    }

    /// Load image file as RGBA
    pub fn load_rgba<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
        let img = image::open(&path)
            .with_context(|| format!("Failed to open image: {:?}", path.as_ref()))?;
        Ok(img.to_rgba8())
    }

    /// Decode an encoded image (png, jpeg, webp, ...) held in memory
    pub fn decode_bytes(bytes: &[u8]) -> std::result::Result<RgbaImage, ScanError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_rgba8())
            .map_err(|e| ScanError::Decode(e.to_string()))
    }

    /// Decode a `data:image/...;base64,` URL
    pub fn decode_data_url(url: &str) -> std::result::Result<RgbaImage, ScanError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| ScanError::InvalidDataUrl("missing data: scheme".to_string()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ScanError::InvalidDataUrl("missing ',' separator".to_string()))?;

        if !header.starts_with("image/") {
            return Err(ScanError::InvalidDataUrl(format!("not an image media type: {header}")));
        }
        if !header.ends_with(";base64") {
            return Err(ScanError::InvalidDataUrl("only base64 payloads are supported".to_string()));
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ScanError::InvalidDataUrl(e.to_string()))?;

        Self::decode_bytes(&bytes)
    }

    /// Copy out the part of `roi` that lies inside the image
    pub fn crop(image: &RgbaImage, roi: &Roi) -> Option<RgbaImage> {
        let clamped = roi.clamp_to(image.width(), image.height())?;
        Some(
            imageops::crop_imm(
                image,
                clamped.x as u32,
                clamped.y as u32,
                clamped.width,
                clamped.height,
            )
            .to_image(),
        )
    }

    /// Centered sub-window covering `scale` of each side (scale is clamped to (0, 1]).
    pub fn center_crop(image: &RgbaImage, scale: f64) -> RgbaImage {
        let scale = scale.clamp(0.05, 1.0);
        let (width, height) = image.dimensions();
        let crop_w = ((width as f64 * scale).round() as u32).clamp(1, width.max(1));
        let crop_h = ((height as f64 * scale).round() as u32).clamp(1, height.max(1));
        if crop_w == width && crop_h == height {
            return image.clone();
        }
        let x = (width - crop_w) / 2;
        let y = (height - crop_h) / 2;
        imageops::crop_imm(image, x, y, crop_w, crop_h).to_image()
    }

    /// Resize with a triangle filter; returns the input untouched when the size already matches.
    pub fn resize(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        imageops::resize(image, width.max(1), height.max(1), imageops::FilterType::Triangle)
    }

    /// Perceived brightness of a pixel, alpha-weighted so transparent reads as black.
    pub fn brightness(pixel: &Rgba<u8>) -> f64 {
        let [r, g, b, a] = pixel.0;
        let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        luma * a as f64 / 255.0
    }
}

/// Single-channel float view of an RGBA image.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl LumaPlane {
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let data = image
            .pixels()
            .map(|p| ImageUtils::brightness(p) as f32)
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Mean and population standard deviation
    pub fn mean_std(&self) -> (f64, f64) {
        mean_std(self.data.iter().map(|&v| v as f64))
    }
}

/// Mean and population standard deviation of a stream of values; (0, 0) when empty.
pub fn mean_std<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_from_rgba_validates_length() {
        assert!(ImageUtils::from_rgba(&[0u8; 16], 2, 2).is_ok());
        let err = ImageUtils::from_rgba(&[0u8; 15], 2, 2).unwrap_err();
        assert!(matches!(err, ScanError::InvalidBuffer { expected: 16, actual: 15, .. }));
    }

    #[test]
    fn test_decode_data_url_roundtrip() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );

        let decoded = ImageUtils::decode_data_url(&url).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_decode_data_url_rejects_garbage() {
        assert!(matches!(
            ImageUtils::decode_data_url("http://example.com/a.png"),
            Err(ScanError::InvalidDataUrl(_))
        ));
        assert!(matches!(
            ImageUtils::decode_data_url("data:text/plain;base64,AAAA"),
            Err(ScanError::InvalidDataUrl(_))
        ));
        assert!(matches!(
            ImageUtils::decode_data_url("data:image/png;base64,AAAA"),
            Err(ScanError::Decode(_))
        ));
    }

    #[test]
    fn test_crop_clamps_to_image() {
        let img = RgbaImage::new(10, 10);
        let cropped = ImageUtils::crop(&img, &Roi::new(8, -2, 5, 5)).unwrap();
        assert_eq!(cropped.dimensions(), (2, 3));
        assert!(ImageUtils::crop(&img, &Roi::new(20, 20, 5, 5)).is_none());
    }

    #[test]
    fn test_center_crop() {
        let img = RgbaImage::new(40, 40);
        assert_eq!(ImageUtils::center_crop(&img, 0.5).dimensions(), (20, 20));
        assert_eq!(ImageUtils::center_crop(&img, 1.5).dimensions(), (40, 40));
    }

    #[test]
    fn test_brightness_respects_alpha() {
        assert_eq!(ImageUtils::brightness(&Rgba([255, 255, 255, 0])), 0.0);
        assert!((ImageUtils::brightness(&Rgba([255, 255, 255, 255])) - 255.0).abs() < 1e-6);
    }
}
