//! Rectangular regions of interest
//!
//! One type serves as scan window, grid cell and detection box.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame pixels. Width and height can't go
/// negative; the origin may sit off-frame while a layout is being built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Roi {
    /// Create a new unlabelled region
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            label: None,
        }
    }

    /// Region from float geometry, rounding the origin and clamping size at 0
    pub fn from_f64(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(
            x.round() as i32,
            y.round() as i32,
            width.round().max(0.0) as u32,
            height.round().max(0.0) as u32,
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Overlapping part of two regions, `None` when they only touch or miss.
    pub fn intersect(&self, other: &Roi) -> Option<Roi> {
        let x1 = (self.x as i64).max(other.x as i64);
        let y1 = (self.y as i64).max(other.y as i64);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Roi::new(x1 as i32, y1 as i32, (x2 - x1) as u32, (y2 - y1) as u32))
    }

    /// Intersection over union, in [0, 1]. Zero-area boxes never overlap.
    pub fn iou(&self, other: &Roi) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        let Some(overlap) = self.intersect(other) else {
            return 0.0;
        };

        let intersection = overlap.area();
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }

        (intersection / union).clamp(0.0, 1.0)
    }

    /// Part of the region inside a `width` x `height` frame, keeping the label.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Roi> {
        let frame = Roi::new(0, 0, width, height);
        self.intersect(&frame).map(|mut clamped| {
            clamped.label = self.label.clone();
            clamped
        })
    }
}
