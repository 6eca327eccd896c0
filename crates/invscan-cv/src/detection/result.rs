//! Detection values

use crate::bbox::Roi;
use invscan_core::Entity;
use serde::{Deserialize, Serialize};

/// How a detection was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    TemplateMatch,
    Ocr,
    Hybrid,
}

/// One identified entity. Treated as an immutable value: post-processing
/// builds new results instead of editing these in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub entity: Entity,
    pub confidence: f64,
    pub method: DetectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Roi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl DetectionResult {
    pub fn new(entity: Entity, confidence: f64, method: DetectionMethod) -> Self {
        Self {
            entity,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            position: None,
            count: None,
            raw_text: None,
        }
    }

    pub fn with_position(mut self, position: Roi) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_raw_text(mut self, text: impl Into<String>) -> Self {
        self.raw_text = Some(text.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.entity.id
    }

    /// Occurrences this result stands for
    pub fn occurrences(&self) -> u32 {
        self.count.unwrap_or(1)
    }
}
