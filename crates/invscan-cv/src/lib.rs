//! Inventory Scan Computer Vision Library
//!
//! Locates the hotbar in a game screenshot, infers the icon grid, and
//! identifies each slot against item templates with a multi-metric ensemble.

pub mod bbox;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod palette;
pub mod region;
pub mod grid;
pub mod resolution;
pub mod scoring;
pub mod template;
pub mod utils;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use bbox::Roi;
pub use detection::{
    DetectionConfig, DetectionMethod, DetectionOutput, DetectionResult, InventoryDetector,
};
pub use error::ScanError;
pub use palette::RarityPalette;
pub use resolution::{ResolutionProfile, ResolutionTier};
pub use scoring::{ScoringConfig, ScoringPreset, SharedScoringConfig};
pub use template::{EnsembleMatcher, TemplateLibrary, TemplateLoader};

pub use invscan_core::{Catalog, Entity, Rarity};

// Error handling
pub type Result<T> = anyhow::Result<T>;

/// Core traits for the CV system
pub mod traits {
    use invscan_core::Entity;

    /// Something that can be looked up as a template on disk.
    pub trait Detectable {
        /// File stems to try, most specific first.
        fn template_names(&self) -> Vec<String>;
    }

    impl Detectable for Entity {
        fn template_names(&self) -> Vec<String> {
            let mut names = vec![self.id.clone(), self.id.to_lowercase()];
            let from_name = invscan_core::catalog::id_from_name(&self.name);
            if !names.contains(&from_name) {
                names.push(from_name);
            }
            names.push(format!("_{}", self.id));
            names
        }
    }
}
