//! Template module: item images, strategies and the ensemble matcher

pub mod loader;
pub mod matcher;
pub mod strategy;

pub use loader::{ImageSource, TemplateFetch, TemplateLoader, load_image};
pub use matcher::{EnsembleMatch, EnsembleMatcher};
pub use strategy::{Strategy, StrategyKind, StrategyRegistry, select_strategies_for_image};

use image::RgbaImage;
use invscan_core::Entity;
use std::collections::HashMap;
use tracing::debug;

/// Name of the set the built-in strategies read from.
pub const DEFAULT_TEMPLATE_SET: &str = "default";

/// Reference image for one entity
#[derive(Debug, Clone)]
pub struct Template {
    pub entity: Entity,
    pub image: RgbaImage,
    pub metadata: HashMap<String, String>,
}

impl Template {
    pub fn new(entity: Entity, image: RgbaImage) -> Self {
        Self {
            entity,
            image,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Named group of templates that a strategy scores against
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    pub name: String,
    pub templates: Vec<Template>,
}

impl TemplateSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: Vec::new(),
        }
    }

    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    pub fn push(&mut self, template: Template) {
        self.templates.push(template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Template> {
        self.templates.iter()
    }
}

/// Every loaded template set, keyed by set name
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    sets: HashMap<String, TemplateSet>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a set, replacing any set with the same name.
    pub fn insert(&mut self, set: TemplateSet) {
        self.sets.insert(set.name.clone(), set);
    }

    pub fn get(&self, name: &str) -> Option<&TemplateSet> {
        self.sets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Total number of templates across all sets
    pub fn template_count(&self) -> usize {
        self.sets.values().map(TemplateSet::len).sum()
    }

    /// Wait for every pending fetch. Sets that fail, time out or were
    /// cancelled are left out; the rest are added.
    pub async fn load_sets(&mut self, fetches: Vec<TemplateFetch>) -> usize {
        let mut loaded = 0;
        for fetch in fetches {
            if let Some(set) = fetch.resolve().await {
                debug!(set = %set.name, templates = set.len(), "Template set ready");
                self.insert(set);
                loaded += 1;
            }
        }
        loaded
    }
}
