//! Entity catalog loaded from the companion guide's JSON data files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::entities::{Entity, EntityKind};

/// Prefixes wiki/OCR text tends to carry in front of the real name.
const NAME_PREFIXES: [&str; 4] = ["item ", "weapon ", "tome ", "character "];

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<Entity>,
    #[serde(default)]
    weapons: Vec<Entity>,
    #[serde(default)]
    tomes: Vec<Entity>,
    #[serde(default)]
    characters: Vec<Entity>,
}

/// All entities the detector can report, indexed by id and normalised name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: Vec<Entity>) -> Self {
        let mut catalog = Self::new();
        for entity in entities {
            catalog.insert(entity);
        }
        catalog
    }

    /// Load one data file (`items.json`, `weapons.json`, ...).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load_file(path)?;
        Ok(catalog)
    }

    /// Merge another data file into this catalog. Later ids replace earlier ones.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {:?}", path))?;
        let count = self
            .load_str(&raw)
            .with_context(|| format!("Failed to parse catalog file: {:?}", path))?;

        info!(count, path = ?path, "loaded catalog entities");
        Ok(count)
    }

    pub fn load_str(&mut self, raw: &str) -> Result<usize> {
        let file: CatalogFile = serde_json::from_str(raw).context("Invalid catalog JSON")?;

        let lists = [
            (EntityKind::Item, file.items),
            (EntityKind::Weapon, file.weapons),
            (EntityKind::Tome, file.tomes),
            (EntityKind::Character, file.characters),
        ];

        let mut count = 0;
        for (kind, entities) in lists {
            for entity in entities {
                if entity.id.trim().is_empty() {
                    debug!(name = %entity.name, "skipping catalog entry without id");
                    continue;
                }
                self.insert(entity.with_kind(kind));
                count += 1;
            }
        }

        Ok(count)
    }

    pub fn insert(&mut self, entity: Entity) {
        if let Some(&index) = self.by_id.get(&entity.id) {
            self.by_name.insert(normalize_name(&entity.name), index);
            self.entities[index] = entity;
            return;
        }

        let index = self.entities.len();
        self.by_id.insert(entity.id.clone(), index);
        self.by_name.insert(normalize_name(&entity.name), index);
        self.by_name
            .entry(normalize_name(&entity.id.replace('_', " ")))
            .or_insert(index);
        self.entities.push(entity);
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&index| &self.entities[index])
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    /// Resolve free text (OCR output, file stems) to an entity.
    ///
    /// Tries the id, the normalised name, the name without a kind prefix,
    /// the id form of the name, and finally substring containment for
    /// names longer than three characters.
    pub fn find_by_name(&self, text: &str) -> Option<&Entity> {
        if let Some(entity) = self.get(text) {
            return Some(entity);
        }

        let normalized = normalize_name(text);
        if normalized.is_empty() {
            return None;
        }
        if let Some(&index) = self.by_name.get(&normalized) {
            return Some(&self.entities[index]);
        }

        for prefix in NAME_PREFIXES {
            if let Some(clean) = normalized.strip_prefix(prefix) {
                if let Some(&index) = self.by_name.get(clean) {
                    return Some(&self.entities[index]);
                }
            }
        }

        if let Some(entity) = self.get(&id_from_name(text)) {
            return Some(entity);
        }

        if normalized.len() > 3 {
            let mut names: Vec<(&String, &usize)> = self.by_name.iter().collect();
            names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
            for (name, &index) in names {
                if name.len() > 3 && (normalized.contains(name.as_str()) || name.contains(&normalized)) {
                    return Some(&self.entities[index]);
                }
            }
        }

        None
    }

    /// Entities a human might confuse with `entity`: same rarity first,
    /// then same tier, in catalog order. Never includes `entity` itself.
    pub fn similar_entities(&self, entity: &Entity, limit: usize) -> Vec<&Entity> {
        let others = || self.entities.iter().filter(|e| e.id != entity.id);

        let mut similar: Vec<&Entity> = others().filter(|e| e.rarity == entity.rarity).collect();

        if entity.tier.is_some() {
            similar.extend(
                others().filter(|e| e.rarity != entity.rarity && e.tier == entity.tier),
            );
        }

        similar.truncate(limit);
        similar
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

/// Lowercase, drop apostrophes, turn every other non-alphanumeric run into a
/// single space.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for c in name.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// `"Bob's Big Hat"` -> `"bobs_big_hat"`.
pub fn id_from_name(name: &str) -> String {
    normalize_name(name).replace(' ', "_")
}
