use super::Rarity;
use serde::{Deserialize, Serialize};

/// Which catalog list an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Item,
    Weapon,
    Tome,
    Character,
}

impl EntityKind {
    /// Key of the JSON list holding entities of this kind.
    pub fn list_key(&self) -> &'static str {
        match self {
            EntityKind::Item => "items",
            EntityKind::Weapon => "weapons",
            EntityKind::Tome => "tomes",
            EntityKind::Character => "characters",
        }
    }
}

/// A thing that can show up in an inventory slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub tier: Option<String>,
    /// Template image path relative to the template base path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rarity: Rarity) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rarity,
            tier: None,
            image: None,
            kind: EntityKind::Item,
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }
}
