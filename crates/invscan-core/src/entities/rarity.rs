use serde::{Deserialize, Serialize};
use std::fmt;

/// Item quality class. Anything the game data spells differently lands in
/// `Unknown` instead of failing the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    #[default]
    Unknown,
}

impl Rarity {
    pub const ALL: [Rarity; 6] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
        Rarity::Unknown,
    ];

    /// Case-insensitive parse; unrecognised or empty input maps to `Unknown`.
    pub fn normalize(value: &str) -> Rarity {
        match value.trim().to_ascii_lowercase().as_str() {
            "common" => Rarity::Common,
            "uncommon" => Rarity::Uncommon,
            "rare" => Rarity::Rare,
            "epic" => Rarity::Epic,
            "legendary" => Rarity::Legendary,
            _ => Rarity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
            Rarity::Unknown => "unknown",
        }
    }
}

impl From<String> for Rarity {
    fn from(value: String) -> Self {
        Rarity::normalize(&value)
    }
}

impl From<&str> for Rarity {
    fn from(value: &str) -> Self {
        Rarity::normalize(value)
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
