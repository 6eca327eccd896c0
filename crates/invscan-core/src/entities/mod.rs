mod entity;
mod rarity;

pub use entity::{Entity, EntityKind};
pub use rarity::Rarity;
