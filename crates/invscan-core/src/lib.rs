//! Game data model for inventory scanning: entity kinds, rarities and the
//! catalog the detector identifies icons against.

pub mod catalog;
pub mod entities;

pub use catalog::Catalog;
pub use entities::{Entity, EntityKind, Rarity};
