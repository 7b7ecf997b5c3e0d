//! World model: grid, entities and the double-buffered world state

pub mod grid;
pub mod entity;
pub mod state;

pub use grid::{CellCoord, cell_of, cells_within, key_of};
pub use entity::{Category, CategoryKind, CellContents, Entity, EntityMeta, CATEGORY_COUNT};
pub use state::{WorldReader, WorldSnapshot, WorldState, WorldWriter};
