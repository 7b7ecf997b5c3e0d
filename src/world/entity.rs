//! Celestial entities and per-cell contents

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Vec3;
use super::grid::CellCoord;

/// Number of entity categories
pub const CATEGORY_COUNT: usize = 6;

/// Role of a category in the primary/satellite/moon hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    Primary,
    Satellite,
    Moon,
}

/// Entity category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Star,
    RockyPlanet,
    GasGiant,
    IcePlanet,
    RockyMoon,
    IceMoon,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Star,
        Category::RockyPlanet,
        Category::GasGiant,
        Category::IcePlanet,
        Category::RockyMoon,
        Category::IceMoon,
    ];

    /// Dense index into per-category arrays
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn kind(self) -> CategoryKind {
        match self {
            Category::Star => CategoryKind::Primary,
            Category::RockyPlanet | Category::GasGiant | Category::IcePlanet => CategoryKind::Satellite,
            Category::RockyMoon | Category::IceMoon => CategoryKind::Moon,
        }
    }

    /// Satellites and moons; these are loaded only near the observer
    pub const fn is_detail(self) -> bool {
        !matches!(self.kind(), CategoryKind::Primary)
    }

    /// Wire name (snake_case)
    pub const fn name(self) -> &'static str {
        match self {
            Category::Star => "star",
            Category::RockyPlanet => "rocky_planet",
            Category::GasGiant => "gas_giant",
            Category::IcePlanet => "ice_planet",
            Category::RockyMoon => "rocky_moon",
            Category::IceMoon => "ice_moon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Pass-through metadata owned by the simulation layer.
///
/// Unknown fields are kept in `extra` so they survive every cache layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buildings: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A positioned body belonging to one cell
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub position: Vec3,
    pub category: Category,
    pub cell: CellCoord,
    pub meta: EntityMeta,
}

impl Entity {
    pub fn new(position: Vec3, category: Category, cell: CellCoord) -> Self {
        Self {
            position,
            category,
            cell,
            meta: EntityMeta::default(),
        }
    }
}

/// Everything generated for (or fetched for) one cell, grouped by category
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellContents {
    pub cell: CellCoord,
    pub categories: [Vec<Entity>; CATEGORY_COUNT],
}

impl CellContents {
    pub fn new(cell: CellCoord) -> Self {
        Self {
            cell,
            categories: Default::default(),
        }
    }

    pub fn entities(&self, category: Category) -> &[Entity] {
        &self.categories[category.index()]
    }

    pub fn entities_mut(&mut self, category: Category) -> &mut Vec<Entity> {
        &mut self.categories[category.index()]
    }

    pub fn push(&mut self, entity: Entity) {
        self.categories[entity.category.index()].push(entity);
    }

    /// Total entity count across categories
    pub fn len(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(Vec::is_empty)
    }

    /// Number of satellite and moon entities
    pub fn detail_len(&self) -> usize {
        Category::ALL
            .iter()
            .filter(|c| c.is_detail())
            .map(|c| self.entities(*c).len())
            .sum()
    }
}
