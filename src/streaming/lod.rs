//! Per-frame level of detail and frustum culling over a world snapshot
//!
//! Two levels: entities near the observer are drawn fine, distant primary
//! bodies are drawn coarse, and distant satellites and moons are not drawn.
//! The fine threshold is the streaming detail distance, so satellites are
//! drawn exactly where the scheduler publishes them.
//! Culling tests each entity's bounding sphere against the view frustum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{EngineConfig, Vec3};
use crate::math::Frustum;
use crate::world::{Category, Entity, WorldSnapshot, CATEGORY_COUNT};

/// Configuration for LOD selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Primary bodies farther than this are not drawn at all
    pub coarse_distance: f32,
    /// Bounding sphere radius per category
    pub radii: BTreeMap<Category, f32>,
    /// Radius for categories missing from `radii`
    pub default_radius: f32,
}

impl Default for LodConfig {
    fn default() -> Self {
        let radii = BTreeMap::from([
            (Category::Star, 25.0),
            (Category::GasGiant, 8.0),
            (Category::RockyPlanet, 3.0),
            (Category::IcePlanet, 3.0),
            (Category::RockyMoon, 1.0),
            (Category::IceMoon, 1.0),
        ]);
        Self {
            coarse_distance: 12_000.0,
            radii,
            default_radius: 1.0,
        }
    }
}

impl LodConfig {
    pub fn radius(&self, category: Category) -> f32 {
        self.radii.get(&category).copied().unwrap_or(self.default_radius)
    }
}

/// Detail level chosen for one entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodLevel {
    Fine,
    Coarse,
    Hidden,
}

/// Pick a level from the entity category and its distance to the observer.
/// `detail_distance` is the streaming detail radius.
pub fn lod_for(config: &LodConfig, detail_distance: f32, category: Category, distance: f32) -> LodLevel {
    if distance < detail_distance {
        LodLevel::Fine
    } else if category.is_detail() || distance > config.coarse_distance {
        LodLevel::Hidden
    } else {
        LodLevel::Coarse
    }
}

/// Entities to draw this frame, split by detail level and category
#[derive(Debug)]
pub struct RenderSet<'a> {
    fine: [Vec<&'a Entity>; CATEGORY_COUNT],
    coarse: [Vec<&'a Entity>; CATEGORY_COUNT],
    /// Entities rejected by the frustum test
    pub culled: usize,
}

impl<'a> RenderSet<'a> {
    fn new() -> Self {
        Self {
            fine: Default::default(),
            coarse: Default::default(),
            culled: 0,
        }
    }

    pub fn fine(&self, category: Category) -> &[&'a Entity] {
        &self.fine[category.index()]
    }

    pub fn coarse(&self, category: Category) -> &[&'a Entity] {
        &self.coarse[category.index()]
    }

    pub fn fine_count(&self) -> usize {
        self.fine.iter().map(Vec::len).sum()
    }

    pub fn coarse_count(&self) -> usize {
        self.coarse.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fine_count() == 0 && self.coarse_count() == 0
    }
}

/// Read-only LOD and culling policy
#[derive(Clone, Debug)]
pub struct LodPolicy {
    config: LodConfig,
    detail_distance: f32,
}

impl Default for LodPolicy {
    fn default() -> Self {
        Self::from_engine(&EngineConfig::default())
    }
}

impl LodPolicy {
    pub fn new(config: LodConfig, detail_distance: f32) -> Self {
        Self {
            config,
            detail_distance,
        }
    }

    /// Policy whose fine radius is `engine.stream.detail_distance`
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self::new(engine.lod.clone(), engine.stream.detail_distance)
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn detail_distance(&self) -> f32 {
        self.detail_distance
    }

    /// Classify every entity of `snapshot`. With no frustum nothing is culled.
    pub fn render_set<'a>(
        &self,
        snapshot: &'a WorldSnapshot,
        observer: Vec3,
        frustum: Option<&Frustum>,
    ) -> RenderSet<'a> {
        let mut set = RenderSet::new();
        for (category, entities) in snapshot.iter() {
            let radius = self.config.radius(category);
            for entity in entities {
                let distance = entity.position.distance(observer);
                let level = lod_for(&self.config, self.detail_distance, category, distance);
                if level == LodLevel::Hidden {
                    continue;
                }
                if let Some(frustum) = frustum {
                    if !frustum.intersects_sphere(entity.position, radius) {
                        set.culled += 1;
                        continue;
                    }
                }
                match level {
                    LodLevel::Fine => set.fine[category.index()].push(entity),
                    LodLevel::Coarse => set.coarse[category.index()].push(entity),
                    LodLevel::Hidden => {}
                }
            }
        }
        set
    }
}
