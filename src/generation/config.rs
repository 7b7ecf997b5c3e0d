//! Generator configuration: body counts, height bands and orbit bands.

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::world::{Category, CategoryKind};

/// Orbit radius band `[min_radius, max_radius]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitBand {
    pub min_radius: f32,
    pub max_radius: f32,
}

impl OrbitBand {
    pub const fn new(min_radius: f32, max_radius: f32) -> Self {
        Self { min_radius, max_radius }
    }

    pub fn contains(&self, radius: f32) -> bool {
        radius >= self.min_radius && radius <= self.max_radius
    }

    fn is_valid(&self) -> bool {
        self.min_radius.is_finite()
            && self.max_radius.is_finite()
            && self.min_radius >= 0.0
            && self.min_radius <= self.max_radius
    }
}

/// Inclusive count range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Moons orbiting each satellite of a category
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoonSpec {
    pub category: Category,
    pub count: CountRange,
    pub orbit: OrbitBand,
}

/// Satellites orbiting each primary body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSpec {
    pub category: Category,
    pub count: CountRange,
    pub orbit: OrbitBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moons: Option<MoonSpec>,
}

/// Procedural cell generator settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// World seed; combined with the cell coordinate in deterministic mode
    pub seed: u64,
    /// Same cell, same contents. When false every call draws fresh entropy.
    pub deterministic: bool,
    /// Primary bodies per cell
    pub primary_count: CountRange,
    /// Allowed Y values for primary bodies
    pub height_bands: Vec<f32>,
    pub satellites: Vec<SatelliteSpec>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            deterministic: true,
            primary_count: CountRange::new(150, 300),
            height_bands: vec![-200.0, -100.0, 0.0, 100.0, 200.0],
            satellites: vec![
                SatelliteSpec {
                    category: Category::RockyPlanet,
                    count: CountRange::new(0, 2),
                    orbit: OrbitBand::new(8.0, 20.0),
                    moons: None,
                },
                SatelliteSpec {
                    category: Category::GasGiant,
                    count: CountRange::new(0, 1),
                    orbit: OrbitBand::new(22.0, 40.0),
                    moons: Some(MoonSpec {
                        category: Category::RockyMoon,
                        count: CountRange::new(0, 2),
                        orbit: OrbitBand::new(2.0, 5.0),
                    }),
                },
                SatelliteSpec {
                    category: Category::IcePlanet,
                    count: CountRange::new(0, 1),
                    orbit: OrbitBand::new(42.0, 60.0),
                    moons: Some(MoonSpec {
                        category: Category::IceMoon,
                        count: CountRange::new(0, 1),
                        orbit: OrbitBand::new(1.5, 3.0),
                    }),
                },
            ],
        }
    }
}

impl GeneratorConfig {
    /// Check counts, bands and that every category sits at the right level.
    pub fn validate(&self) -> Result<()> {
        if self.primary_count.min > self.primary_count.max {
            return Err(Error::Config(format!(
                "primary_count min ({}) exceeds max ({})",
                self.primary_count.min, self.primary_count.max
            )));
        }
        if self.height_bands.is_empty() {
            return Err(Error::Config("height_bands must not be empty".to_string()));
        }
        if let Some(band) = self.height_bands.iter().find(|h| !h.is_finite()) {
            return Err(Error::Config(format!("height band {band} is not finite")));
        }
        for sat in &self.satellites {
            if sat.category.kind() != CategoryKind::Satellite {
                return Err(Error::Config(format!(
                    "{} is not a satellite category",
                    sat.category.name()
                )));
            }
            check_spec(sat.category, sat.count, sat.orbit)?;
            if let Some(moon) = &sat.moons {
                if moon.category.kind() != CategoryKind::Moon {
                    return Err(Error::Config(format!(
                        "{} is not a moon category",
                        moon.category.name()
                    )));
                }
                check_spec(moon.category, moon.count, moon.orbit)?;
            }
        }
        Ok(())
    }
}

fn check_spec(category: Category, count: CountRange, orbit: OrbitBand) -> Result<()> {
    if count.min > count.max {
        return Err(Error::Config(format!(
            "{}: count min ({}) exceeds max ({})",
            category.name(),
            count.min,
            count.max
        )));
    }
    if !orbit.is_valid() {
        return Err(Error::Config(format!(
            "{}: invalid orbit band [{}, {}]",
            category.name(),
            orbit.min_radius,
            orbit.max_radius
        )));
    }
    Ok(())
}
