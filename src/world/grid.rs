//! Uniform horizontal grid: world position to cell coordinate and cell key.
//!
//! Space is partitioned on X and Z only; every cell covers the full vertical
//! column. Cells are addressed by `CellCoord` in memory and by the canonical
//! `"cx,cz"` key string on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, Vec3};
use crate::math::Aabb;

/// Integer cell coordinate on the horizontal grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Cell containing a world position (floor division on X and Z).
    ///
    /// Total over all inputs: coordinates outside `i32` range saturate and
    /// NaN maps to 0.
    pub fn from_world_pos(pos: Vec3, grid_size: f32) -> Self {
        let g = grid_size as f64;
        Self {
            x: (pos.x as f64 / g).floor() as i32,
            z: (pos.z as f64 / g).floor() as i32,
        }
    }

    /// Canonical key, `"cx,cz"`
    pub fn key(&self) -> String {
        format!("{},{}", self.x, self.z)
    }

    /// Parse a canonical key back into a coordinate
    pub fn from_key(key: &str) -> Result<Self> {
        let invalid = || Error::InvalidCellKey(key.to_string());
        let (x, z) = key.split_once(',').ok_or_else(invalid)?;
        let x = x.trim().parse::<i32>().map_err(|_| invalid())?;
        let z = z.trim().parse::<i32>().map_err(|_| invalid())?;
        Ok(Self { x, z })
    }

    /// World-space corner with the smallest X and Z (Y = 0)
    pub fn origin(&self, grid_size: f32) -> Vec3 {
        Vec3::new(
            (self.x as f64 * grid_size as f64) as f32,
            0.0,
            (self.z as f64 * grid_size as f64) as f32,
        )
    }

    /// Horizontal center of the cell (Y = 0)
    pub fn center(&self, grid_size: f32) -> Vec3 {
        self.origin(grid_size) + Vec3::new(grid_size * 0.5, 0.0, grid_size * 0.5)
    }

    /// Bounding box of the cell's full column between `bottom` and `top`
    pub fn footprint(&self, grid_size: f32, bottom: f32, top: f32) -> Aabb {
        let origin = self.origin(grid_size);
        Aabb::new(
            Vec3::new(origin.x, bottom, origin.z),
            Vec3::new(origin.x + grid_size, top, origin.z + grid_size),
        )
    }

    /// Distance on the XZ plane from `observer` to the cell center
    pub fn planar_distance(&self, observer: Vec3, grid_size: f32) -> f32 {
        let c = self.center(grid_size);
        let dx = observer.x - c.x;
        let dz = observer.z - c.z;
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

impl FromStr for CellCoord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(s)
    }
}

/// Cell containing `pos`
pub fn cell_of(pos: Vec3, grid_size: f32) -> CellCoord {
    CellCoord::from_world_pos(pos, grid_size)
}

/// Canonical key of `(cx, cz)`
pub fn key_of(x: i32, z: i32) -> String {
    CellCoord::new(x, z).key()
}

/// Every cell whose center lies within `radius` (planar) of `pos`,
/// nearest first. Ties keep grid order, so the result is stable.
pub fn cells_within(pos: Vec3, radius: f32, grid_size: f32) -> Vec<(CellCoord, f32)> {
    if !(radius.is_finite() && radius >= 0.0 && grid_size > 0.0) {
        return Vec::new();
    }
    let center = cell_of(pos, grid_size);
    let reach = (radius / grid_size).ceil() as i32 + 1;

    let mut cells = Vec::new();
    for dx in -reach..=reach {
        for dz in -reach..=reach {
            let cell = CellCoord::new(center.x.saturating_add(dx), center.z.saturating_add(dz));
            let distance = cell.planar_distance(pos, grid_size);
            if distance <= radius {
                cells.push((cell, distance));
            }
        }
    }
    cells.sort_by(|a, b| a.1.total_cmp(&b.1));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const GRID: f32 = 1000.0;

    #[test]
    fn test_cell_of_floor_division() {
        assert_eq!(cell_of(Vec3::new(0.0, 0.0, 0.0), GRID), CellCoord::new(0, 0));
        assert_eq!(cell_of(Vec3::new(999.9, 5.0, 0.1), GRID), CellCoord::new(0, 0));
        assert_eq!(cell_of(Vec3::new(1000.0, 0.0, 2500.0), GRID), CellCoord::new(1, 2));
        assert_eq!(cell_of(Vec3::new(-0.1, 0.0, -1000.0), GRID), CellCoord::new(-1, -1));
        assert_eq!(cell_of(Vec3::new(-1000.1, 0.0, 0.0), GRID), CellCoord::new(-2, 0));
    }

    #[test]
    fn test_y_is_not_partitioned() {
        let low = cell_of(Vec3::new(10.0, -1e6, 10.0), GRID);
        let high = cell_of(Vec3::new(10.0, 1e6, 10.0), GRID);
        assert_eq!(low, high);
    }

    #[test]
    fn test_grid_totality() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..2000 {
            let pos = Vec3::new(
                rng.random_range(-1e6..1e6),
                rng.random_range(-500.0..500.0),
                rng.random_range(-1e6..1e6),
            );
            let cell = cell_of(pos, GRID);
            let bounds = cell.footprint(GRID, -1000.0, 1000.0);
            assert!(bounds.contains_point(pos), "{pos:?} not in {cell} {bounds:?}");
        }
    }

    #[test]
    fn test_non_finite_positions_do_not_panic() {
        let _ = cell_of(Vec3::new(f32::NAN, 0.0, f32::INFINITY), GRID);
        let _ = cell_of(Vec3::new(f32::NEG_INFINITY, 0.0, 1e30), GRID);
    }

    #[test]
    fn test_key_roundtrip() {
        for (x, z) in [(0, 0), (2, 3), (-5, 17), (i32::MIN, i32::MAX)] {
            let cell = CellCoord::new(x, z);
            assert_eq!(CellCoord::from_key(&cell.key()).unwrap(), cell);
            assert_eq!(cell.key(), key_of(x, z));
            assert_eq!(cell.to_string(), cell.key());
        }
        assert_eq!("2,3".parse::<CellCoord>().unwrap(), CellCoord::new(2, 3));
    }

    #[test]
    fn test_malformed_keys_rejected() {
        for key in ["", "1", "1;2", "a,b", "1,2,3", "1.5,2"] {
            assert!(
                matches!(CellCoord::from_key(key), Err(Error::InvalidCellKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_center_and_distance() {
        let cell = CellCoord::new(1, -1);
        assert_eq!(cell.center(GRID), Vec3::new(1500.0, 0.0, -500.0));
        assert_eq!(cell.planar_distance(Vec3::new(1500.0, 300.0, -500.0), GRID), 0.0);
    }

    #[test]
    fn test_cells_within_sorted_and_bounded() {
        let cells = cells_within(Vec3::new(500.0, 0.0, 500.0), 2500.0, GRID);
        assert_eq!(cells[0], (CellCoord::new(0, 0), 0.0));
        for w in cells.windows(2) {
            assert!(w[0].1 <= w[1].1);
        }
        assert!(cells.iter().all(|(_, d)| *d <= 2500.0));
        // Square ring of radius 2 is fully covered
        assert!(cells.iter().any(|(c, _)| *c == CellCoord::new(2, 0)));
        assert!(!cells.iter().any(|(c, _)| *c == CellCoord::new(3, 0)));
    }

    #[test]
    fn test_cells_within_degenerate_radius() {
        assert!(cells_within(Vec3::ZERO, -1.0, GRID).is_empty());
        assert!(cells_within(Vec3::ZERO, f32::NAN, GRID).is_empty());
    }
}
