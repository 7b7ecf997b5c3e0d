//! Load queue ordered by distance from the observer

use std::collections::HashSet;

use crate::core::Vec3;
use crate::world::CellCoord;

/// A cell waiting to be dispatched
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueuedCell {
    pub cell: CellCoord,
    /// Planar distance from the observer when last prioritized
    pub distance: f32,
    /// Whether satellites and moons should be published on load
    pub load_detail: bool,
}

/// Nearest-first queue of cells, deduplicated by coordinate.
///
/// Cells at equal distance keep their insertion order.
#[derive(Debug, Default)]
pub struct LoadQueue {
    entries: Vec<QueuedCell>,
    members: HashSet<CellCoord>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Returns `false` if it is already queued.
    pub fn push(&mut self, entry: QueuedCell) -> bool {
        if !self.members.insert(entry.cell) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Stable sort, nearest first
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    /// Remove up to `max` of the nearest cells
    pub fn pop_batch(&mut self, max: usize) -> Vec<QueuedCell> {
        let n = max.min(self.entries.len());
        let batch: Vec<_> = self.entries.drain(..n).collect();
        for entry in &batch {
            self.members.remove(&entry.cell);
        }
        batch
    }

    /// Recompute distances and detail flags for a new observer position,
    /// drop entries farther than `drop_distance` and re-sort. Returns the
    /// dropped cells.
    pub fn reprioritize(
        &mut self,
        observer: Vec3,
        grid_size: f32,
        detail_distance: f32,
        drop_distance: f32,
    ) -> Vec<CellCoord> {
        let mut dropped = Vec::new();
        self.entries.retain_mut(|entry| {
            entry.distance = entry.cell.planar_distance(observer, grid_size);
            entry.load_detail = entry.distance < detail_distance;
            if entry.distance > drop_distance {
                dropped.push(entry.cell);
                false
            } else {
                true
            }
        });
        for cell in &dropped {
            self.members.remove(cell);
        }
        self.sort();
        dropped
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        self.members.contains(&cell)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
    }

    /// Queued entries in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &QueuedCell> {
        self.entries.iter()
    }
}
