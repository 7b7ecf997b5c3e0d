//! LRU cache for stored cells
//!
//! Keeps recently used cells in memory in front of slower gateway layers.
//! When the cache is full, the least recently used cell is evicted.

use std::collections::{BTreeMap, HashMap};

use crate::world::CellCoord;
use super::protocol::StoredCell;

struct Slot {
    cell: StoredCell,
    stamp: u64,
}

/// LRU cache for stored cells
///
/// Access order is tracked with a monotonically increasing stamp per entry;
/// `order` maps stamps back to coordinates so the oldest entry is found
/// without scanning.
pub struct CellCache {
    entries: HashMap<CellCoord, Slot>,
    /// Stamp -> coordinate, oldest first
    order: BTreeMap<u64, CellCoord>,
    next_stamp: u64,
    max_cells: usize,
}

impl CellCache {
    /// Create a cache holding at most `max_cells` cells (at least one)
    pub fn new(max_cells: usize) -> Self {
        let max_cells = max_cells.max(1);
        Self {
            entries: HashMap::with_capacity(max_cells),
            order: BTreeMap::new(),
            next_stamp: 0,
            max_cells,
        }
    }

    /// Get a cell, marking it as recently used
    pub fn get(&mut self, coord: CellCoord) -> Option<&StoredCell> {
        let stamp = self.bump();
        let slot = self.entries.get_mut(&coord)?;
        self.order.remove(&slot.stamp);
        slot.stamp = stamp;
        self.order.insert(stamp, coord);
        Some(&slot.cell)
    }

    /// Insert or replace a cell.
    ///
    /// Returns the cell evicted to make room, if any.
    pub fn insert(&mut self, coord: CellCoord, cell: StoredCell) -> Option<(CellCoord, StoredCell)> {
        let stamp = self.bump();
        if let Some(slot) = self.entries.get_mut(&coord) {
            self.order.remove(&slot.stamp);
            slot.stamp = stamp;
            slot.cell = cell;
            self.order.insert(stamp, coord);
            return None;
        }

        let evicted = if self.entries.len() >= self.max_cells {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.insert(coord, Slot { cell, stamp });
        self.order.insert(stamp, coord);
        evicted
    }

    /// Remove a cell
    pub fn remove(&mut self, coord: CellCoord) -> Option<StoredCell> {
        let slot = self.entries.remove(&coord)?;
        self.order.remove(&slot.stamp);
        Some(slot.cell)
    }

    /// Evict the least recently used cell
    pub fn evict_oldest(&mut self) -> Option<(CellCoord, StoredCell)> {
        let (_, coord) = self.order.pop_first()?;
        let slot = self.entries.remove(&coord)?;
        Some((coord, slot.cell))
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        self.entries.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_cells
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Cached coordinates, least recently used first
    pub fn coords(&self) -> impl Iterator<Item = &CellCoord> {
        self.order.values()
    }

    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }
}
