//! In-process gateway backed by a hash map

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::world::CellCoord;
use super::gateway::{FetchResult, GatewayError, PersistenceGateway};
use super::protocol::StoredCell;

/// Unbounded in-memory store. Counts calls, which makes it useful for
/// checking how often the engine reaches persistence.
#[derive(Default)]
pub struct MemoryGateway {
    cells: Mutex<HashMap<CellCoord, StoredCell>>,
    fetch_calls: AtomicUsize,
    fetched_cells: AtomicUsize,
    save_calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cell directly, without counting a save
    pub fn insert(&self, cell: CellCoord, stored: StoredCell) {
        self.lock().insert(cell, stored);
    }

    pub fn get(&self, cell: CellCoord) -> Option<StoredCell> {
        self.lock().get(&cell).cloned()
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        self.lock().contains_key(&cell)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of `fetch_batch` calls
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    /// Total cells requested across all fetches
    pub fn fetched_cells(&self) -> usize {
        self.fetched_cells.load(Ordering::Relaxed)
    }

    /// Number of `save` calls
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CellCoord, StoredCell>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistenceGateway for MemoryGateway {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        self.fetched_cells.fetch_add(cells.len(), Ordering::Relaxed);
        let map = self.lock();
        Ok(cells.iter().map(|c| (*c, map.get(c).cloned())).collect())
    }

    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError> {
        self.save_calls.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(cell, stored.clone());
        Ok(())
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        self.lock().clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
