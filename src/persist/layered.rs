//! Cache-then-store gateway: memory LRU, optional disk, optional durable backend.
//!
//! A fetch walks the layers top-down and back-fills the faster layers with
//! whatever a slower layer returns. Saves write through every layer. Disk and
//! durable failures during a fetch are logged and count as misses.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::world::CellCoord;
use super::cache::CellCache;
use super::disk::DiskGateway;
use super::gateway::{FetchResult, GatewayError, PersistenceGateway};
use super::protocol::StoredCell;

/// Default number of cells kept in the memory layer
pub const DEFAULT_CACHE_CELLS: usize = 512;

pub struct LayeredGateway {
    memory: Mutex<CellCache>,
    disk: Option<DiskGateway>,
    durable: Option<Box<dyn PersistenceGateway>>,
}

impl LayeredGateway {
    /// Memory layer only
    pub fn new(cache_cells: usize) -> Self {
        Self {
            memory: Mutex::new(CellCache::new(cache_cells)),
            disk: None,
            durable: None,
        }
    }

    pub fn with_disk(mut self, disk: DiskGateway) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn with_durable(mut self, durable: impl PersistenceGateway + 'static) -> Self {
        self.durable = Some(Box::new(durable));
        self
    }

    /// Number of cells currently in the memory layer
    pub fn cached_cells(&self) -> usize {
        self.memory().len()
    }

    fn memory(&self) -> MutexGuard<'_, CellCache> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, cell: CellCoord, stored: &StoredCell) {
        self.memory().insert(cell, stored.clone());
    }
}

impl PersistenceGateway for LayeredGateway {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        let mut result = FetchResult::with_capacity(cells.len());
        let mut misses = Vec::new();

        {
            let mut memory = self.memory();
            for &cell in cells {
                match memory.get(cell) {
                    Some(stored) => {
                        result.insert(cell, Some(stored.clone()));
                    }
                    None => misses.push(cell),
                }
            }
        }

        if let Some(disk) = &self.disk {
            let mut still_missing = Vec::new();
            for cell in misses {
                match disk.load(cell) {
                    Ok(Some(stored)) => {
                        self.remember(cell, &stored);
                        result.insert(cell, Some(stored));
                    }
                    Ok(None) => still_missing.push(cell),
                    Err(e) => {
                        log::warn!("Disk layer failed for cell {cell}: {e}");
                        still_missing.push(cell);
                    }
                }
            }
            misses = still_missing;
        }

        if let Some(durable) = &self.durable {
            if !misses.is_empty() {
                match durable.fetch_batch(&misses) {
                    Ok(fetched) => {
                        for (cell, stored) in fetched {
                            if let Some(stored) = &stored {
                                if let Some(disk) = &self.disk {
                                    if let Err(e) = disk.save(cell, stored) {
                                        log::warn!("Disk back-fill failed for cell {cell}: {e}");
                                    }
                                }
                                self.remember(cell, stored);
                            }
                            result.insert(cell, stored);
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "{} layer fetch of {} cells failed, treating as misses: {e}",
                            durable.name(),
                            misses.len()
                        );
                    }
                }
            }
        }

        for cell in misses {
            result.entry(cell).or_insert(None);
        }
        Ok(result)
    }

    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError> {
        self.remember(cell, stored);

        let mut first_error = None;
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.save(cell, stored) {
                log::warn!("Disk save failed for cell {cell}: {e}");
                first_error.get_or_insert(e);
            }
        }
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.save(cell, stored) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        self.memory().clear();
        if let Some(disk) = &self.disk {
            disk.delete_all()?;
        }
        if let Some(durable) = &self.durable {
            durable.delete_all()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "layered"
    }
}
