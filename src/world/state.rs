//! Double-buffered world state shared between the scheduler and the renderer.
//!
//! Two snapshot slots and an active index. Readers only ever look at
//! `buffers[active]`; a write session copies the active snapshot, applies its
//! changes, stores the result into the inactive slot and then flips the index
//! with a single atomic store. The inactive slot is always overwritten whole,
//! never patched, so a reader can never observe half of a write session.
//!
//! Snapshots are immutable once published. Categories are held behind their
//! own `Arc`, so a write session only copies the categories it touches.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::entity::{Category, Entity, CATEGORY_COUNT};
use super::grid::CellCoord;

/// One published, immutable view of every category
#[derive(Clone, Debug, Default)]
pub struct WorldSnapshot {
    version: u64,
    categories: [Arc<Vec<Entity>>; CATEGORY_COUNT],
}

impl WorldSnapshot {
    /// Swap counter at the time this snapshot was published
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entities(&self, category: Category) -> &[Entity] {
        &self.categories[category.index()]
    }

    /// Iterate `(category, entities)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[Entity])> {
        Category::ALL.into_iter().map(|c| (c, self.entities(c)))
    }

    pub fn total_entities(&self) -> usize {
        self.categories.iter().map(|v| v.len()).sum()
    }
}

struct Shared {
    buffers: [RwLock<Arc<WorldSnapshot>>; 2],
    active: AtomicUsize,
    version: AtomicU64,
}

impl Shared {
    fn load(&self) -> Arc<WorldSnapshot> {
        let index = self.active.load(Ordering::Acquire);
        let slot = self.buffers[index]
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }
}

/// Owner of the world state; the only way to publish changes.
///
/// Not `Clone`: there is exactly one writer. Hand out [`WorldReader`]s to
/// consumers.
pub struct WorldState {
    shared: Arc<Shared>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    pub fn new() -> Self {
        let empty = Arc::new(WorldSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                buffers: [RwLock::new(Arc::clone(&empty)), RwLock::new(empty)],
                active: AtomicUsize::new(0),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Read-only handle for the renderer
    pub fn reader(&self) -> WorldReader {
        WorldReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Currently active snapshot
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.shared.load()
    }

    /// Number of swaps so far
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    /// Index of the active buffer (0 or 1)
    pub fn active_buffer(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Start a write session seeded from the active snapshot.
    pub fn begin_write(&mut self) -> WorldWriter<'_> {
        let base = self.shared.load();
        WorldWriter {
            state: self,
            categories: base.categories.clone(),
            changed: false,
        }
    }
}

/// Pending changes to the world; nothing is visible until [`publish`](Self::publish).
pub struct WorldWriter<'a> {
    state: &'a mut WorldState,
    categories: [Arc<Vec<Entity>>; CATEGORY_COUNT],
    changed: bool,
}

impl WorldWriter<'_> {
    /// Apply `f` to one category's entity list
    pub fn update_category<F>(&mut self, category: Category, f: F)
    where
        F: FnOnce(&mut Vec<Entity>),
    {
        f(Arc::make_mut(&mut self.categories[category.index()]));
        self.changed = true;
    }

    /// Append entities to a category
    pub fn extend(&mut self, category: Category, entities: impl IntoIterator<Item = Entity>) {
        self.update_category(category, |list| list.extend(entities));
    }

    /// Remove every entity of `cell` from every category
    pub fn remove_cell(&mut self, cell: CellCoord) {
        for category in Category::ALL {
            self.remove_cell_in(category, cell);
        }
    }

    /// Remove only the satellites and moons of `cell`
    pub fn remove_cell_detail(&mut self, cell: CellCoord) {
        for category in Category::ALL.into_iter().filter(|c| c.is_detail()) {
            self.remove_cell_in(category, cell);
        }
    }

    fn remove_cell_in(&mut self, category: Category, cell: CellCoord) {
        let list = &self.categories[category.index()];
        if list.iter().any(|e| e.cell == cell) {
            self.update_category(category, |list| list.retain(|e| e.cell != cell));
        }
    }

    /// Whether any category was touched in this session
    pub fn has_changes(&self) -> bool {
        self.changed
    }

    /// Write into the inactive buffer and flip. Returns the new version, or
    /// `None` when the session made no changes (no swap happens).
    pub fn publish(self) -> Option<u64> {
        if !self.changed {
            return None;
        }
        let shared = &self.state.shared;
        let version = shared.version.load(Ordering::Relaxed) + 1;
        let snapshot = Arc::new(WorldSnapshot {
            version,
            categories: self.categories,
        });

        let inactive = 1 - shared.active.load(Ordering::Relaxed);
        {
            let mut slot = shared.buffers[inactive]
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *slot = snapshot;
        }
        shared.active.store(inactive, Ordering::Release);
        shared.version.store(version, Ordering::Release);
        Some(version)
    }
}

/// Cloneable read-only handle to the world state
#[derive(Clone)]
pub struct WorldReader {
    shared: Arc<Shared>,
}

impl WorldReader {
    /// Currently active snapshot
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.shared.load()
    }

    /// Swap counter; changes whenever a new snapshot is published
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Vec3;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn entity(category: Category, cell: CellCoord) -> Entity {
        Entity::new(Vec3::ZERO, category, cell)
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = WorldState::new();
        let snap = state.snapshot();
        assert_eq!(snap.version(), 0);
        assert_eq!(snap.total_entities(), 0);
        assert_eq!(state.active_buffer(), 0);
    }

    #[test]
    fn test_publish_flips_buffer() {
        let mut state = WorldState::new();
        let cell = CellCoord::new(0, 0);

        let mut w = state.begin_write();
        w.extend(Category::Star, [entity(Category::Star, cell)]);
        assert_eq!(w.publish(), Some(1));
        assert_eq!(state.active_buffer(), 1);
        assert_eq!(state.snapshot().entities(Category::Star).len(), 1);

        let mut w = state.begin_write();
        w.extend(Category::GasGiant, [entity(Category::GasGiant, cell)]);
        w.publish();
        assert_eq!(state.active_buffer(), 0);
        let snap = state.snapshot();
        assert_eq!(snap.version(), 2);
        // The second session started from the first, not from the stale slot
        assert_eq!(snap.entities(Category::Star).len(), 1);
        assert_eq!(snap.entities(Category::GasGiant).len(), 1);
    }

    #[test]
    fn test_unpublished_changes_invisible() {
        let mut state = WorldState::new();
        let reader = state.reader();
        let mut w = state.begin_write();
        w.extend(Category::Star, [entity(Category::Star, CellCoord::new(1, 1))]);
        drop(w);
        assert_eq!(reader.snapshot().total_entities(), 0);
        assert_eq!(reader.version(), 0);
    }

    #[test]
    fn test_empty_session_does_not_swap() {
        let mut state = WorldState::new();
        let w = state.begin_write();
        assert!(!w.has_changes());
        assert_eq!(w.publish(), None);
        assert_eq!(state.version(), 0);
        assert_eq!(state.active_buffer(), 0);
    }

    #[test]
    fn test_remove_cell_and_detail() {
        let mut state = WorldState::new();
        let a = CellCoord::new(0, 0);
        let b = CellCoord::new(1, 0);

        let mut w = state.begin_write();
        for cell in [a, b] {
            for c in Category::ALL {
                w.extend(c, [entity(c, cell)]);
            }
        }
        w.publish();

        let mut w = state.begin_write();
        w.remove_cell_detail(a);
        w.publish();
        let snap = state.snapshot();
        assert_eq!(snap.entities(Category::Star).len(), 2);
        assert_eq!(snap.entities(Category::RockyMoon).len(), 1);
        assert!(snap.entities(Category::RockyMoon).iter().all(|e| e.cell == b));

        let mut w = state.begin_write();
        w.remove_cell(b);
        w.publish();
        let snap = state.snapshot();
        assert_eq!(snap.total_entities(), 1);
        assert_eq!(snap.entities(Category::Star)[0].cell, a);
    }

    #[test]
    fn test_old_snapshot_stays_valid() {
        let mut state = WorldState::new();
        let cell = CellCoord::new(3, 4);
        let mut w = state.begin_write();
        w.extend(Category::Star, [entity(Category::Star, cell)]);
        w.publish();

        let held = state.snapshot();
        let mut w = state.begin_write();
        w.remove_cell(cell);
        w.publish();

        assert_eq!(held.entities(Category::Star).len(), 1);
        assert_eq!(state.snapshot().entities(Category::Star).len(), 0);
    }

    #[test]
    fn test_readers_never_see_mixed_categories() {
        // Every session writes the same count into every category; a torn
        // read would show differing lengths.
        let mut state = WorldState::new();
        let reader = state.reader();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reader = reader.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let snap = reader.snapshot();
                        let n = snap.entities(Category::Star).len();
                        for (_, list) in snap.iter() {
                            assert_eq!(list.len(), n, "torn snapshot at v{}", snap.version());
                        }
                        assert_eq!(n as u64, snap.version());
                    }
                })
            })
            .collect();

        for i in 0..500 {
            let cell = CellCoord::new(i, 0);
            let mut w = state.begin_write();
            for c in Category::ALL {
                w.extend(c, [entity(c, cell)]);
            }
            w.publish();
        }
        done.store(true, Ordering::Release);

        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(state.version(), 500);
    }
}
