//! Streaming scheduler: decides which cells to load, demote, promote and evict.
//!
//! Runs serially on the caller's loop. Every call to [`StreamingScheduler::update`]
//! drains finished loads; the scheduling pass itself is throttled to
//! `tick_interval` and only recomputes candidates when the observer changed
//! cell or the loaded set changed.
//!
//! Each cell is in at most one [`CellState`], held in a single map. Cells not
//! in the map are absent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::core::{EngineConfig, Result, StreamConfig, Vec3};
use crate::generation::CellGenerator;
use crate::math::Frustum;
use crate::persist::PersistenceGateway;
use crate::spatial::Bvh;
use crate::world::{
    cell_of, cells_within, Category, CellContents, CellCoord, WorldReader, WorldSnapshot,
    WorldState, WorldWriter,
};

use super::cell_loader::{CellLoader, LoadBackend, LoadOutcome, LoadSource};
use super::priority::{LoadQueue, QueuedCell};

/// Lifecycle state of a cell known to the scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
    /// Waiting in the load queue
    Queued,
    /// Dispatched to the loader
    Loading { detail: bool },
    /// Resident; `detail` says whether satellites and moons are published
    Loaded { detail: bool },
}

/// What one call to `update` did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The throttled scheduling pass ran
    pub ran_pass: bool,
    /// Eviction and candidate enumeration ran
    pub recomputed: bool,
    pub completed: usize,
    pub failed: usize,
    pub enqueued: usize,
    pub dropped: usize,
    pub dispatched: usize,
    pub evicted: usize,
    pub demoted: usize,
    pub promoted: usize,
    pub bvh_rebuilt: bool,
    /// World version after the last publish of this update, if any
    pub published: Option<u64>,
}

/// Cumulative streaming counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub updates: u64,
    pub passes: u64,
    pub recomputes: u64,
    pub completed: u64,
    pub failed: u64,
    pub fetched: u64,
    pub generated: u64,
    pub dispatched: u64,
    pub evicted: u64,
    pub demoted: u64,
    pub promoted: u64,
    pub dropped: u64,
    pub bvh_rebuilds: u64,
    pub publishes: u64,
}

impl StreamStats {
    fn record(&mut self, report: &TickReport) {
        self.updates += 1;
        self.passes += report.ran_pass as u64;
        self.recomputes += report.recomputed as u64;
        self.completed += report.completed as u64;
        self.failed += report.failed as u64;
        self.dispatched += report.dispatched as u64;
        self.evicted += report.evicted as u64;
        self.demoted += report.demoted as u64;
        self.promoted += report.promoted as u64;
        self.dropped += report.dropped as u64;
    }
}

/// Serial owner of the cell-state map, load queue, BVH and world state
pub struct StreamingScheduler<L: LoadBackend = CellLoader> {
    config: StreamConfig,
    loader: L,
    states: HashMap<CellCoord, CellState>,
    /// Full contents of every loaded cell, kept for promotion
    resident: HashMap<CellCoord, CellContents>,
    queue: LoadQueue,
    bvh: Bvh,
    world: WorldState,
    last_pass: Option<Instant>,
    last_cell: Option<CellCoord>,
    dirty: bool,
    stats: StreamStats,
}

impl StreamingScheduler<CellLoader> {
    /// Scheduler backed by a [`CellLoader`] on its own runtime
    pub fn with_gateway(config: &EngineConfig, gateway: Arc<dyn PersistenceGateway>) -> Result<Self> {
        config.validate()?;
        let generator = CellGenerator::new(config.generator.clone(), config.stream.grid_size);
        let loader = CellLoader::new(gateway, generator, config.stream.max_concurrent_batches)?;
        Self::new(config.stream.clone(), loader)
    }
}

impl<L: LoadBackend> StreamingScheduler<L> {
    pub fn new(config: StreamConfig, loader: L) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loader,
            states: HashMap::new(),
            resident: HashMap::new(),
            queue: LoadQueue::new(),
            bvh: Bvh::empty(),
            world: WorldState::new(),
            last_pass: None,
            last_cell: None,
            dirty: true,
            stats: StreamStats::default(),
        })
    }

    /// Run one frame of streaming for an observer at `observer`.
    pub fn update(&mut self, observer: Vec3, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        self.apply_completions(&mut report);

        let throttled = self
            .last_pass
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.tick_interval);
        if !throttled {
            self.last_pass = Some(now);
            report.ran_pass = true;

            let cell = cell_of(observer, self.config.grid_size);
            if self.dirty || self.last_cell != Some(cell) {
                report.recomputed = true;
                self.evict_and_promote(observer, &mut report);
                self.enqueue_candidates(observer, &mut report);
                self.last_cell = Some(cell);
                self.dirty = false;
            }
            self.dispatch(&mut report);

            log::trace!(
                "Pass at cell {cell}: {} loaded, {} loading, {} queued ({report:?})",
                self.count(|s| matches!(s, CellState::Loaded { .. })),
                self.count(|s| matches!(s, CellState::Loading { .. })),
                self.queue.len()
            );
        }

        if report.bvh_rebuilt {
            self.stats.bvh_rebuilds += 1;
        }
        self.stats.record(&report);
        report
    }

    /// Drain the loader and apply every outcome in one write session.
    fn apply_completions(&mut self, report: &mut TickReport) {
        let outcomes = self.loader.poll();
        if outcomes.is_empty() {
            return;
        }

        let mut writer = self.world.begin_write();
        let mut loaded_set_changed = false;
        for outcome in outcomes {
            match outcome {
                LoadOutcome::Loaded { cell, contents, source, dropped } => {
                    let Some(CellState::Loading { detail }) = self.states.get(&cell).copied() else {
                        log::warn!("Ignoring completion for cell {cell}: not loading");
                        continue;
                    };
                    if dropped > 0 {
                        log::warn!("Cell {cell}: skipped {dropped} malformed stored entities");
                    }
                    match source {
                        LoadSource::Fetched => self.stats.fetched += 1,
                        LoadSource::Generated => self.stats.generated += 1,
                    }
                    publish_cell(&mut writer, &contents, detail);
                    self.resident.insert(cell, contents);
                    self.states.insert(cell, CellState::Loaded { detail });
                    loaded_set_changed = true;
                    report.completed += 1;
                }
                LoadOutcome::Failed { cell, error } => {
                    if matches!(self.states.get(&cell), Some(CellState::Loading { .. })) {
                        log::error!("Loading cell {cell} failed: {error}");
                        self.states.remove(&cell);
                        self.dirty = true;
                        report.failed += 1;
                    } else {
                        log::warn!("Ignoring failure for cell {cell}: not loading ({error})");
                    }
                }
            }
        }

        if let Some(version) = writer.publish() {
            report.published = Some(version);
            self.stats.publishes += 1;
        }
        if loaded_set_changed {
            self.rebuild_bvh(report);
        }
    }

    /// Evict far cells, demote cells past the detail hysteresis band and
    /// promote near cells whose detail is not yet published.
    fn evict_and_promote(&mut self, observer: Vec3, report: &mut TickReport) {
        let grid = self.config.grid_size;
        let loaded: Vec<(CellCoord, bool)> = self
            .states
            .iter()
            .filter_map(|(cell, state)| match state {
                CellState::Loaded { detail } => Some((*cell, *detail)),
                _ => None,
            })
            .collect();

        let mut writer = self.world.begin_write();
        for (cell, detail) in loaded {
            let distance = cell.planar_distance(observer, grid);
            if distance > self.config.unload_distance {
                writer.remove_cell(cell);
                self.states.remove(&cell);
                self.resident.remove(&cell);
                report.evicted += 1;
                log::debug!("Evicted cell {cell} at distance {distance:.0}");
            } else if detail && distance > self.config.unload_detail_distance {
                writer.remove_cell_detail(cell);
                self.states.insert(cell, CellState::Loaded { detail: false });
                report.demoted += 1;
            }
        }

        for cell in self.bvh.query_radius(observer, self.config.detail_distance) {
            if self.states.get(&cell) != Some(&CellState::Loaded { detail: false }) {
                continue;
            }
            if cell.planar_distance(observer, grid) >= self.config.detail_distance {
                continue;
            }
            if let Some(contents) = self.resident.get(&cell) {
                publish_detail(&mut writer, contents);
                self.states.insert(cell, CellState::Loaded { detail: true });
                report.promoted += 1;
            }
        }

        if let Some(version) = writer.publish() {
            report.published = Some(version);
            self.stats.publishes += 1;
        }
        if report.evicted > 0 {
            self.rebuild_bvh(report);
        }
    }

    /// Queue every absent cell within `load_distance`, then drop queued
    /// cells that fell beyond `unload_distance`.
    fn enqueue_candidates(&mut self, observer: Vec3, report: &mut TickReport) {
        let grid = self.config.grid_size;
        for (cell, distance) in cells_within(observer, self.config.load_distance, grid) {
            if self.states.contains_key(&cell) {
                continue;
            }
            let entry = QueuedCell {
                cell,
                distance,
                load_detail: distance < self.config.detail_distance,
            };
            if self.queue.push(entry) {
                self.states.insert(cell, CellState::Queued);
                report.enqueued += 1;
            }
        }

        let dropped = self.queue.reprioritize(
            observer,
            grid,
            self.config.detail_distance,
            self.config.unload_distance,
        );
        for cell in &dropped {
            debug_assert_eq!(self.states.get(cell), Some(&CellState::Queued));
            self.states.remove(cell);
        }
        report.dropped = dropped.len();
    }

    /// Hand the nearest queued cells to the loader.
    fn dispatch(&mut self, report: &mut TickReport) {
        let capacity = self.config.batch_size * self.config.max_concurrent_batches;
        if self.queue.is_empty() || self.loader.in_flight() >= capacity {
            return;
        }

        let batch = self.queue.pop_batch(self.config.batch_size);
        let mut cells = Vec::with_capacity(batch.len());
        for entry in batch {
            debug_assert_eq!(
                self.states.get(&entry.cell),
                Some(&CellState::Queued),
                "cell {} dispatched twice",
                entry.cell
            );
            self.states
                .insert(entry.cell, CellState::Loading { detail: entry.load_detail });
            cells.push(entry.cell);
        }

        let requested = cells.len();
        let accepted = self.loader.dispatch(cells);
        debug_assert_eq!(accepted, requested, "loader rejected cells already in flight");
        report.dispatched = requested;
        log::debug!("Dispatched {requested} cells ({} still queued)", self.queue.len());
    }

    fn rebuild_bvh(&mut self, report: &mut TickReport) {
        let loaded: Vec<CellCoord> = self.resident.keys().copied().collect();
        self.bvh = Bvh::build(
            &loaded,
            self.config.grid_size,
            self.config.column_bottom,
            self.config.column_top,
            self.config.split_policy(),
        );
        self.dirty = true;
        report.bvh_rebuilt = true;
    }

    /// Remove a loaded cell and its entities immediately. Returns `false`
    /// if the cell was not loaded.
    pub fn unload(&mut self, cell: CellCoord) -> bool {
        if !matches!(self.states.get(&cell), Some(CellState::Loaded { .. })) {
            return false;
        }
        let mut writer = self.world.begin_write();
        writer.remove_cell(cell);
        if writer.publish().is_some() {
            self.stats.publishes += 1;
        }
        self.states.remove(&cell);
        self.resident.remove(&cell);

        let mut report = TickReport::default();
        self.rebuild_bvh(&mut report);
        self.stats.bvh_rebuilds += 1;
        self.stats.evicted += 1;
        log::debug!("Unloaded cell {cell}");
        true
    }

    pub fn state(&self, cell: CellCoord) -> Option<CellState> {
        self.states.get(&cell).copied()
    }

    fn cells_in(&self, pred: impl Fn(&CellState) -> bool) -> Vec<CellCoord> {
        let mut cells: Vec<_> = self
            .states
            .iter()
            .filter(|(_, s)| pred(s))
            .map(|(c, _)| *c)
            .collect();
        cells.sort_unstable();
        cells
    }

    fn count(&self, pred: impl Fn(&CellState) -> bool) -> usize {
        self.states.values().filter(|s| pred(s)).count()
    }

    /// Loaded cells, sorted
    pub fn loaded_cells(&self) -> Vec<CellCoord> {
        self.cells_in(|s| matches!(s, CellState::Loaded { .. }))
    }

    /// Cells dispatched to the loader, sorted
    pub fn loading_cells(&self) -> Vec<CellCoord> {
        self.cells_in(|s| matches!(s, CellState::Loading { .. }))
    }

    /// Queued cells in dispatch order
    pub fn queued_cells(&self) -> Vec<CellCoord> {
        self.queue.iter().map(|e| e.cell).collect()
    }

    /// Cached contents of a loaded cell
    pub fn contents(&self, cell: CellCoord) -> Option<&CellContents> {
        self.resident.get(&cell)
    }

    /// Loaded cells intersecting the column of half-width `radius` around `center`
    pub fn cells_near(&self, center: Vec3, radius: f32) -> Vec<CellCoord> {
        self.bvh.query_radius(center, radius)
    }

    /// Loaded cells whose footprint touches `frustum`
    pub fn visible_cells(&self, frustum: &Frustum) -> Vec<CellCoord> {
        self.bvh.query_frustum(frustum)
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// Handle for the renderer
    pub fn reader(&self) -> WorldReader {
        self.world.reader()
    }

    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.world.snapshot()
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }
}

fn publish_cell(writer: &mut WorldWriter<'_>, contents: &CellContents, detail: bool) {
    for category in Category::ALL {
        if category.is_detail() && !detail {
            continue;
        }
        let entities = contents.entities(category);
        if !entities.is_empty() {
            writer.extend(category, entities.iter().cloned());
        }
    }
}

fn publish_detail(writer: &mut WorldWriter<'_>, contents: &CellContents) {
    for category in Category::ALL.into_iter().filter(|c| c.is_detail()) {
        let entities = contents.entities(category);
        if !entities.is_empty() {
            writer.extend(category, entities.iter().cloned());
        }
    }
}
