//! Async cell loading with bounded concurrency.
//!
//! Batches of cells are sent to a worker task on a tokio runtime. Each batch
//! makes one gateway fetch, generates whatever missed, and reports one
//! outcome per cell back over a channel. Gateway I/O and generation run on
//! the blocking pool; saves of freshly generated cells are spawned and not
//! awaited.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::core::Result;
use crate::generation::CellGenerator;
use crate::persist::{PersistenceGateway, StoredCell};
use crate::world::{CellContents, CellCoord};

/// Where a loaded cell came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// Returned by the persistence gateway
    Fetched,
    /// Generated after a gateway miss
    Generated,
}

/// Result of loading one cell
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded {
        cell: CellCoord,
        contents: CellContents,
        source: LoadSource,
        /// Malformed persisted entries skipped while decoding
        dropped: usize,
    },
    Failed {
        cell: CellCoord,
        error: String,
    },
}

impl LoadOutcome {
    pub fn cell(&self) -> CellCoord {
        match self {
            LoadOutcome::Loaded { cell, .. } | LoadOutcome::Failed { cell, .. } => *cell,
        }
    }
}

/// Anything that can take load batches and report outcomes without blocking
pub trait LoadBackend {
    /// Start loading `cells`. Returns how many were accepted; cells already
    /// in flight are rejected.
    fn dispatch(&mut self, cells: Vec<CellCoord>) -> usize;

    /// Drain finished outcomes (non-blocking)
    fn poll(&mut self) -> Vec<LoadOutcome>;

    /// Number of cells in flight
    fn in_flight(&self) -> usize;
}

/// Concurrent cell loader
pub struct CellLoader {
    /// Channel for sending batches to the worker task
    request_tx: mpsc::UnboundedSender<Vec<CellCoord>>,
    /// Channel for receiving outcomes
    result_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    /// Cells currently being loaded
    pending: HashSet<CellCoord>,
    /// Outcomes produced locally (worker gone) waiting for the next poll
    local_failures: Vec<LoadOutcome>,
    /// Dedicated runtime; `None` when running on the caller's runtime
    _runtime: Option<Runtime>,
}

impl CellLoader {
    /// Create a loader with its own tokio runtime
    ///
    /// # Arguments
    /// * `gateway` - Persistence consulted before generating
    /// * `generator` - Generator used on a miss
    /// * `max_concurrent` - Maximum batches in flight
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        generator: CellGenerator,
        max_concurrent: usize,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("orrery-loader")
            .enable_all()
            .build()?;
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        runtime.spawn(Self::worker_loop(gateway, generator, max_concurrent, request_rx, result_tx));

        Ok(Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            local_failures: Vec::new(),
            _runtime: Some(runtime),
        })
    }

    /// Create a loader on the current tokio runtime
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn new_with_current_runtime(
        gateway: Arc<dyn PersistenceGateway>,
        generator: CellGenerator,
        max_concurrent: usize,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::worker_loop(gateway, generator, max_concurrent, request_rx, result_tx));

        Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            local_failures: Vec::new(),
            _runtime: None,
        }
    }

    /// Worker loop that runs batches with concurrency control
    async fn worker_loop(
        gateway: Arc<dyn PersistenceGateway>,
        generator: CellGenerator,
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<Vec<CellCoord>>,
        result_tx: mpsc::UnboundedSender<LoadOutcome>,
    ) {
        let max_concurrent = max_concurrent.max(1);
        let mut active = JoinSet::new();
        // FIFO: the scheduler already dispatches nearest cells first
        let mut waiting: std::collections::VecDeque<Vec<CellCoord>> = Default::default();

        loop {
            tokio::select! {
                Some(batch) = request_rx.recv() => {
                    waiting.push_back(batch);
                }

                Some(joined) = active.join_next(), if !active.is_empty() => {
                    match joined {
                        Ok(outcomes) => {
                            for outcome in outcomes {
                                // Receiver gone means the loader was dropped
                                let _ = result_tx.send(outcome);
                            }
                        }
                        Err(e) => log::error!("Cell loader task failed: {e}"),
                    }
                }

                else => break,
            }

            while active.len() < max_concurrent {
                let Some(batch) = waiting.pop_front() else { break };
                let gateway = Arc::clone(&gateway);
                let generator = generator.clone();
                active.spawn(Self::load_batch_task(gateway, generator, batch));
            }
        }
        log::debug!("Cell loader worker stopped");
    }

    /// Load one batch on the blocking pool and spawn saves for generated cells
    async fn load_batch_task(
        gateway: Arc<dyn PersistenceGateway>,
        generator: CellGenerator,
        batch: Vec<CellCoord>,
    ) -> Vec<LoadOutcome> {
        let cells = batch.clone();
        let worker_gateway = Arc::clone(&gateway);
        let joined = tokio::task::spawn_blocking(move || {
            load_batch(worker_gateway.as_ref(), &generator, &batch)
        })
        .await;

        match joined {
            Ok((outcomes, saves)) => {
                for (cell, stored) in saves {
                    let gateway = Arc::clone(&gateway);
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = gateway.save(cell, &stored) {
                            log::warn!("Saving cell {cell} to {} failed: {e}", gateway.name());
                        }
                    });
                }
                outcomes
            }
            Err(e) => {
                let error = format!("load task failed: {e}");
                cells
                    .into_iter()
                    .map(|cell| LoadOutcome::Failed { cell, error: error.clone() })
                    .collect()
            }
        }
    }

    /// Request a batch of cells
    ///
    /// Cells already pending are skipped. Returns the number of cells accepted.
    pub fn request_batch(&mut self, cells: Vec<CellCoord>) -> usize {
        let accepted: Vec<_> = cells
            .into_iter()
            .filter(|c| self.pending.insert(*c))
            .collect();
        if accepted.is_empty() {
            return 0;
        }
        let count = accepted.len();

        if let Err(mpsc::error::SendError(batch)) = self.request_tx.send(accepted) {
            log::error!("Cell loader worker is gone; failing {} cells", batch.len());
            self.local_failures.extend(batch.into_iter().map(|cell| LoadOutcome::Failed {
                cell,
                error: "loader worker stopped".to_string(),
            }));
        }
        count
    }

    /// Poll for finished loads (non-blocking)
    pub fn poll_results(&mut self) -> Vec<LoadOutcome> {
        let mut results = std::mem::take(&mut self.local_failures);
        while let Ok(outcome) = self.result_rx.try_recv() {
            results.push(outcome);
        }
        for outcome in &results {
            self.pending.remove(&outcome.cell());
        }
        results
    }

    /// Get the number of pending cells
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a specific cell is currently pending
    pub fn is_pending(&self, cell: CellCoord) -> bool {
        self.pending.contains(&cell)
    }
}

impl LoadBackend for CellLoader {
    fn dispatch(&mut self, cells: Vec<CellCoord>) -> usize {
        self.request_batch(cells)
    }

    fn poll(&mut self) -> Vec<LoadOutcome> {
        self.poll_results()
    }

    fn in_flight(&self) -> usize {
        self.pending_count()
    }
}

/// Fetch a batch once, generate the misses. Returns the outcomes and the
/// generated cells that should be saved.
pub fn load_batch(
    gateway: &dyn PersistenceGateway,
    generator: &CellGenerator,
    cells: &[CellCoord],
) -> (Vec<LoadOutcome>, Vec<(CellCoord, StoredCell)>) {
    let fetched = match gateway.fetch_batch(cells) {
        Ok(fetched) => fetched,
        Err(e) => {
            log::warn!(
                "Fetch of {} cells from {} failed, generating instead: {e}",
                cells.len(),
                gateway.name()
            );
            Default::default()
        }
    };

    let mut outcomes = Vec::with_capacity(cells.len());
    let mut saves = Vec::new();
    for &cell in cells {
        match fetched.get(&cell).and_then(Option::as_ref) {
            Some(stored) => {
                let (contents, dropped) = stored.to_contents(cell);
                outcomes.push(LoadOutcome::Loaded {
                    cell,
                    contents,
                    source: LoadSource::Fetched,
                    dropped,
                });
            }
            None => {
                let contents: CellContents = generator.generate(cell);
                match StoredCell::from_contents(&contents) {
                    Ok(stored) => saves.push((cell, stored)),
                    Err(e) => log::warn!("Cell {cell} could not be encoded for saving: {e}"),
                }
                outcomes.push(LoadOutcome::Loaded {
                    cell,
                    contents,
                    source: LoadSource::Generated,
                    dropped: 0,
                });
            }
        }
    }
    (outcomes, saves)
}
