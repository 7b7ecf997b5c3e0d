//! Cell streaming: load queue, async loader, scheduler and LOD selection

pub mod priority;
pub mod cell_loader;
pub mod scheduler;
pub mod lod;

pub use priority::{LoadQueue, QueuedCell};
pub use cell_loader::{load_batch, CellLoader, LoadBackend, LoadOutcome, LoadSource};
pub use scheduler::{CellState, StreamStats, StreamingScheduler, TickReport};
pub use lod::{lod_for, LodConfig, LodLevel, LodPolicy, RenderSet};
