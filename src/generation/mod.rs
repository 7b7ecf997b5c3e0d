//! Procedural generation of cell contents.
//!
//! Only positions and identities are generated here; appearance is left to
//! the renderer.

pub mod config;
pub mod cell_gen;

pub use config::{CountRange, GeneratorConfig, MoonSpec, OrbitBand, SatelliteSpec};
pub use cell_gen::{CellGenerator, cell_rng, derive_cell_seed};
