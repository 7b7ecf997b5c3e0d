//! Orrery - spatial cell streaming for a procedural universe

pub mod core;
pub mod math;
pub mod world;
pub mod generation;
pub mod spatial;
pub mod persist;
pub mod streaming;
