//! Spatial indexing over loaded cells

pub mod bvh;

pub use bvh::{Bvh, BvhNode, SplitPolicy};
