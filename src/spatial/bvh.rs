//! Bounding volume hierarchy over grid cells.
//!
//! Each leaf holds one cell and that cell's column footprint. The tree is
//! built in one pass and is immutable afterwards; when the set of cells
//! changes it is rebuilt from scratch.

use serde::{Deserialize, Serialize};

use crate::core::Vec3;
use crate::math::{Aabb, Frustum};
use crate::world::CellCoord;

/// How internal nodes choose their split
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Surface area heuristic up to `sah_threshold` cells, median above
    Auto { sah_threshold: usize },
    /// Full SAH sweep on every axis
    Sah,
    /// Median on the longest centroid axis
    Median,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        SplitPolicy::Auto { sah_threshold: 256 }
    }
}

impl SplitPolicy {
    fn use_sah(self, count: usize) -> bool {
        match self {
            SplitPolicy::Auto { sah_threshold } => count <= sah_threshold,
            SplitPolicy::Sah => true,
            SplitPolicy::Median => false,
        }
    }
}

/// BVH node; children are owned exclusively by their parent
#[derive(Debug)]
pub enum BvhNode {
    Leaf {
        bounds: Aabb,
        cell: CellCoord,
    },
    Internal {
        bounds: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    pub fn bounds(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Internal { bounds, .. } => bounds,
        }
    }

    fn depth(&self) -> usize {
        match self {
            BvhNode::Leaf { .. } => 1,
            BvhNode::Internal { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Clone, Copy)]
struct Primitive {
    cell: CellCoord,
    bounds: Aabb,
    centroid: Vec3,
}

/// Immutable BVH over a set of cells
#[derive(Debug, Default)]
pub struct Bvh {
    root: Option<Box<BvhNode>>,
    len: usize,
    bottom: f32,
    top: f32,
}

impl Bvh {
    /// Build over `cells`. Duplicates are indexed once.
    pub fn build(cells: &[CellCoord], grid_size: f32, bottom: f32, top: f32, policy: SplitPolicy) -> Self {
        let mut unique = cells.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut prims: Vec<Primitive> = unique
            .into_iter()
            .map(|cell| {
                let bounds = cell.footprint(grid_size, bottom, top);
                Primitive {
                    cell,
                    bounds,
                    centroid: bounds.center(),
                }
            })
            .collect();

        let len = prims.len();
        let root = if prims.is_empty() {
            None
        } else {
            Some(build_node(&mut prims, policy))
        };
        Self { root, len, bottom, top }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&BvhNode> {
        self.root.as_deref()
    }

    /// Number of indexed cells
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tree depth; 0 for an empty tree
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, |r| r.depth())
    }

    /// Every cell whose footprint intersects `bounds` (closed intervals)
    pub fn query(&self, bounds: &Aabb) -> Vec<CellCoord> {
        self.collect(|b| b.intersects(bounds))
    }

    /// Cells intersecting the square column of half-width `radius` around `center`
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<CellCoord> {
        let bounds = Aabb::new(
            Vec3::new(center.x - radius, self.bottom, center.z - radius),
            Vec3::new(center.x + radius, self.top, center.z + radius),
        );
        self.query(&bounds)
    }

    /// Cells whose footprint touches the frustum
    pub fn query_frustum(&self, frustum: &Frustum) -> Vec<CellCoord> {
        self.collect(|b| frustum.intersects_aabb(b))
    }

    fn collect(&self, mut test: impl FnMut(&Aabb) -> bool) -> Vec<CellCoord> {
        let mut out = Vec::new();
        let Some(root) = self.root.as_deref() else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !test(node.bounds()) {
                continue;
            }
            match node {
                BvhNode::Leaf { cell, .. } => out.push(*cell),
                BvhNode::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }
}

fn build_node(prims: &mut [Primitive], policy: SplitPolicy) -> Box<BvhNode> {
    if let [only] = prims {
        return Box::new(BvhNode::Leaf {
            bounds: only.bounds,
            cell: only.cell,
        });
    }

    let bounds = prims
        .iter()
        .skip(1)
        .fold(prims[0].bounds, |acc, p| acc.merged(&p.bounds));

    let mid = if policy.use_sah(prims.len()) {
        sah_split(prims)
    } else {
        median_split(prims)
    };

    let (left, right) = prims.split_at_mut(mid);
    Box::new(BvhNode::Internal {
        bounds,
        left: build_node(left, policy),
        right: build_node(right, policy),
    })
}

fn sort_on_axis(prims: &mut [Primitive], axis: usize) {
    prims.sort_unstable_by(|a, b| {
        a.centroid[axis]
            .total_cmp(&b.centroid[axis])
            .then_with(|| a.cell.cmp(&b.cell))
    });
}

/// Sort on the longest centroid axis and split in half
fn median_split(prims: &mut [Primitive]) -> usize {
    let mut centroids = Aabb::new(prims[0].centroid, prims[0].centroid);
    for p in prims.iter() {
        centroids.expand(p.centroid);
    }
    sort_on_axis(prims, centroids.longest_axis());
    prims.len() / 2
}

/// Sweep every axis and pick the split minimizing
/// `SA(left) * |left| + SA(right) * |right|`. Leaves `prims` sorted on the
/// chosen axis and returns the split index.
fn sah_split(prims: &mut [Primitive]) -> usize {
    let n = prims.len();
    let mut best: Option<(f32, usize, usize)> = None;
    let mut right_area = vec![0.0f32; n];

    for axis in 0..3 {
        sort_on_axis(prims, axis);

        let mut acc = prims[n - 1].bounds;
        for i in (1..n).rev() {
            acc = acc.merged(&prims[i].bounds);
            right_area[i] = acc.surface_area();
        }

        let mut left = prims[0].bounds;
        for i in 1..n {
            // Split before index i
            let cost = left.surface_area() * i as f32 + right_area[i] * (n - i) as f32;
            if best.is_none_or(|(c, _, _)| cost < c) {
                best = Some((cost, axis, i));
            }
            left = left.merged(&prims[i].bounds);
        }
    }

    match best {
        Some((_, axis, index)) => {
            if axis != 2 {
                sort_on_axis(prims, axis);
            }
            index
        }
        None => n / 2,
    }
}
