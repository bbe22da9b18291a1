//! Bucketed linear BVH over the non-empty voxels of a density grid.
//!
//! Non-empty voxels are Morton-coded, sorted, and cut into fixed-size
//! buckets. Each bucket is one leaf of an implicit complete N-ary tree
//! (octree by default) stored 1-based: node 1 is the root and the children
//! of node `i` are `B(i-1)+2 ..= B(i-1)+B+1`.
//!
//! Node boxes are voxel index ranges packed 10 bits per axis. Traversal
//! walks the tree without a stack, using sibling/parent index arithmetic.

use std::sync::Arc;
use std::time::Instant;

use narval_core::{ConfigError, ConfigResult, Texture};
use narval_math::{morton, Aabb, Interval, Ray, Vec3};

/// Morton codes per leaf bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 16;

/// Flag bit of a node without voxels.
const EMPTY_NODE: u32 = 1 << 31;

const AXIS_MASK: u32 = morton::MAX_COORD;

/// Branching factor of the implicit tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeMode {
    #[default]
    Octree,
    Binary,
}

impl TreeMode {
    pub fn branching(self) -> usize {
        match self {
            TreeMode::Octree => 8,
            TreeMode::Binary => 2,
        }
    }
}

/// Result of [`BucketLbvh::traverse_tree_until`], in grid-space ray units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraversalHit {
    /// Start of the occupied span
    pub t_near: f32,
    /// End of the occupied span
    pub t_far: f32,
    /// Sum of voxel value times ray length inside each voxel
    pub density: f32,
}

impl TraversalHit {
    pub const MISS: TraversalHit = TraversalHit {
        t_near: f32::INFINITY,
        t_far: f32::NEG_INFINITY,
        density: 0.0,
    };

    /// `t_near > t_far` signals that no voxel was touched.
    pub fn is_miss(&self) -> bool {
        self.t_near > self.t_far
    }
}

/// Inclusive voxel index range, both corners packed as `x | y<<10 | z<<20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeBox {
    min: u32,
    max: u32,
}

impl NodeBox {
    const EMPTY: NodeBox = NodeBox {
        min: EMPTY_NODE,
        max: EMPTY_NODE,
    };

    #[inline]
    fn pack(x: u32, y: u32, z: u32) -> u32 {
        x | (y << 10) | (z << 20)
    }

    #[inline]
    fn unpack(v: u32) -> [u32; 3] {
        [v & AXIS_MASK, (v >> 10) & AXIS_MASK, (v >> 20) & AXIS_MASK]
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.min & EMPTY_NODE != 0
    }

    fn voxel(x: u32, y: u32, z: u32) -> Self {
        let p = Self::pack(x, y, z);
        NodeBox { min: p, max: p }
    }

    fn union(self, other: NodeBox) -> NodeBox {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let (a0, a1) = (Self::unpack(self.min), Self::unpack(self.max));
        let (b0, b1) = (Self::unpack(other.min), Self::unpack(other.max));
        NodeBox {
            min: Self::pack(a0[0].min(b0[0]), a0[1].min(b0[1]), a0[2].min(b0[2])),
            max: Self::pack(a1[0].max(b1[0]), a1[1].max(b1[1]), a1[2].max(b1[2])),
        }
    }
}

/// Spatial index over the non-zero voxels of a 3D density texture.
#[derive(Debug, Clone)]
pub struct BucketLbvh {
    grid: Arc<Texture>,
    dims: [u32; 3],
    branching: usize,
    /// Sorted ascending
    morton_codes: Vec<u32>,
    /// Bucket `b` covers `morton_codes[offsets[b]..offsets[b + 1]]`
    offsets: Vec<usize>,
    /// 1-based; `nodes[0]` is unused
    nodes: Vec<NodeBox>,
    depth: u32,
    leaf_start: usize,
}

impl BucketLbvh {
    /// Octree with buckets of [`DEFAULT_BUCKET_SIZE`].
    pub fn new(grid: Arc<Texture>) -> ConfigResult<Self> {
        Self::with_options(grid, TreeMode::default(), DEFAULT_BUCKET_SIZE)
    }

    /// Grids wider than 1024 voxels on any axis do not fit the Morton
    /// encoding and are rejected.
    pub fn with_options(grid: Arc<Texture>, mode: TreeMode, bucket_size: usize) -> ConfigResult<Self> {
        let dims = grid.dims();
        if !morton::fits(dims) {
            return Err(ConfigError::GridTooLarge { dims });
        }
        let start = Instant::now();

        let mut morton_codes = Vec::new();
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    if grid.sample_at_index(x, y, z).x > 0.0 {
                        morton_codes.push(morton::encode(x, y, z));
                    }
                }
            }
        }
        morton::radix_sort(&mut morton_codes);

        let bucket_size = bucket_size.max(1);
        let bucket_count = morton_codes.len().div_ceil(bucket_size);
        let offsets: Vec<usize> = (0..=bucket_count)
            .map(|b| (b * bucket_size).min(morton_codes.len()))
            .collect();

        // depth = ceil(log_B(buckets)) + 1
        let branching = mode.branching();
        let mut depth = 1;
        let mut leaves = 1usize;
        while leaves < bucket_count {
            leaves *= branching;
            depth += 1;
        }
        let leaf_start = (leaves - 1) / (branching - 1) + 1;

        let mut nodes = vec![NodeBox::EMPTY; leaf_start + leaves];
        for bucket in 0..bucket_count {
            nodes[leaf_start + bucket] = morton_codes[offsets[bucket]..offsets[bucket + 1]]
                .iter()
                .map(|&code| {
                    let (x, y, z) = morton::decode(code);
                    NodeBox::voxel(x, y, z)
                })
                .fold(NodeBox::EMPTY, NodeBox::union);
        }
        for node in (1..leaf_start).rev() {
            let first = branching * (node - 1) + 2;
            nodes[node] = nodes[first..first + branching]
                .iter()
                .fold(NodeBox::EMPTY, |acc, &child| acc.union(child));
        }

        log::info!(
            "Built BucketLBVH: {}x{}x{} grid, {} voxels, {} buckets, {} nodes, depth {} in {:.2?}",
            dims[0],
            dims[1],
            dims[2],
            morton_codes.len(),
            bucket_count,
            nodes.len() - 1,
            depth,
            start.elapsed()
        );

        Ok(Self {
            grid,
            dims,
            branching,
            morton_codes,
            offsets,
            nodes,
            depth,
            leaf_start,
        })
    }

    #[inline]
    pub fn first_child(&self, node: usize) -> usize {
        self.branching * (node - 1) + 2
    }

    #[inline]
    pub fn last_child(&self, node: usize) -> usize {
        self.first_child(node) + self.branching - 1
    }

    #[inline]
    pub fn parent(&self, node: usize) -> usize {
        (node - 2) / self.branching + 1
    }

    #[inline]
    fn is_last_sibling(&self, node: usize) -> bool {
        (node - 2) % self.branching == self.branching - 1
    }

    #[inline]
    fn is_leaf(&self, node: usize) -> bool {
        node >= self.leaf_start
    }

    /// Grid-space box of a node, dilated by half a voxel (the support of
    /// trilinear reconstruction) and clipped to the grid.
    fn dilated_bounds(&self, node: &NodeBox) -> Aabb {
        let min = Vec3::from_array(NodeBox::unpack(node.min).map(|v| v as f32));
        let max = Vec3::from_array(NodeBox::unpack(node.max).map(|v| v as f32));
        let grid_max = Vec3::new(self.dims[0] as f32, self.dims[1] as f32, self.dims[2] as f32);
        Aabb::from_corners((min - 0.5).max(Vec3::ZERO), (max + 1.5).min(grid_max))
    }

    /// Walk the tree along a grid-space ray restricted to `range`.
    ///
    /// Returns the span touched by (dilated) occupied voxels and the density
    /// integrated over the undilated voxels. Stops as soon as the span is at
    /// least `max_distance` long. A miss is reported with `t_near > t_far`.
    pub fn traverse_tree_until(&self, ray: &Ray, range: Interval, max_distance: f32) -> TraversalHit {
        let mut hit = TraversalHit::MISS;
        if self.nodes[1].is_empty() {
            return hit;
        }

        let inv_dir = ray.inv_direction();
        let mut node = 1;
        loop {
            let bounds = &self.nodes[node];
            let overlaps = !bounds.is_empty()
                && self
                    .dilated_bounds(bounds)
                    .intersect_inv(ray.origin, inv_dir, range)
                    .is_some();

            if overlaps {
                if !self.is_leaf(node) {
                    node = self.first_child(node);
                    continue;
                }
                if self.accumulate_bucket(node - self.leaf_start, ray, inv_dir, range, max_distance, &mut hit) {
                    return hit;
                }
            }

            // Next sibling, or climb until one exists
            loop {
                if node == 1 {
                    return hit;
                }
                if !self.is_last_sibling(node) {
                    node += 1;
                    break;
                }
                node = self.parent(node);
            }
        }
    }

    /// Test every voxel of one bucket. Returns true once the span reaches
    /// `max_distance`.
    fn accumulate_bucket(
        &self,
        bucket: usize,
        ray: &Ray,
        inv_dir: Vec3,
        range: Interval,
        max_distance: f32,
        hit: &mut TraversalHit,
    ) -> bool {
        let Some(codes) = self
            .offsets
            .get(bucket + 1)
            .map(|&end| &self.morton_codes[self.offsets[bucket]..end])
        else {
            return false;
        };

        for &code in codes {
            let (x, y, z) = morton::decode(code);
            let voxel = NodeBox::voxel(x, y, z);
            let Some(span) = self
                .dilated_bounds(&voxel)
                .intersect_inv(ray.origin, inv_dir, range)
            else {
                continue;
            };
            hit.t_near = hit.t_near.min(span.min);
            hit.t_far = hit.t_far.max(span.max);

            let min = Vec3::new(x as f32, y as f32, z as f32);
            if let Some(inner) = Aabb::from_corners(min, min + 1.0).intersect_inv(ray.origin, inv_dir, range) {
                hit.density += self.grid.sample_at_index(x, y, z).x * inner.size();
            }

            if hit.t_far - hit.t_near >= max_distance {
                return true;
            }
        }
        false
    }

    pub fn grid(&self) -> &Arc<Texture> {
        &self.grid
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn voxel_count(&self) -> usize {
        self.morton_codes.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of tree nodes (excluding the unused slot 0).
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn branching(&self) -> usize {
        self.branching
    }

    pub fn morton_codes(&self) -> &[u32] {
        &self.morton_codes
    }
}
