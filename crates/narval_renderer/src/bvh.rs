//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! A binary tree flattened into a node array in depth-first order: the first
//! child of an interior node is the next node, the second child is stored by
//! index. Traversal is iterative with a fixed-size stack.

use narval_math::{Aabb, Interval, Ray};

/// Maximum primitives per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// Capacity of the traversal stack.
const STACK_SIZE: usize = 64;

/// Past this depth only median splits are made, which bounds the tree depth
/// (and thus the stack use) by `MEDIAN_ONLY_DEPTH + log2(n)`.
const MEDIAN_ONLY_DEPTH: usize = 31;

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    /// Leaf: first primitive. Interior: index of the second child.
    offset: u32,
    /// Primitive count, zero for interior nodes
    count: u16,
    /// Split axis of interior nodes
    axis: u8,
}

#[derive(Debug, Clone, Copy)]
struct PrimitiveInfo {
    index: usize,
    bounds: Aabb,
    centroid: [f32; 3],
}

/// Flat BVH over a list of primitives.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
}

impl Bvh {
    /// Build a BVH over `items`, reordering them so every leaf references a
    /// contiguous range.
    ///
    /// Nodes split at the midpoint of the longest centroid axis; when that
    /// leaves one side empty the split falls back to the median element.
    pub fn build<T: Clone>(items: &mut Vec<T>, bounds_of: impl Fn(&T) -> Aabb) -> Self {
        let mut info: Vec<PrimitiveInfo> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let bounds = bounds_of(item);
                let c = bounds.centroid();
                PrimitiveInfo {
                    index,
                    bounds,
                    centroid: [c.x, c.y, c.z],
                }
            })
            .collect();

        let mut bvh = Bvh {
            nodes: Vec::with_capacity(2 * items.len().max(1)),
        };
        if items.is_empty() {
            return bvh;
        }

        let mut order = Vec::with_capacity(items.len());
        bvh.build_recursive(&mut info, 0, &mut order);
        *items = order.iter().map(|&i| items[i].clone()).collect();
        bvh
    }

    fn build_recursive(&mut self, info: &mut [PrimitiveInfo], depth: usize, order: &mut Vec<usize>) -> usize {
        let node_index = self.nodes.len();
        let bounds = info
            .iter()
            .fold(Aabb::EMPTY, |acc, p| Aabb::surrounding(&acc, &p.bounds));
        self.nodes.push(BvhNode {
            bounds,
            offset: 0,
            count: 0,
            axis: 0,
        });

        let n = info.len();
        if n <= LEAF_MAX_SIZE {
            self.nodes[node_index].offset = order.len() as u32;
            self.nodes[node_index].count = n as u16;
            order.extend(info.iter().map(|p| p.index));
            return node_index;
        }

        // Choose split axis based on centroid spread
        let centroid_bounds = info.iter().fold(Aabb::EMPTY, |acc, p| {
            acc.include_point(p.centroid.into())
        });
        let axis = centroid_bounds.longest_axis();
        let extent = centroid_bounds.axis_interval(axis);

        let mut mid = 0;
        if depth < MEDIAN_ONLY_DEPTH && extent.size() > 0.0 {
            let pivot = 0.5 * (extent.min + extent.max);
            for j in 0..n {
                if info[j].centroid[axis] < pivot {
                    info.swap(mid, j);
                    mid += 1;
                }
            }
        }
        if mid == 0 || mid == n {
            mid = n / 2;
            info.select_nth_unstable_by(mid, |a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));
        }

        let (left, right) = info.split_at_mut(mid);
        self.build_recursive(left, depth + 1, order);
        let second = self.build_recursive(right, depth + 1, order);

        let node = &mut self.nodes[node_index];
        node.offset = second as u32;
        node.axis = axis as u8;
        node_index
    }

    /// Find the closest primitive hit along `ray` within `ray_t`.
    ///
    /// `hit_primitive(index, range)` tests one primitive against the current
    /// search range and returns its hit parameter. Subtrees whose bounds lie
    /// beyond the closest hit found so far are skipped.
    pub fn intersect(
        &self,
        ray: &Ray,
        ray_t: Interval,
        mut hit_primitive: impl FnMut(usize, Interval) -> Option<f32>,
    ) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        let inv_dir = ray.inv_direction();
        let dir_is_neg = [inv_dir.x < 0.0, inv_dir.y < 0.0, inv_dir.z < 0.0];
        let mut closest = ray_t.max;
        let mut hit_anything = false;

        let mut stack = [0usize; STACK_SIZE];
        let mut to_visit = 0;
        let mut current = 0;

        loop {
            let node = &self.nodes[current];
            let range = Interval::new(ray_t.min, closest);
            if node.bounds.intersect_inv(ray.origin, inv_dir, range).is_some() {
                if node.count > 0 {
                    let first = node.offset as usize;
                    for index in first..first + node.count as usize {
                        if let Some(t) = hit_primitive(index, Interval::new(ray_t.min, closest)) {
                            closest = t;
                            hit_anything = true;
                        }
                    }
                } else {
                    // Visit the nearer child first
                    let (near, far) = if dir_is_neg[node.axis as usize] {
                        (node.offset as usize, current + 1)
                    } else {
                        (current + 1, node.offset as usize)
                    };
                    stack[to_visit] = far;
                    to_visit += 1;
                    current = near;
                    continue;
                }
            }

            if to_visit == 0 {
                break;
            }
            to_visit -= 1;
            current = stack[to_visit];
        }

        hit_anything
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the whole hierarchy.
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::EMPTY, |n| n.bounds)
    }

    /// Depth of the deepest leaf (a lone leaf has depth 1).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[BvhNode], index: usize) -> usize {
            let node = &nodes[index];
            if node.count > 0 {
                1
            } else {
                1 + walk(nodes, index + 1).max(walk(nodes, node.offset as usize))
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narval_math::Vec3;

    /// Unit boxes along the x axis, hit by the slab test.
    fn boxes(count: usize) -> Vec<Aabb> {
        (0..count)
            .map(|i| {
                let c = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
                Aabb::from_corners(c - 0.5, c + 0.5)
            })
            .collect()
    }

    fn closest(bvh: &Bvh, items: &[Aabb], ray: &Ray) -> Option<(usize, f32)> {
        let mut best = None;
        let hit = bvh.intersect(ray, Interval::new(0.0, f32::INFINITY), |i, range| {
            let span = items[i].intersect(ray, range)?;
            best = Some((i, span.min));
            Some(span.min)
        });
        hit.then_some(best).flatten()
    }

    #[test]
    fn test_empty_bvh_misses() {
        let mut items: Vec<Aabb> = Vec::new();
        let bvh = Bvh::build(&mut items, |b| *b);
        assert_eq!(bvh.node_count(), 0);
        assert!(!bvh.intersect(&Ray::new(Vec3::ZERO, Vec3::X), Interval::UNIVERSE, |_, _| None));
    }

    #[test]
    fn test_small_set_is_single_leaf() {
        let mut items = boxes(3);
        let bvh = Bvh::build(&mut items, |b| *b);
        assert_eq!(bvh.node_count(), 1);
        assert_eq!(bvh.depth(), 1);
    }

    #[test]
    fn test_finds_closest_hit() {
        let mut items = boxes(100);
        let bvh = Bvh::build(&mut items, |b| *b);
        assert!(bvh.node_count() > 1);

        // Looking down -x from the far end: the last box is the closest
        let ray = Ray::new(Vec3::new(500.0, 0.0, 0.0), -Vec3::X);
        let (index, t) = closest(&bvh, &items, &ray).unwrap();
        assert!((items[index].centroid().x - 198.0).abs() < 1e-4);
        assert!((t - 301.5).abs() < 1e-3);

        // And from the other side
        let ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X);
        let (index, _) = closest(&bvh, &items, &ray).unwrap();
        assert!(items[index].centroid().x.abs() < 1e-4);

        // Passing above every box
        let ray = Ray::new(Vec3::new(-10.0, 3.0, 0.0), Vec3::X);
        assert!(closest(&bvh, &items, &ray).is_none());
    }

    #[test]
    fn test_coincident_centroids_still_split() {
        // Every primitive has the same centroid: midpoint splits fail
        let mut items: Vec<Aabb> = (0..50)
            .map(|i| Aabb::from_corners(Vec3::splat(-1.0 - i as f32), Vec3::splat(1.0 + i as f32)))
            .collect();
        let bvh = Bvh::build(&mut items, |b| *b);
        assert!(bvh.depth() <= 8, "depth {} for 50 items", bvh.depth());

        let ray = Ray::new(Vec3::new(0.0, 0.0, -100.0), Vec3::Z);
        let (index, t) = closest(&bvh, &items, &ray).unwrap();
        assert_eq!(items[index].max().x, 50.0);
        assert!((t - 50.0).abs() < 1e-4);
    }
}
