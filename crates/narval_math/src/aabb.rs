use crate::{Interval, Ray, Vec3};

/// Smallest extent given to flat boxes so slab tests stay well defined.
const MIN_EXTENT: f32 = 1e-4;

/// Axis-aligned box stored as its two corners.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub const UNIVERSE: Aabb = Aabb {
        min: Vec3::NEG_INFINITY,
        max: Vec3::INFINITY,
    };

    /// Box around two arbitrary points. Flat boxes (around an axis-aligned
    /// triangle, say) are padded to [`MIN_EXTENT`].
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        let mut aabb = Self::from_corners(a.min(b), a.max(b));
        for axis in 0..3 {
            let padded = aabb.axis_interval(axis).pad_to(MIN_EXTENT);
            aabb.min[axis] = padded.min;
            aabb.max[axis] = padded.max;
        }
        aabb
    }

    /// Exact box with the given corners.
    pub fn from_corners(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn surrounding(a: &Aabb, b: &Aabb) -> Self {
        Self::from_corners(a.min.min(b.min), a.max.max(b.max))
    }

    pub fn include_point(&self, p: Vec3) -> Self {
        Self::from_corners(self.min.min(p), self.max.max(p))
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Extent along axis `n` (0 = x, 1 = y, 2 = z).
    pub fn axis_interval(&self, n: usize) -> Interval {
        Interval::new(self.min[n], self.max[n])
    }

    pub fn longest_axis(&self) -> usize {
        let extent = self.max - self.min;
        if extent.x > extent.y && extent.x > extent.z {
            0
        } else if extent.y > extent.z {
            1
        } else {
            2
        }
    }

    pub fn centroid(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Overlap of the ray with the box, clipped to `ray_t`.
    ///
    /// Touching spans (`min == max`) count as hits, so grazing rays and rays
    /// starting on a face are kept.
    pub fn intersect(&self, r: &Ray, ray_t: Interval) -> Option<Interval> {
        self.intersect_inv(r.origin, r.inv_direction(), ray_t)
    }

    /// [`Self::intersect`] with a precomputed reciprocal direction.
    #[inline]
    pub fn intersect_inv(&self, origin: Vec3, inv_dir: Vec3, ray_t: Interval) -> Option<Interval> {
        let near = (self.min - origin) * inv_dir;
        let far = (self.max - origin) * inv_dir;
        let mut span = ray_t;
        for axis in 0..3 {
            let (t0, t1) = if inv_dir[axis] < 0.0 {
                (far[axis], near[axis])
            } else {
                (near[axis], far[axis])
            };
            // f32::max/min drop the NaN of 0 * inf, leaving the range as is
            span.min = t0.max(span.min);
            span.max = t1.min(span.max);
        }
        (span.min <= span.max).then_some(span)
    }
}
