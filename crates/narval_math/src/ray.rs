use crate::Vec3;

/// Half-line `origin + t * direction`.
///
/// `direction` may have any length. Instances move world rays into object
/// space without renormalising, which keeps `t` comparable between them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + t * self.direction
    }

    /// Per-axis `1 / direction`; zero components become infinities.
    #[inline]
    pub fn inv_direction(&self) -> Vec3 {
        self.direction.recip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_keeps_parameter_scale() {
        let ray = Ray::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(ray.at(0.0), ray.origin);
        assert_eq!(ray.at(0.5), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(1.0, -2.0, 0.0));
    }

    #[test]
    fn test_inv_direction_handles_zero_components() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 2.0, -4.0));
        let inv = ray.inv_direction();
        assert!(inv.x.is_infinite());
        assert_eq!(inv.y, 0.5);
        assert_eq!(inv.z, -0.25);
    }
}
