// Re-export glam for convenience
pub use glam::*;

// Narval math types
mod aabb;
mod interval;
mod ray;
mod transform;

pub mod frame;
pub mod morton;
pub mod sampling;

pub use aabb::Aabb;
pub use frame::Frame;
pub use interval::Interval;
pub use ray::Ray;
pub use sampling::Sampler;
pub use transform::Mat4Ext;

/// Rec. 709 luminance of a linear RGB triple.
#[inline]
pub fn luminance(c: Vec3) -> f32 {
    0.2126 * c.x + 0.7152 * c.y + 0.0722 * c.z
}

/// Arithmetic mean of the three channels.
#[inline]
pub fn mean(c: Vec3) -> f32 {
    (c.x + c.y + c.z) / 3.0
}

/// True when every channel is exactly zero.
#[inline]
pub fn is_black(c: Vec3) -> bool {
    c.x == 0.0 && c.y == 0.0 && c.z == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a * b, Vec3::new(4.0, 10.0, 18.0));
    }

    #[test]
    fn test_mean_and_luminance() {
        assert_eq!(mean(Vec3::new(1.0, 2.0, 3.0)), 2.0);
        assert!((luminance(Vec3::ONE) - 1.0).abs() < 1e-5);
        assert!(is_black(Vec3::ZERO));
        assert!(!is_black(Vec3::new(0.0, 1e-9, 0.0)));
    }
}
