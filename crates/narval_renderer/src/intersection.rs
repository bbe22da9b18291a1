//! Intersection record shared by primitives, models and the scene.

use narval_math::{Ray, Vec2, Vec3};

/// Record of a ray-object intersection.
///
/// Primitives fill it in object space; [`crate::InstancedModel`] moves the
/// point and normal to world space. `t_near`/`t_far` are valid in both
/// because instance transforms keep the ray parameterisation.
#[derive(Debug, Clone, Copy)]
pub struct RayIntersection {
    /// Entry parameter. Equal to `t_far` for surfaces.
    pub t_near: f32,
    /// Exit parameter, only differs from `t_near` for volumes
    pub t_far: f32,
    /// Point at `t_near`
    pub point: Vec3,
    /// Geometric normal, always facing against the ray
    pub normal: Vec3,
    pub uv: Vec2,
    /// Whether the ray arrived from the outside of the surface
    pub front_face: bool,
    /// Index of the hit primitive within its model
    pub primitive: usize,
    /// Index of the hit instance within the scene
    pub instance: usize,
}

impl Default for RayIntersection {
    fn default() -> Self {
        Self {
            t_near: f32::INFINITY,
            t_far: f32::INFINITY,
            point: Vec3::ZERO,
            normal: Vec3::ZERO,
            uv: Vec2::ZERO,
            front_face: false,
            primitive: 0,
            instance: 0,
        }
    }
}

impl RayIntersection {
    /// Orient `normal` against the ray and record which side was hit.
    pub fn set_face_normal(&mut self, ray: &Ray, outward_normal: Vec3) {
        self.front_face = ray.direction.dot(outward_normal) < 0.0;
        self.normal = if self.front_face {
            outward_normal
        } else {
            -outward_normal
        };
    }
}
