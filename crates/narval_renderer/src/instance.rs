//! Instances place a shared model in the world.
//!
//! Rays are moved into the model's object space instead of duplicating
//! geometry per instance. The ray direction is not renormalised, so hit
//! parameters found in object space are valid world-space parameters.

use std::sync::Arc;

use narval_math::{Aabb, Interval, Mat4, Mat4Ext, Ray, Vec2, Vec3};

use crate::primitive::{Primitive, Shape, SurfaceSample};
use crate::{Model, RayIntersection};

/// A model with a local-to-world transform.
#[derive(Debug, Clone)]
pub struct InstancedModel {
    model: Arc<Model>,
    /// Local-to-world
    transform: Mat4,
    /// World-to-local
    inverse: Mat4,
    /// World-space bounds for early rejection
    bounds: Aabb,
    /// Index of the scene light attached to this instance
    pub light: Option<usize>,
}

impl InstancedModel {
    pub fn new(model: Arc<Model>, transform: Mat4) -> Self {
        let bounds = transform.transform_aabb(&model.bounds());
        Self {
            model,
            transform,
            inverse: transform.inverse(),
            bounds,
            light: None,
        }
    }

    /// Closest hit of a world-space ray; point and normal are returned in
    /// world space.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval, rec: &mut RayIntersection) -> bool {
        if self.bounds.intersect(ray, ray_t).is_none() {
            return false;
        }

        let local_ray = self.to_local(ray);
        let mut local = RayIntersection::default();
        if !self.model.intersect(&local_ray, ray_t, &mut local) {
            return false;
        }

        *rec = local;
        rec.point = self.transform.transform_point3(local.point);
        rec.normal = self.transform.transform_normal(local.normal);
        true
    }

    /// World-to-object ray transform.
    #[inline]
    pub fn to_local(&self, ray: &Ray) -> Ray {
        self.inverse.transform_ray(ray)
    }

    /// Sample a point on one primitive, returned in world space.
    pub fn sample_primitive(&self, primitive: &Primitive, u: Vec2) -> SurfaceSample {
        let local = primitive.sample(u, self.model.arena());
        SurfaceSample {
            point: self.transform.transform_point3(local.point),
            normal: if local.normal == Vec3::ZERO {
                Vec3::ZERO
            } else {
                self.transform.transform_normal(local.normal)
            },
        }
    }

    /// World-space area of one primitive.
    ///
    /// Exact for flat shapes; spheres and boxes under non-uniform scale use
    /// the mean scale factor.
    pub fn world_area(&self, primitive: &Primitive) -> f32 {
        let t = &self.transform;
        match primitive.shape {
            Shape::Triangle { vertices } => {
                let [p0, p1, p2] = self.model.arena().triangle(vertices).map(|p| t.transform_point3(p));
                0.5 * (p1 - p0).cross(p2 - p0).length()
            }
            Shape::Rectangle { edge_u, edge_v, .. } => t
                .transform_vector3(edge_u)
                .cross(t.transform_vector3(edge_v))
                .length(),
            Shape::Point { .. } => 0.0,
            Shape::Sphere { .. } | Shape::Box { .. } => {
                let scale = t.to_scale_rotation_translation().0;
                let mean = (scale.x.abs() + scale.y.abs() + scale.z.abs()) / 3.0;
                primitive.area(self.model.arena()) * mean * mean
            }
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn inverse(&self) -> &Mat4 {
        &self.inverse
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Object-space origin in world space.
    pub fn position(&self) -> Vec3 {
        self.transform.transform_point3(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narval_core::Mesh;
    use narval_math::Quat;

    fn cube_at(transform: Mat4) -> InstancedModel {
        InstancedModel::new(Arc::new(Model::from_mesh("cube", &Mesh::unit_cube(), 0)), transform)
    }

    #[test]
    fn test_translated_instance() {
        let instance = cube_at(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        let mut rec = RayIntersection::default();

        let ray = Ray::new(Vec3::new(5.0, 0.0, -5.0), Vec3::Z);
        assert!(instance.intersect(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.t_near - 4.5).abs() < 1e-4);
        assert!((rec.point - Vec3::new(5.0, 0.0, -0.5)).length() < 1e-4);

        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        assert!(!instance.intersect(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
    }

    #[test]
    fn test_scaled_instance_keeps_world_parameter() {
        let instance = cube_at(Mat4::from_scale(Vec3::new(1.0, 1.0, 4.0)));
        let mut rec = RayIntersection::default();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -10.0), Vec3::Z);
        assert!(instance.intersect(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        // Face at z = -2 in world space
        assert!((rec.t_near - 8.0).abs() < 1e-4);
        assert!((rec.normal - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn test_rotated_normal() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let instance = cube_at(Mat4::from_quat(rotation));
        let mut rec = RayIntersection::default();
        let ray = Ray::new(Vec3::new(-5.0, 0.1, 0.1), Vec3::X);
        assert!(instance.intersect(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.normal - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_world_area() {
        let instance = cube_at(Mat4::from_scale(Vec3::splat(2.0)));
        let total: f32 = instance
            .model()
            .primitives()
            .iter()
            .map(|p| instance.world_area(p))
            .sum();
        assert!((total - 24.0).abs() < 1e-3);
    }
}
