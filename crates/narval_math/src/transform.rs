// Transform utilities for Mat4
//
// Extends glam::Mat4 with the conversions instancing needs between the
// world coordinate system (WCS) and a model's object coordinate system (OCS).
// glam already provides transform_point3(), transform_vector3() and inverse().

use crate::{Aabb, Ray};
use glam::{Mat3, Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a ray. The direction is NOT renormalised, so a parameter `t`
    /// designates the same point before and after the transform.
    fn transform_ray(&self, ray: &Ray) -> Ray;

    /// Transform a surface normal with the inverse-transpose of the linear part.
    fn transform_normal(&self, normal: Vec3) -> Vec3;

    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn transform_ray(&self, ray: &Ray) -> Ray {
        Ray::new(
            self.transform_point3(ray.origin),
            self.transform_vector3(ray.direction),
        )
    }

    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        let linear = Mat3::from_mat4(*self);
        (linear.inverse().transpose() * normal).normalize_or_zero()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        let min_point = aabb.min();
        let max_point = aabb.max();

        (0..8)
            .map(|corner| {
                Vec3::new(
                    if corner & 1 == 0 { min_point.x } else { max_point.x },
                    if corner & 2 == 0 { min_point.y } else { max_point.y },
                    if corner & 4 == 0 { min_point.z } else { max_point.z },
                )
            })
            .fold(Aabb::EMPTY, |acc, corner| {
                acc.include_point(self.transform_point3(corner))
            })
    }
}
