//! Geometric primitives.
//!
//! All intersection and sampling routines work in the object coordinate
//! system of the model that owns the primitive. Triangles reference their
//! corners by index into the model's [`VertexArena`].

use std::f32::consts::PI;

use narval_math::sampling::{uniform_sample_sphere, uniform_sample_triangle};
use narval_math::{Aabb, Interval, Ray, Vec2, Vec3};

use crate::model::VertexArena;
use crate::RayIntersection;

/// Index of a material in the scene's material table.
pub type MaterialId = usize;

/// Closed set of shapes the renderer can intersect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Counter-clockwise triangle; indices into the vertex arena
    Triangle { vertices: [u32; 3] },
    Sphere { center: Vec3, radius: f32 },
    /// Parallelogram spanned by two orthogonal edges from `corner`
    Rectangle { corner: Vec3, edge_u: Vec3, edge_v: Vec3 },
    /// Zero-area emitter position; never intersected
    Point { position: Vec3 },
    /// Axis-aligned box bounding a participating medium
    Box { min: Vec3, max: Vec3 },
}

/// A point sampled on a primitive's surface.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceSample {
    pub point: Vec3,
    /// Outward unit normal, zero for points
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub shape: Shape,
    pub material: MaterialId,
}

impl Primitive {
    pub fn new(shape: Shape, material: MaterialId) -> Self {
        Self { shape, material }
    }

    /// True for box-shaped medium bounds, which report an entry/exit span.
    pub fn is_volume(&self) -> bool {
        matches!(self.shape, Shape::Box { .. })
    }

    pub fn is_point(&self) -> bool {
        matches!(self.shape, Shape::Point { .. })
    }

    pub fn bounds(&self, arena: &VertexArena) -> Aabb {
        match self.shape {
            Shape::Triangle { vertices } => {
                let [p0, p1, p2] = arena.triangle(vertices);
                Aabb::from_points(p0.min(p1).min(p2), p0.max(p1).max(p2))
            }
            Shape::Sphere { center, radius } => {
                let r = Vec3::splat(radius);
                Aabb::from_points(center - r, center + r)
            }
            Shape::Rectangle {
                corner,
                edge_u,
                edge_v,
            } => Aabb::from_points(corner, corner + edge_u + edge_v)
                .include_point(corner + edge_u)
                .include_point(corner + edge_v),
            Shape::Point { position } => Aabb::from_points(position, position),
            Shape::Box { min, max } => Aabb::from_corners(min, max),
        }
    }

    /// Test the ray against the primitive within `ray_t` (closed interval).
    ///
    /// On a hit fills `t_near`, `t_far`, `point`, `normal`, `uv` and
    /// `front_face` of `rec`, in object space.
    pub fn intersect(
        &self,
        ray: &Ray,
        ray_t: Interval,
        arena: &VertexArena,
        rec: &mut RayIntersection,
    ) -> bool {
        match self.shape {
            Shape::Triangle { vertices } => intersect_triangle(ray, ray_t, arena, vertices, rec),
            Shape::Sphere { center, radius } => intersect_sphere(ray, ray_t, center, radius, rec),
            Shape::Rectangle {
                corner,
                edge_u,
                edge_v,
            } => intersect_rectangle(ray, ray_t, corner, edge_u, edge_v, rec),
            Shape::Point { .. } => false,
            Shape::Box { min, max } => intersect_box(ray, ray_t, min, max, rec),
        }
    }

    pub fn area(&self, arena: &VertexArena) -> f32 {
        match self.shape {
            Shape::Triangle { vertices } => {
                let [p0, p1, p2] = arena.triangle(vertices);
                0.5 * (p1 - p0).cross(p2 - p0).length()
            }
            Shape::Sphere { radius, .. } => 4.0 * PI * radius * radius,
            Shape::Rectangle { edge_u, edge_v, .. } => edge_u.cross(edge_v).length(),
            Shape::Point { .. } => 0.0,
            Shape::Box { min, max } => {
                let e = max - min;
                2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
            }
        }
    }

    /// Uniformly sample a point on the surface (pdf `1 / area` in area measure).
    pub fn sample(&self, u: Vec2, arena: &VertexArena) -> SurfaceSample {
        match self.shape {
            Shape::Triangle { vertices } => {
                let [p0, p1, p2] = arena.triangle(vertices);
                let (b0, b1) = uniform_sample_triangle(u);
                SurfaceSample {
                    point: p0 * b0 + p1 * b1 + p2 * (1.0 - b0 - b1),
                    normal: (p1 - p0).cross(p2 - p0).normalize_or_zero(),
                }
            }
            Shape::Sphere { center, radius } => {
                let normal = uniform_sample_sphere(u);
                SurfaceSample {
                    point: center + normal * radius,
                    normal,
                }
            }
            Shape::Rectangle {
                corner,
                edge_u,
                edge_v,
            } => SurfaceSample {
                point: corner + edge_u * u.x + edge_v * u.y,
                normal: edge_u.cross(edge_v).normalize_or_zero(),
            },
            Shape::Point { position } => SurfaceSample {
                point: position,
                normal: Vec3::ZERO,
            },
            Shape::Box { min, max } => sample_box(u, min, max),
        }
    }
}

/// Möller-Trumbore ray-triangle intersection.
fn intersect_triangle(
    ray: &Ray,
    ray_t: Interval,
    arena: &VertexArena,
    vertices: [u32; 3],
    rec: &mut RayIntersection,
) -> bool {
    let [p0, p1, p2] = arena.triangle(vertices);
    let edge1 = p1 - p0;
    let edge2 = p2 - p0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle
    if a.abs() < 1e-8 {
        return false;
    }

    let f = 1.0 / a;
    let s = ray.origin - p0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }

    let t = f * edge2.dot(q);
    if !ray_t.contains(t) {
        return false;
    }

    let geometric = edge1.cross(edge2).normalize();
    let w = 1.0 - u - v;
    let outward = match arena.normals(vertices) {
        Some([n0, n1, n2]) => {
            let shading = (n0 * w + n1 * u + n2 * v).normalize_or_zero();
            if shading.dot(geometric) < 0.0 {
                -shading
            } else {
                shading
            }
        }
        None => geometric,
    };

    rec.t_near = t;
    rec.t_far = t;
    rec.point = ray.at(t);
    rec.front_face = ray.direction.dot(geometric) < 0.0;
    rec.normal = if rec.front_face { outward } else { -outward };
    rec.uv = match arena.uvs(vertices) {
        Some([uv0, uv1, uv2]) => uv0 * w + uv1 * u + uv2 * v,
        None => Vec2::new(u, v),
    };
    true
}

fn intersect_sphere(
    ray: &Ray,
    ray_t: Interval,
    center: Vec3,
    radius: f32,
    rec: &mut RayIntersection,
) -> bool {
    let oc = center - ray.origin;
    let a = ray.direction.length_squared();
    let h = ray.direction.dot(oc);
    let c = oc.length_squared() - radius * radius;

    let discriminant = h * h - a * c;
    if discriminant < 0.0 {
        return false;
    }

    let sqrtd = discriminant.sqrt();

    // Find the nearest root in the acceptable range
    let mut root = (h - sqrtd) / a;
    if !ray_t.contains(root) {
        root = (h + sqrtd) / a;
        if !ray_t.contains(root) {
            return false;
        }
    }

    rec.t_near = root;
    rec.t_far = root;
    rec.point = ray.at(root);
    let outward_normal = (rec.point - center) / radius;
    rec.set_face_normal(ray, outward_normal);
    rec.uv = sphere_uv(outward_normal);
    true
}

/// UV coordinates for a point on the unit sphere.
fn sphere_uv(p: Vec3) -> Vec2 {
    // theta: angle down from +Y, phi: angle around Y axis from +X
    let theta = (-p.y).clamp(-1.0, 1.0).acos();
    let phi = (-p.z).atan2(p.x) + PI;
    Vec2::new(phi / (2.0 * PI), theta / PI)
}

fn intersect_rectangle(
    ray: &Ray,
    ray_t: Interval,
    corner: Vec3,
    edge_u: Vec3,
    edge_v: Vec3,
    rec: &mut RayIntersection,
) -> bool {
    let n = edge_u.cross(edge_v);
    let denom = n.dot(ray.direction);
    if denom.abs() < 1e-8 {
        return false;
    }

    let t = n.dot(corner - ray.origin) / denom;
    if !ray_t.contains(t) {
        return false;
    }

    let p = ray.at(t);
    let local = p - corner;
    let a = local.dot(edge_u) / edge_u.length_squared();
    let b = local.dot(edge_v) / edge_v.length_squared();
    if !(0.0..=1.0).contains(&a) || !(0.0..=1.0).contains(&b) {
        return false;
    }

    rec.t_near = t;
    rec.t_far = t;
    rec.point = p;
    rec.set_face_normal(ray, n.normalize());
    rec.uv = Vec2::new(a, b);
    true
}

/// Slab test reporting the whole `[entry, exit]` span clipped to `ray_t`.
/// A ray starting inside the box enters at `ray_t.min`.
fn intersect_box(ray: &Ray, ray_t: Interval, min: Vec3, max: Vec3, rec: &mut RayIntersection) -> bool {
    let Some(span) = Aabb::from_corners(min, max).intersect(ray, ray_t) else {
        return false;
    };

    rec.t_near = span.min;
    rec.t_far = span.max;
    rec.point = ray.at(span.min);

    // Normal of the face closest to the entry point
    let half = (max - min) * 0.5;
    let local = (rec.point - (min + half)) / half.max(Vec3::splat(f32::EPSILON));
    let abs = local.abs();
    let outward = if abs.x >= abs.y && abs.x >= abs.z {
        Vec3::new(local.x.signum(), 0.0, 0.0)
    } else if abs.y >= abs.z {
        Vec3::new(0.0, local.y.signum(), 0.0)
    } else {
        Vec3::new(0.0, 0.0, local.z.signum())
    };
    rec.set_face_normal(ray, outward);
    rec.uv = Vec2::ZERO;
    true
}

fn sample_box(u: Vec2, min: Vec3, max: Vec3) -> SurfaceSample {
    let e = max - min;
    let face_areas = [e.y * e.z, e.x * e.z, e.x * e.y];
    let total = 2.0 * (face_areas[0] + face_areas[1] + face_areas[2]);

    // Pick one of the six faces proportionally to area and reuse u.x
    let mut target = u.x * total;
    let mut face = 5;
    for i in 0..6 {
        let area = face_areas[i / 2];
        if target < area {
            face = i;
            break;
        }
        target -= area;
    }
    let face_area = face_areas[face / 2].max(f32::MIN_POSITIVE);
    let ux = (target / face_area).clamp(0.0, 1.0);

    let axis = face / 2;
    let (a, b) = ((axis + 1) % 3, (axis + 2) % 3);
    let mut point = min;
    point[axis] = if face % 2 == 0 { min[axis] } else { max[axis] };
    point[a] = min[a] + ux * e[a];
    point[b] = min[b] + u.y * e[b];
    let mut normal = Vec3::ZERO;
    normal[axis] = if face % 2 == 0 { -1.0 } else { 1.0 };
    SurfaceSample { point, normal }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> (VertexArena, Primitive) {
        let arena = VertexArena::new(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ]);
        let tri = Primitive::new(Shape::Triangle { vertices: [0, 1, 2] }, 0);
        (arena, tri)
    }

    fn hit(prim: &Primitive, arena: &VertexArena, origin: Vec3, dir: Vec3) -> Option<RayIntersection> {
        let mut rec = RayIntersection::default();
        let ray = Ray::new(origin, dir);
        prim.intersect(&ray, Interval::new(0.0, f32::INFINITY), arena, &mut rec)
            .then_some(rec)
    }

    #[test]
    fn test_triangle_hit_at_origin() {
        let (arena, tri) = unit_triangle();
        let rec = hit(&tri, &arena, Vec3::ZERO, Vec3::Z).expect("ray from the vertex must hit");
        assert_eq!(rec.t_near, 0.0);
        assert_eq!(rec.t_far, 0.0);
        assert!((rec.point - Vec3::ZERO).length() < 1e-6);
    }

    #[test]
    fn test_triangle_hit_from_below() {
        let (arena, tri) = unit_triangle();
        let rec = hit(&tri, &arena, Vec3::new(0.0, 0.0, -1.0), Vec3::Z).unwrap();
        assert!((rec.t_near - 1.0).abs() < 1e-6);
        assert!((rec.t_far - 1.0).abs() < 1e-6);

        let rec = hit(&tri, &arena, Vec3::new(0.25, 0.25, -1.0), Vec3::Z).unwrap();
        assert!((rec.t_near - 1.0).abs() < 1e-6);
        // Normal faces the incoming ray
        assert!(rec.normal.dot(Vec3::Z) < 0.0);
    }

    #[test]
    fn test_triangle_parallel_ray_misses() {
        let (arena, tri) = unit_triangle();
        assert!(hit(&tri, &arena, Vec3::new(0.0, -1.0, 0.0), Vec3::Y).is_none());
    }

    #[test]
    fn test_sphere_hit() {
        let arena = VertexArena::default();
        let sphere = Primitive::new(
            Shape::Sphere {
                center: Vec3::new(0.0, 0.0, -1.0),
                radius: 0.5,
            },
            0,
        );
        let rec = hit(&sphere, &arena, Vec3::ZERO, -Vec3::Z).unwrap();
        assert!((rec.t_near - 0.5).abs() < 0.001);
        assert!(rec.front_face);

        assert!(hit(&sphere, &arena, Vec3::new(0.0, 2.0, 0.0), -Vec3::Z).is_none());
    }

    #[test]
    fn test_rectangle_hit_and_miss() {
        let arena = VertexArena::default();
        let rect = Primitive::new(
            Shape::Rectangle {
                corner: Vec3::new(-0.5, -0.5, 0.0),
                edge_u: Vec3::X,
                edge_v: Vec3::Y,
            },
            0,
        );
        let rec = hit(&rect, &arena, Vec3::new(0.25, 0.0, 2.0), -Vec3::Z).unwrap();
        assert!((rec.t_near - 2.0).abs() < 1e-6);
        assert!((rec.uv - Vec2::new(0.75, 0.5)).length() < 1e-6);
        assert!((rect.area(&arena) - 1.0).abs() < 1e-6);

        assert!(hit(&rect, &arena, Vec3::new(0.75, 0.0, 2.0), -Vec3::Z).is_none());
    }

    #[test]
    fn test_box_reports_span() {
        let arena = VertexArena::default();
        let bx = Primitive::new(
            Shape::Box {
                min: Vec3::splat(-0.5),
                max: Vec3::splat(0.5),
            },
            0,
        );
        let rec = hit(&bx, &arena, Vec3::new(0.0, 0.0, -2.0), Vec3::Z).unwrap();
        assert!((rec.t_near - 1.5).abs() < 1e-6);
        assert!((rec.t_far - 2.5).abs() < 1e-6);
        assert!((rec.normal - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);

        // Starting inside: entry is clamped to the start of the interval
        let rec = hit(&bx, &arena, Vec3::ZERO, Vec3::Z).unwrap();
        assert_eq!(rec.t_near, 0.0);
        assert!((rec.t_far - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_samples_lie_on_surface() {
        let (arena, tri) = unit_triangle();
        let mut sampler = narval_math::Sampler::new(3);
        for _ in 0..100 {
            let s = tri.sample(sampler.next_2d(), &arena);
            assert!(s.point.z.abs() < 1e-6);
            assert!(s.point.x >= -1e-6 && s.point.y >= -1e-6 && s.point.x + s.point.y <= 1.0 + 1e-5);

            let bx = Primitive::new(
                Shape::Box {
                    min: Vec3::ZERO,
                    max: Vec3::new(1.0, 2.0, 3.0),
                },
                0,
            );
            let s = bx.sample(sampler.next_2d(), &arena);
            let on_face = (0..3).any(|axis| {
                (s.point[axis] - 0.0).abs() < 1e-5
                    || (s.point[axis] - [1.0, 2.0, 3.0][axis]).abs() < 1e-5
            });
            assert!(on_face, "{:?} is not on the box surface", s.point);
        }
    }
}
