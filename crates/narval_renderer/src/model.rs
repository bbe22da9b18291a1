//! Models: a vertex arena, the primitives that index into it and their BVH.

use std::time::Instant;

use narval_core::Mesh;
use narval_math::{Aabb, Interval, Ray, Vec2, Vec3};

use crate::primitive::{MaterialId, Primitive, Shape};
use crate::{Bvh, RayIntersection};

/// Vertex attributes shared by the triangles of a model.
#[derive(Debug, Clone, Default)]
pub struct VertexArena {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    uvs: Option<Vec<Vec2>>,
}

impl VertexArena {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            normals: None,
            uvs: None,
        }
    }

    pub fn from_mesh(mesh: &Mesh) -> Self {
        Self {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            uvs: mesh
                .uvs
                .as_ref()
                .map(|uvs| uvs.iter().map(|&uv| Vec2::from_array(uv)).collect()),
        }
    }

    #[inline]
    pub fn triangle(&self, vertices: [u32; 3]) -> [Vec3; 3] {
        vertices.map(|i| self.positions[i as usize])
    }

    #[inline]
    pub fn normals(&self, vertices: [u32; 3]) -> Option<[Vec3; 3]> {
        self.normals
            .as_ref()
            .map(|normals| vertices.map(|i| normals[i as usize]))
    }

    #[inline]
    pub fn uvs(&self, vertices: [u32; 3]) -> Option<[Vec2; 3]> {
        self.uvs.as_ref().map(|uvs| vertices.map(|i| uvs[i as usize]))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Geometry shared by every instance that references it.
///
/// Immutable once built; instances hold it through an `Arc`.
#[derive(Debug)]
pub struct Model {
    name: String,
    arena: VertexArena,
    primitives: Vec<Primitive>,
    bvh: Bvh,
    bounds: Aabb,
}

impl Model {
    /// Build a model, reordering `primitives` into BVH leaf order.
    pub fn new(name: impl Into<String>, arena: VertexArena, mut primitives: Vec<Primitive>) -> Self {
        let name = name.into();
        let start = Instant::now();
        let bvh = Bvh::build(&mut primitives, |p| p.bounds(&arena));
        let bounds = primitives
            .iter()
            .fold(Aabb::EMPTY, |acc, p| Aabb::surrounding(&acc, &p.bounds(&arena)));

        log::info!(
            "Built BVH for '{}': {} primitives, {} nodes, depth {} in {:.2?}",
            name,
            primitives.len(),
            bvh.node_count(),
            bvh.depth(),
            start.elapsed()
        );

        Self {
            name,
            arena,
            primitives,
            bvh,
            bounds,
        }
    }

    /// One triangle primitive per mesh face, all with the same material.
    pub fn from_mesh(name: impl Into<String>, mesh: &Mesh, material: MaterialId) -> Self {
        let primitives = mesh
            .indices
            .chunks_exact(3)
            .map(|tri| {
                Primitive::new(
                    Shape::Triangle {
                        vertices: [tri[0], tri[1], tri[2]],
                    },
                    material,
                )
            })
            .collect();
        Self::new(name, VertexArena::from_mesh(mesh), primitives)
    }

    /// A model made of one analytic shape.
    pub fn from_shape(name: impl Into<String>, shape: Shape, material: MaterialId) -> Self {
        Self::new(name, VertexArena::default(), vec![Primitive::new(shape, material)])
    }

    /// Closest hit of an object-space ray.
    ///
    /// For box primitives the comparison key is the entry parameter, so a
    /// ray starting inside a medium still reports it.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval, rec: &mut RayIntersection) -> bool {
        let mut candidate = RayIntersection::default();
        self.bvh.intersect(ray, ray_t, |index, range| {
            let primitive = &self.primitives[index];
            if !primitive.intersect(ray, range, &self.arena, &mut candidate) {
                return None;
            }
            candidate.primitive = index;
            *rec = candidate;
            Some(candidate.t_near)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arena(&self) -> &VertexArena {
        &self.arena
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn primitive(&self, index: usize) -> &Primitive {
        &self.primitives[index]
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Model {
        Model::from_mesh("cube", &Mesh::unit_cube(), 0)
    }

    fn trace(model: &Model, origin: Vec3, dir: Vec3) -> Option<RayIntersection> {
        let mut rec = RayIntersection::default();
        model
            .intersect(&Ray::new(origin, dir), Interval::new(0.0, f32::INFINITY), &mut rec)
            .then_some(rec)
    }

    #[test]
    fn test_ray_through_centre_hits() {
        let model = cube();
        let rec = trace(&model, Vec3::new(0.0, 0.0, -5.0), Vec3::Z).expect("must hit the cube");
        assert!((rec.t_near - 4.5).abs() < 1e-5);
        assert!((rec.point.z + 0.5).abs() < 1e-5);
        assert!((rec.normal - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
        assert!(rec.front_face);
    }

    #[test]
    fn test_ray_beside_cube_misses() {
        let model = cube();
        assert!(trace(&model, Vec3::new(3.0, 0.0, -5.0), Vec3::Z).is_none());
        assert!(trace(&model, Vec3::new(0.0, -2.0, -5.0), Vec3::Z).is_none());
    }

    #[test]
    fn test_ray_from_inside_hits_exit_face() {
        let model = cube();
        let rec = trace(&model, Vec3::ZERO, Vec3::Z).expect("must hit the far face");
        assert!((rec.t_near - 0.5).abs() < 1e-5);
        assert!(!rec.front_face);
        // Normal still faces the ray
        assert!(rec.normal.dot(Vec3::Z) < 0.0);
    }

    #[test]
    fn test_closest_of_many_triangles() {
        // A stack of quads along z; the nearest one must win
        let mut positions = Vec::new();
        let mut primitives = Vec::new();
        for layer in 0..20 {
            let z = layer as f32;
            let base = positions.len() as u32;
            positions.extend([
                Vec3::new(-1.0, -1.0, z),
                Vec3::new(1.0, -1.0, z),
                Vec3::new(1.0, 1.0, z),
                Vec3::new(-1.0, 1.0, z),
            ]);
            primitives.push(Primitive::new(Shape::Triangle { vertices: [base, base + 1, base + 2] }, layer));
            primitives.push(Primitive::new(Shape::Triangle { vertices: [base, base + 2, base + 3] }, layer));
        }
        let model = Model::new("stack", VertexArena::new(positions), primitives);

        let rec = trace(&model, Vec3::new(0.1, 0.2, 7.5), Vec3::Z).unwrap();
        assert!((rec.t_near - 0.5).abs() < 1e-5);
        assert_eq!(model.primitive(rec.primitive).material, 8);

        let rec = trace(&model, Vec3::new(0.1, 0.2, 7.5), -Vec3::Z).unwrap();
        assert_eq!(model.primitive(rec.primitive).material, 7);
    }
}
