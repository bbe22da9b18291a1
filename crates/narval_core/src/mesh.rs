//! Mesh geometry handed to the core by the asset importer.
//!
//! The core never decodes mesh files; it receives already populated
//! position/index buffers and turns them into BVH-backed models.

use narval_math::{Aabb, Vec3};

use crate::{ConfigError, ConfigResult};

/// A triangle mesh: vertex positions, optional per-vertex normals and UVs,
/// and triangle indices (every 3 indices form a counter-clockwise triangle).
#[derive(Clone, Debug)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    /// Same length as `positions` when present.
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
    /// Bounds of `positions`, computed once at construction.
    pub bounds: Aabb,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            normals,
            uvs: None,
            indices,
            bounds,
        }
    }

    /// Attach UV coordinates.
    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// Axis-aligned cube `[-0.5, 0.5]^3` built from 12 outward-facing triangles.
    pub fn unit_cube() -> Self {
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { -0.5 } else { 0.5 },
                    if i & 2 == 0 { -0.5 } else { 0.5 },
                    if i & 4 == 0 { -0.5 } else { 0.5 },
                )
            })
            .collect();
        let indices = vec![
            0, 4, 6, 0, 6, 2, // -x
            1, 3, 7, 1, 7, 5, // +x
            0, 1, 5, 0, 5, 4, // -y
            2, 6, 7, 2, 7, 3, // +y
            0, 2, 3, 0, 3, 1, // -z
            4, 5, 7, 4, 7, 6, // +z
        ];
        Self::new(positions, indices, None)
    }

    /// Unit square in the XY plane, centred at the origin, facing +z.
    pub fn unit_quad() -> Self {
        let positions = vec![
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ];
        Self::new(positions, vec![0, 1, 2, 0, 2, 3], None)
            .with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
    }

    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        match positions.split_first() {
            Some((&first, rest)) => {
                let (min, max) = rest.iter().fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
                Aabb::from_points(min, max)
            }
            None => Aabb::EMPTY,
        }
    }

    /// Check the index buffer and attribute lengths.
    pub fn validate(&self, name: &str) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::InvalidMesh {
            name: name.to_string(),
            reason,
        };

        if self.indices.is_empty() {
            return Err(invalid("no triangles".to_string()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(invalid(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= self.positions.len()) {
            return Err(invalid(format!(
                "index {bad} out of range for {} vertices",
                self.positions.len()
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                return Err(invalid("normal count does not match vertex count".to_string()));
            }
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != self.positions.len() {
                return Err(invalid("uv count does not match vertex count".to_string()));
            }
        }
        Ok(())
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_creation() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let mesh = Mesh::new(positions, vec![0, 1, 2], None);

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert!(mesh.validate("tri").is_ok());
    }

    #[test]
    fn test_unit_cube_faces_point_outward() {
        let cube = Mesh::unit_cube();
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.validate("cube").is_ok());

        for tri in cube.indices.chunks(3) {
            let p0 = cube.positions[tri[0] as usize];
            let p1 = cube.positions[tri[1] as usize];
            let p2 = cube.positions[tri[2] as usize];
            let normal = (p1 - p0).cross(p2 - p0);
            let centroid = (p0 + p1 + p2) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "triangle {tri:?} faces inward");
        }
    }

    #[test]
    fn test_bounds_computation() {
        let positions = vec![
            Vec3::new(-1.0, -2.0, -3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let mesh = Mesh::new(positions, vec![0, 1, 2], None);

        assert!((mesh.bounds.min() - Vec3::new(-1.0, -2.0, -3.0)).length() < 0.001);
        assert!((mesh.bounds.max() - Vec3::new(4.0, 5.0, 6.0)).length() < 0.001);
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 3], None);
        assert!(matches!(
            mesh.validate("broken"),
            Err(ConfigError::InvalidMesh { .. })
        ));

        let mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X], vec![0, 1], None);
        assert!(mesh.validate("short").is_err());
    }
}
