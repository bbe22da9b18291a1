//! Build phase: turn a [`SceneDescription`] into an immutable [`Scene`].
//!
//! Acceleration structures and media are constructed here, once, before any
//! rendering starts. Recoverable problems go through the builder's
//! [`FailurePolicy`]; precondition violations in the data itself (negative
//! densities, oversized grids, negative coefficients) always abort.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use narval_core::{
    ConfigError, ConfigResult, FailurePolicy, LightDescription, MaterialDescription, MaterialKind, Mesh,
    ModelDescription, PhaseDescription, ResourceRegistry, SceneDescription, ShapeDescription,
};
use narval_math::Vec3;

use crate::bucket_lbvh::TreeMode;
use crate::light::{DirectionalLight, InfiniteAreaLight};
use crate::model::VertexArena;
use crate::primitive::{MaterialId, Primitive, Shape};
use crate::{
    Bsdf, Camera, GridMedium, HenyeyGreenstein, HomogeneousMedium, InstancedModel, Light, Material, Medium,
    Model, Scene,
};

/// Assembles scenes from descriptions and registered resources.
#[derive(Debug, Clone)]
pub struct SceneBuilder<'a> {
    registry: &'a ResourceRegistry,
    policy: FailurePolicy,
    tree_mode: TreeMode,
}

/// Materials under construction plus the lazily added fallback.
struct MaterialTable {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
    fallback: Option<MaterialId>,
}

impl MaterialTable {
    fn fallback(&mut self) -> MaterialId {
        *self.fallback.get_or_insert_with(|| {
            self.materials.push(Material::fallback());
            self.materials.len() - 1
        })
    }
}

impl<'a> SceneBuilder<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self {
            registry,
            policy: FailurePolicy::default(),
            tree_mode: TreeMode::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Branching of the density-grid indices built for grid media.
    pub fn with_tree_mode(mut self, mode: TreeMode) -> Self {
        self.tree_mode = mode;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn build(&self, description: &SceneDescription) -> ConfigResult<Scene> {
        let start = Instant::now();

        let mut table = MaterialTable {
            materials: Vec::with_capacity(description.materials.len()),
            by_name: HashMap::new(),
            fallback: None,
        };
        for material in &description.materials {
            if table.by_name.contains_key(&material.name) {
                let error = ConfigError::DuplicateResource {
                    kind: "material",
                    name: material.name.clone(),
                };
                self.policy.recover(error, "the first definition")?;
                continue;
            }
            let id = match self.build_material(material, description)? {
                Some(built) => {
                    table.materials.push(built);
                    table.materials.len() - 1
                }
                None => table.fallback(),
            };
            table.by_name.insert(material.name.clone(), id);
        }

        let mut cache: HashMap<(String, MaterialId), Arc<Model>> = HashMap::new();
        let mut instances = Vec::with_capacity(description.models.len());
        for model in &description.models {
            let material = match table.by_name.get(&model.material) {
                Some(&id) => id,
                None => {
                    let error = ConfigError::UnknownResource {
                        kind: "material",
                        name: model.material.clone(),
                    };
                    self.policy.recover(error, "a grey diffuse material")?;
                    table.fallback()
                }
            };

            let Some(built) = self.build_model(model, material, &mut table, &mut cache)? else {
                continue;
            };
            instances.push(InstancedModel::new(built, model.transform.to_matrix()));
        }

        let mut lights = Vec::with_capacity(description.lights.len());
        for light in &description.lights {
            lights.push(self.build_light(light)?);
        }

        let settings = description.settings.clone();
        let camera = Camera::from_description(&description.camera, settings.width(), settings.height());
        let scene = Scene::new(settings, camera, instances, table.materials, lights);
        log::info!("Scene built in {:.2?}", start.elapsed());
        Ok(scene)
    }

    /// Returns `None` when the material could not be built and the policy
    /// asks for the fallback instead.
    fn build_material(
        &self,
        description: &MaterialDescription,
        scene: &SceneDescription,
    ) -> ConfigResult<Option<Material>> {
        let name = description.name.as_str();
        let mut material = match &description.kind {
            MaterialKind::Diffuse { albedo } => Material::lambertian(name, Vec3::from_array(*albedo)),
            MaterialKind::Glossy {
                albedo,
                roughness,
                metallic,
            } => Material::glossy(name, Vec3::from_array(*albedo), *roughness, *metallic),
            MaterialKind::Emitter { radiance } => Material::emitter(name, Vec3::from_array(*radiance)),
            MaterialKind::HomogeneousMedium {
                absorption,
                scattering,
                density,
                phase,
            } => {
                let (absorption, scattering) = coefficients(name, *absorption, *scattering, *density)?;
                Material::medium(
                    name,
                    Medium::Homogeneous(HomogeneousMedium::new(absorption, scattering, *density)?),
                    phase_function(*phase),
                )
            }
            MaterialKind::GridMedium {
                absorption,
                scattering,
                density,
                phase,
                volume,
            } => {
                let (absorption, scattering) = coefficients(name, *absorption, *scattering, *density)?;
                let grid = match scene.volume(volume) {
                    Some(volume) => match volume.to_texture(self.registry) {
                        Ok(grid) => grid,
                        Err(error @ ConfigError::UnknownResource { .. }) => {
                            self.policy.recover(error, "a grey diffuse material")?;
                            return Ok(None);
                        }
                        Err(error) => return Err(error),
                    },
                    None => {
                        let error = ConfigError::UnknownResource {
                            kind: "volume",
                            name: volume.clone(),
                        };
                        self.policy.recover(error, "a grey diffuse material")?;
                        return Ok(None);
                    }
                };
                let medium = GridMedium::with_tree_mode(grid, absorption, scattering, *density, self.tree_mode)?;
                Material::medium(name, Medium::Grid(medium), phase_function(*phase))
            }
        };

        for slot in &description.textures {
            match self.registry.texture(&slot.texture) {
                Ok(texture) => material = material.with_texture(slot.channel, texture),
                Err(error) => self.policy.recover(error, "the flat material colour")?,
            }
        }
        Ok(Some(material))
    }

    /// Shared model for a shape/material pair. `None` skips the instance.
    fn build_model(
        &self,
        description: &ModelDescription,
        mut material: MaterialId,
        table: &mut MaterialTable,
        cache: &mut HashMap<(String, MaterialId), Arc<Model>>,
    ) -> ConfigResult<Option<Arc<Model>>> {
        let is_medium = table.materials[material].is_medium();
        if is_medium && !matches!(description.shape, ShapeDescription::Cube) {
            let error = ConfigError::InvalidMaterial {
                name: table.materials[material].name.clone(),
                reason: "participating media can only fill a cube".to_string(),
            };
            self.policy.recover(error, "a grey diffuse material")?;
            material = table.fallback();
        }
        let is_medium = table.materials[material].is_medium();
        let name = description
            .name
            .clone()
            .unwrap_or_else(|| shape_key(&description.shape));

        let key = (shape_key(&description.shape), material);
        if let Some(model) = cache.get(&key) {
            return Ok(Some(Arc::clone(model)));
        }

        let model = match &description.shape {
            ShapeDescription::Mesh { name: mesh } => match self.registry.mesh(mesh) {
                Ok(mesh) => Model::from_mesh(name, &mesh, material),
                Err(error) => {
                    self.policy.recover(error, "no geometry")?;
                    return Ok(None);
                }
            },
            ShapeDescription::Cube if is_medium => Model::from_shape(
                name,
                Shape::Box {
                    min: Vec3::splat(-0.5),
                    max: Vec3::splat(0.5),
                },
                material,
            ),
            ShapeDescription::Cube => Model::from_mesh(name, &Mesh::unit_cube(), material),
            ShapeDescription::Sphere { radius } => Model::from_shape(
                name,
                Shape::Sphere {
                    center: Vec3::ZERO,
                    radius: *radius,
                },
                material,
            ),
            ShapeDescription::Rectangle { width, height } => Model::from_shape(
                name,
                Shape::Rectangle {
                    corner: Vec3::new(-0.5 * width, -0.5 * height, 0.0),
                    edge_u: Vec3::new(*width, 0.0, 0.0),
                    edge_v: Vec3::new(0.0, *height, 0.0),
                },
                material,
            ),
            ShapeDescription::Triangle { vertices } => Model::new(
                name,
                VertexArena::new(vertices.iter().map(|&v| Vec3::from_array(v)).collect()),
                vec![Primitive::new(Shape::Triangle { vertices: [0, 1, 2] }, material)],
            ),
            ShapeDescription::Point => {
                if !table.materials[material].is_emitter() {
                    log::warn!("Point model '{}' is not an emitter and will be invisible", name);
                }
                Model::from_shape(name, Shape::Point { position: Vec3::ZERO }, material)
            }
        };

        let model = Arc::new(model);
        cache.insert(key, Arc::clone(&model));
        Ok(Some(model))
    }

    fn build_light(&self, description: &LightDescription) -> ConfigResult<Light> {
        Ok(match description {
            LightDescription::Directional { direction, radiance } => Light::Directional(DirectionalLight::new(
                Vec3::from_array(*direction),
                Vec3::from_array(*radiance),
            )),
            LightDescription::Infinite { radiance, texture } => {
                let map = match texture {
                    Some(name) => match self.registry.texture(name) {
                        Ok(map) => Some(map),
                        Err(error) => {
                            self.policy.recover(error, "a constant sky")?;
                            None
                        }
                    },
                    None => None,
                };
                Light::Infinite(InfiniteAreaLight::new(Vec3::from_array(*radiance), map))
            }
        })
    }
}

/// Cache key of a shape; triangles carry their corners.
fn shape_key(shape: &ShapeDescription) -> String {
    match shape {
        ShapeDescription::Mesh { name } => format!("mesh:{name}"),
        ShapeDescription::Cube => "cube".to_string(),
        ShapeDescription::Sphere { radius } => format!("sphere:{radius}"),
        ShapeDescription::Rectangle { width, height } => format!("rectangle:{width}x{height}"),
        ShapeDescription::Triangle { vertices } => format!("triangle:{vertices:?}"),
        ShapeDescription::Point => "point".to_string(),
    }
}

fn phase_function(phase: PhaseDescription) -> Bsdf {
    match phase {
        PhaseDescription::Isotropic => Bsdf::Isotropic,
        PhaseDescription::HenyeyGreenstein { g } => Bsdf::HenyeyGreenstein(HenyeyGreenstein::new(g)),
    }
}

/// Medium coefficients must keep the extinction non-negative.
fn coefficients(name: &str, absorption: [f32; 3], scattering: [f32; 3], density: f32) -> ConfigResult<(Vec3, Vec3)> {
    let absorption = Vec3::from_array(absorption);
    let scattering = Vec3::from_array(scattering);
    if absorption.min_element() < 0.0 || scattering.min_element() < 0.0 || density < 0.0 {
        return Err(ConfigError::InvalidMaterial {
            name: name.to_string(),
            reason: "absorption, scattering and density must be non-negative".to_string(),
        });
    }
    Ok((absorption, scattering))
}

#[cfg(test)]
mod tests {
    use super::*;
    use narval_core::Texture;

    const SCENE: &str = r#"{
        "settings": { "resolution": [16, 8], "spp": 2 },
        "materials": [
            { "name": "floor", "type": "diffuse", "albedo": [0.8, 0.8, 0.8] },
            { "name": "lamp", "type": "emitter", "radiance": [5.0, 5.0, 5.0] },
            { "name": "fog", "type": "grid_medium", "absorption": [0, 0, 0], "scattering": [1, 1, 1],
              "volume": "ball", "phase": { "type": "henyey_greenstein", "g": 0.3 } }
        ],
        "volumes": [ { "name": "ball", "resolution": [8, 8, 8], "source": "sphere", "value": 1.0 } ],
        "models": [
            { "shape": { "type": "mesh", "name": "floor_mesh" }, "material": "floor" },
            { "shape": { "type": "cube" }, "material": "fog" },
            { "shape": { "type": "rectangle", "width": 1, "height": 1 }, "material": "lamp",
              "transform": { "translation": [0, 2, 0], "rotation_degrees": [90, 0, 0] } },
            { "shape": { "type": "cube" }, "material": "floor",
              "transform": { "translation": [3, 0, 0] } },
            { "shape": { "type": "cube" }, "material": "floor",
              "transform": { "translation": [-3, 0, 0] } }
        ],
        "lights": [ { "type": "infinite", "radiance": [0.1, 0.1, 0.1] } ]
    }"#;

    fn registry() -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        registry.add_mesh("floor_mesh", Mesh::unit_quad()).unwrap();
        registry
    }

    #[test]
    fn test_build_full_scene() {
        let registry = registry();
        let description = SceneDescription::from_json_str(SCENE).unwrap();
        let scene = SceneBuilder::new(&registry).build(&description).unwrap();

        assert_eq!(scene.instances().len(), 5);
        assert_eq!(scene.materials().len(), 3);
        // Environment plus one area light for the lamp
        assert_eq!(scene.lights().len(), 2);
        assert!(scene.materials().iter().any(|m| m.is_medium()));
        assert_eq!(scene.camera.image_width, 16);

        // Both floor cubes share one model
        let cubes: Vec<_> = scene
            .instances()
            .iter()
            .filter(|i| i.model().primitives().len() == 12)
            .collect();
        assert_eq!(cubes.len(), 2);
        assert!(Arc::ptr_eq(cubes[0].model(), cubes[1].model()));

        // The medium cube is a single box primitive
        assert!(scene
            .instances()
            .iter()
            .any(|i| i.model().primitives().len() == 1 && i.model().primitive(0).is_volume()));
    }

    #[test]
    fn test_unknown_material_strict_and_lenient() {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = registry();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.models[0].material = "marble".to_string();

        let err = SceneBuilder::new(&registry).build(&description).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownResource { kind: "material", .. }));

        let scene = SceneBuilder::new(&registry)
            .with_policy(FailurePolicy::Lenient)
            .build(&description)
            .unwrap();
        assert_eq!(scene.instances().len(), 5);
        assert!(scene.materials().iter().any(|m| m.name == "fallback"));
    }

    #[test]
    fn test_missing_texture_slot() {
        let registry = registry();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.materials[0].textures.push(narval_core::TextureSlot {
            channel: narval_core::TextureName::Albedo,
            texture: "wood".to_string(),
        });

        assert!(SceneBuilder::new(&registry).build(&description).is_err());
        let scene = SceneBuilder::new(&registry)
            .with_policy(FailurePolicy::Lenient)
            .build(&description)
            .unwrap();
        let floor = scene.materials().iter().find(|m| m.name == "floor").unwrap();
        assert!(floor.texture(narval_core::TextureName::Albedo).is_none());
    }

    #[test]
    fn test_missing_volume_falls_back() {
        let registry = registry();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.volumes.clear();

        let err = SceneBuilder::new(&registry).build(&description).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownResource { kind: "volume", .. }));

        let scene = SceneBuilder::new(&registry)
            .with_policy(FailurePolicy::Lenient)
            .build(&description)
            .unwrap();
        assert!(!scene.materials().iter().any(|m| m.is_medium()));
    }

    #[test]
    fn test_negative_density_is_fatal_even_when_lenient() {
        let registry = registry();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.volumes[0].source = narval_core::VolumeSource::Inline {
            values: {
                let mut values = vec![0.5; 512];
                values[17] = -1.0;
                values
            },
        };
        let err = SceneBuilder::new(&registry)
            .with_policy(FailurePolicy::Lenient)
            .build(&description)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NegativeDensity { .. }));
    }

    #[test]
    fn test_oversized_volume_texture() {
        let mut registry = registry();
        registry
            .add_texture("huge", Texture::new(2048, 1, 1, vec![[1.0; 4]; 2048]).unwrap())
            .unwrap();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.volumes[0].source = narval_core::VolumeSource::Texture {
            texture: "huge".to_string(),
        };
        let err = SceneBuilder::new(&registry)
            .with_policy(FailurePolicy::Lenient)
            .build(&description)
            .unwrap_err();
        assert!(matches!(err, ConfigError::GridTooLarge { .. }));
    }

    #[test]
    fn test_registered_volume_with_negative_texel() {
        let mut registry = registry();
        let mut pixels = vec![[0.5; 4]; 8];
        pixels[7] = [-1.0, -1.0, -1.0, 1.0];
        registry
            .add_texture("scan", Texture::new(2, 2, 2, pixels).unwrap())
            .unwrap();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.volumes[0].source = narval_core::VolumeSource::Texture {
            texture: "scan".to_string(),
        };
        let err = SceneBuilder::new(&registry)
            .with_policy(FailurePolicy::Lenient)
            .build(&description)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NegativeDensity { x: 1, y: 1, z: 1, .. }));
    }

    #[test]
    fn test_medium_on_sphere_is_rejected() {
        let registry = registry();
        let mut description = SceneDescription::from_json_str(SCENE).unwrap();
        description.models[1].shape = ShapeDescription::Sphere { radius: 1.0 };
        let err = SceneBuilder::new(&registry).build(&description).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaterial { .. }));
    }

    #[test]
    fn test_binary_tree_mode() {
        let registry = registry();
        let description = SceneDescription::from_json_str(SCENE).unwrap();
        let scene = SceneBuilder::new(&registry)
            .with_tree_mode(TreeMode::Binary)
            .build(&description)
            .unwrap();
        let grid = scene
            .materials()
            .iter()
            .find_map(|m| match &m.medium {
                Some(Medium::Grid(grid)) => Some(grid),
                _ => None,
            })
            .expect("fog is a grid medium");
        assert_eq!(grid.lbvh().branching(), 2);
    }
}
