//! JSON scene description.
//!
//! Mesh and image payloads are never embedded: models and materials refer
//! to entries of a [`ResourceRegistry`] by name.

use std::path::Path;
use std::sync::Arc;

use narval_math::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{ConfigResult, RenderSettings, ResourceRegistry, Texture, TextureName};

/// Top-level scene document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub settings: RenderSettings,
    #[serde(default)]
    pub camera: CameraDescription,
    #[serde(default)]
    pub materials: Vec<MaterialDescription>,
    #[serde(default)]
    pub volumes: Vec<VolumeDescription>,
    #[serde(default)]
    pub models: Vec<ModelDescription>,
    #[serde(default)]
    pub lights: Vec<LightDescription>,
}

impl SceneDescription {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let description: SceneDescription = serde_json::from_str(json)?;
        log::debug!(
            "Parsed scene: {} materials, {} volumes, {} models, {} lights",
            description.materials.len(),
            description.volumes.len(),
            description.models.len(),
            description.lights.len()
        );
        Ok(description)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        log::info!("Loading scene description: {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn material(&self, name: &str) -> Option<&MaterialDescription> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn volume(&self, name: &str) -> Option<&VolumeDescription> {
        self.volumes.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDescription {
    pub look_from: [f32; 3],
    pub look_at: [f32; 3],
    pub up: [f32; 3],
    /// Vertical field of view in degrees
    pub vfov: f32,
    /// Lens aperture diameter; zero gives a pinhole camera
    pub aperture: f32,
    /// Defaults to the look-from/look-at distance
    pub focus_distance: Option<f32>,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            look_from: [0.0, 0.0, 5.0],
            look_at: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            vfov: 40.0,
            aperture: 0.0,
            focus_distance: None,
        }
    }
}

/// Texture bound to one channel of a material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureSlot {
    pub channel: TextureName,
    pub texture: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDescription {
    pub name: String,
    #[serde(flatten)]
    pub kind: MaterialKind,
    #[serde(default)]
    pub textures: Vec<TextureSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialKind {
    Diffuse {
        #[serde(default = "default_albedo")]
        albedo: [f32; 3],
    },
    Glossy {
        #[serde(default = "default_albedo")]
        albedo: [f32; 3],
        #[serde(default = "default_roughness")]
        roughness: f32,
        #[serde(default)]
        metallic: f32,
    },
    Emitter {
        radiance: [f32; 3],
    },
    HomogeneousMedium {
        absorption: [f32; 3],
        scattering: [f32; 3],
        #[serde(default = "default_density")]
        density: f32,
        #[serde(default)]
        phase: PhaseDescription,
    },
    GridMedium {
        absorption: [f32; 3],
        scattering: [f32; 3],
        #[serde(default = "default_density")]
        density: f32,
        #[serde(default)]
        phase: PhaseDescription,
        /// Name of an entry in `volumes`
        volume: String,
    },
}

fn default_albedo() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_roughness() -> f32 {
    0.5
}

fn default_density() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseDescription {
    #[default]
    Isotropic,
    HenyeyGreenstein { g: f32 },
}

/// A scalar density grid mapped onto the unit cube `[-0.5, 0.5]^3`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDescription {
    pub name: String,
    pub resolution: [u32; 3],
    #[serde(flatten)]
    pub source: VolumeSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VolumeSource {
    /// Values listed x-fastest
    Inline { values: Vec<f32> },
    Constant { value: f32 },
    /// A ball of constant density inscribed in the cube
    Sphere { value: f32 },
    /// A 3D texture registered by the importer; `resolution` is ignored
    Texture { texture: String },
}

impl VolumeDescription {
    /// Produce the density texture, voxelising procedural sources.
    pub fn to_texture(&self, registry: &ResourceRegistry) -> ConfigResult<Arc<Texture>> {
        let [w, h, d] = self.resolution;
        let count = w as usize * h as usize * d as usize;
        let values = match &self.source {
            VolumeSource::Texture { texture } => return registry.texture(texture),
            VolumeSource::Inline { values } => values.clone(),
            VolumeSource::Constant { value } => vec![*value; count],
            VolumeSource::Sphere { value } => {
                let dims = Vec3::new(w as f32, h as f32, d as f32);
                let mut values = Vec::with_capacity(count);
                for z in 0..d {
                    for y in 0..h {
                        for x in 0..w {
                            let centre = (Vec3::new(x as f32, y as f32, z as f32) + 0.5) / dims - 0.5;
                            values.push(if centre.length() <= 0.5 { *value } else { 0.0 });
                        }
                    }
                }
                values
            }
        };
        Ok(Arc::new(Texture::from_density(self.resolution, &values)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescription {
    #[serde(default)]
    pub name: Option<String>,
    pub shape: ShapeDescription,
    pub material: String,
    #[serde(default)]
    pub transform: TransformDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescription {
    /// Registered mesh
    Mesh { name: String },
    /// Unit cube centred at the origin. With a medium material it becomes
    /// the medium's bounding box.
    Cube,
    Sphere {
        #[serde(default = "default_radius")]
        radius: f32,
    },
    /// Rectangle in the XY plane centred at the origin, facing +z
    Rectangle { width: f32, height: f32 },
    Triangle { vertices: [[f32; 3]; 3] },
    Point,
}

fn default_radius() -> f32 {
    0.5
}

/// Scale, rotate, then translate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDescription {
    pub translation: [f32; 3],
    /// XYZ Euler angles in degrees
    pub rotation_degrees: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for TransformDescription {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation_degrees: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl TransformDescription {
    pub fn to_matrix(&self) -> Mat4 {
        let [rx, ry, rz] = self.rotation_degrees;
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            rx.to_radians(),
            ry.to_radians(),
            rz.to_radians(),
        );
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            rotation,
            Vec3::from_array(self.translation),
        )
    }
}

/// Lights with no geometry. Area lights come from emitter materials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LightDescription {
    Directional {
        /// Direction the light travels in
        direction: [f32; 3],
        radiance: [f32; 3],
    },
    Infinite {
        #[serde(default = "default_sky")]
        radiance: [f32; 3],
        /// Latitude-longitude environment map
        #[serde(default)]
        texture: Option<String>,
    },
}

fn default_sky() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    const SCENE: &str = r#"{
        "settings": { "resolution": [64, 32], "spp": 2 },
        "camera": { "look_from": [0, 1, 4], "look_at": [0, 0, 0], "vfov": 35 },
        "materials": [
            { "name": "smoke", "type": "homogeneous_medium",
              "absorption": [0, 0, 0], "scattering": [1, 1, 1],
              "phase": { "type": "henyey_greenstein", "g": 0.3 } },
            { "name": "lamp", "type": "emitter", "radiance": [4, 4, 4] },
            { "name": "floor", "type": "glossy", "roughness": 0.2,
              "textures": [{ "channel": "albedo", "texture": "wood" }] }
        ],
        "volumes": [
            { "name": "ball", "resolution": [4, 4, 4], "source": "sphere", "value": 2.0 }
        ],
        "models": [
            { "shape": { "type": "cube" }, "material": "smoke" },
            { "shape": { "type": "rectangle", "width": 1, "height": 1 }, "material": "lamp",
              "transform": { "translation": [0, 2, 0], "rotation_degrees": [90, 0, 0] } }
        ],
        "lights": [ { "type": "infinite" } ]
    }"#;

    #[test]
    fn test_parse_scene() {
        let scene = SceneDescription::from_json_str(SCENE).unwrap();
        assert_eq!(scene.settings.resolution, [64, 32]);
        assert_eq!(scene.settings.bounces, 8);
        assert_eq!(scene.camera.up, [0.0, 1.0, 0.0]);
        assert_eq!(scene.models.len(), 2);

        match &scene.material("smoke").unwrap().kind {
            MaterialKind::HomogeneousMedium { density, phase, .. } => {
                assert_eq!(*density, 1.0);
                assert_eq!(*phase, PhaseDescription::HenyeyGreenstein { g: 0.3 });
            }
            other => panic!("unexpected material {other:?}"),
        }
        let floor = scene.material("floor").unwrap();
        assert_eq!(floor.textures[0].channel, TextureName::Albedo);
        assert!(matches!(
            scene.lights[0],
            LightDescription::Infinite { texture: None, .. }
        ));
    }

    #[test]
    fn test_bad_json_is_a_config_error() {
        assert!(matches!(
            SceneDescription::from_json_str("{ \"models\": 3 }"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_sphere_volume_voxelisation() {
        let scene = SceneDescription::from_json_str(SCENE).unwrap();
        let grid = scene
            .volume("ball")
            .unwrap()
            .to_texture(&ResourceRegistry::new())
            .unwrap();
        assert_eq!(grid.dims(), [4, 4, 4]);
        // Corner voxels lie outside the ball, central ones inside
        assert_eq!(grid.sample_at_index(0, 0, 0).x, 0.0);
        assert_eq!(grid.sample_at_index(1, 2, 1).x, 2.0);
    }

    #[test]
    fn test_transform_is_srt() {
        let transform = TransformDescription {
            translation: [1.0, 0.0, 0.0],
            rotation_degrees: [0.0, 90.0, 0.0],
            scale: [2.0, 2.0, 2.0],
        };
        let p = transform.to_matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(1.0, 0.0, -2.0)).length() < 1e-4);
    }
}
