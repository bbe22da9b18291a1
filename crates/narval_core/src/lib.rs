//! Narval Core - scene data and configuration for the light-transport core.
//!
//! This crate provides:
//!
//! - **Resources**: `Mesh`, `Texture`, and the name-keyed `ResourceRegistry`
//! - **Configuration**: `RenderSettings` and the JSON `SceneDescription`
//! - **Error policy**: `ConfigError` and the `FailurePolicy` switch between
//!   aborting and best-effort scene loads
//!
//! # Example
//!
//! ```ignore
//! use narval_core::{Mesh, ResourceRegistry, SceneDescription};
//!
//! let mut registry = ResourceRegistry::new();
//! registry.add_mesh("cube", Mesh::unit_cube())?;
//! let description = SceneDescription::from_path("scene.json")?;
//! ```

mod error;
mod policy;

pub mod description;
pub mod handle;
pub mod mesh;
pub mod registry;
pub mod settings;
pub mod texture;

// Re-export commonly used types
pub use description::{
    CameraDescription, LightDescription, MaterialDescription, MaterialKind, ModelDescription,
    PhaseDescription, SceneDescription, ShapeDescription, TextureSlot, TransformDescription,
    VolumeDescription, VolumeSource,
};
pub use error::{ConfigError, ConfigResult};
pub use handle::{HandleAllocator, INVALID_HANDLE};
pub use mesh::Mesh;
pub use policy::FailurePolicy;
pub use registry::ResourceRegistry;
pub use settings::RenderSettings;
pub use texture::{Texture, TextureName};
