//! Configuration errors raised while a scene is being assembled.
//!
//! These surface at the scene-load boundary. The per-sample hot path never
//! produces them: degenerate numerics there simply end the path.

use narval_math::Vec3;
use thiserror::Error;

/// Errors that can occur while validating scene data and resources.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene description error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown {kind} '{name}'")]
    UnknownResource { kind: &'static str, name: String },

    #[error("Duplicate {kind} '{name}'")]
    DuplicateResource { kind: &'static str, name: String },

    #[error("Texture data has {actual} texels, expected {expected} for {width}x{height}x{depth}")]
    TextureSize {
        width: u32,
        height: u32,
        depth: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Density grid {dims:?} exceeds the 1024 voxels-per-axis limit of the Morton encoding")]
    GridTooLarge { dims: [u32; 3] },

    #[error("Negative density {value} at voxel ({x}, {y}, {z})")]
    NegativeDensity { x: u32, y: u32, z: u32, value: f32 },

    #[error("Medium coefficients must be non-negative (absorption {absorption}, scattering {scattering}, density {density})")]
    NegativeCoefficient {
        absorption: Vec3,
        scattering: Vec3,
        density: f32,
    },

    #[error("Invalid mesh '{name}': {reason}")]
    InvalidMesh { name: String, reason: String },

    #[error("Invalid material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    #[error("No free {kind} slot (capacity {capacity})")]
    RegistryFull { kind: &'static str, capacity: u32 },

    #[error("Invalid handle {handle}")]
    InvalidHandle { handle: u32 },

    #[error("Handle {handle} freed twice")]
    DoubleFree { handle: u32 },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
