//! Narval Renderer - CPU volumetric path tracing.
//!
//! A Monte Carlo light-transport core for scenes mixing surfaces and
//! participating media:
//!
//! - **Geometry**: triangles, spheres, rectangles and medium boxes grouped
//!   into shared models, placed by instances, accelerated by a two-level BVH
//! - **Media**: homogeneous media and sparse density grids indexed by a
//!   bucketed linear BVH, sampled with delta and ratio tracking
//! - **Shading**: GGX glossy and Lambertian BSDFs, isotropic and
//!   Henyey-Greenstein phase functions, area, directional and environment
//!   lights combined with multiple importance sampling
//! - **Rendering**: a tile scheduler on a rayon pool with per-tile seeded
//!   samplers, and 16-bit PPM / PNG output
//!
//! # Example
//!
//! ```ignore
//! use narval_core::{ResourceRegistry, SceneDescription};
//! use narval_renderer::{render_scene, SceneBuilder};
//!
//! let registry = ResourceRegistry::new();
//! let description = SceneDescription::from_path("scene.json")?;
//! let scene = SceneBuilder::new(&registry).build(&description)?;
//! render_scene(&scene)?.save_ppm("out.ppm")?;
//! ```

mod builder;
mod bvh;
mod bxdf;
mod camera;
mod error;
mod image_buffer;
mod instance;
mod integrator;
mod intersection;
mod material;
mod render;

pub mod bucket_lbvh;
pub mod light;
pub mod medium;
pub mod model;
pub mod primitive;
pub mod scene;

pub use bucket_lbvh::{BucketLbvh, TraversalHit, TreeMode};
pub use builder::SceneBuilder;
pub use bvh::Bvh;
pub use bxdf::{Bsdf, BxdfType, GlossyBsdf, HenyeyGreenstein, LambertianBsdf};
pub use camera::Camera;
pub use error::{RenderError, RenderResult};
pub use image_buffer::{color_to_rgba, linear_to_gamma, ImageBuffer};
pub use instance::InstancedModel;
pub use integrator::{Integrator, VolumetricPathIntegrator};
pub use intersection::RayIntersection;
pub use light::{DiffuseLight, DirectionalLight, InfiniteAreaLight, Light, LightSample};
pub use material::Material;
pub use medium::{GridMedium, HomogeneousMedium, Medium, SampleOutcome};
pub use model::{Model, VertexArena};
pub use primitive::{MaterialId, Primitive, Shape};
pub use render::{generate_tiles, render, render_scene, render_tile, Tile, TileOutput};
pub use scene::{Scene, SHADOW_EPSILON};

/// Re-export the math types used throughout the public API
pub use narval_math::{Aabb, Interval, Ray, Sampler, Vec3};
