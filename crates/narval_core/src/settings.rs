//! Render settings shared by the scene description and the renderer.

use serde::{Deserialize, Serialize};

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Output image size in pixels `[width, height]`
    pub resolution: [u32; 2],
    /// Samples per pixel
    pub spp: u32,
    /// Maximum number of scattering events per path
    pub bounces: u32,
    /// Tile grid `[columns, rows]` the image is split into
    pub tiles: [u32; 2],
    /// Worker thread count
    pub threads: u32,
    /// Root seed; every tile derives its own stream from it
    pub seed: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: [800, 450],
            spp: 16,
            bounces: 8,
            tiles: [40, 10],
            threads: 16,
            seed: 0,
        }
    }
}

impl RenderSettings {
    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    pub fn height(&self) -> u32 {
        self.resolution[1]
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = [width, height];
        self
    }

    pub fn with_spp(mut self, spp: u32) -> Self {
        self.spp = spp;
        self
    }

    pub fn with_bounces(mut self, bounces: u32) -> Self {
        self.bounces = bounces;
        self
    }

    pub fn with_tiles(mut self, columns: u32, rows: u32) -> Self {
        self.tiles = [columns, rows];
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
