//! Texel storage for material channels and density grids.
//!
//! Textures arrive already decoded (linear RGBA floats); the core only
//! samples them.

use narval_math::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Semantic tag of a material texture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureName {
    Albedo,
    Roughness,
    Metallic,
    Emission,
    Normal,
    Density,
}

/// A 1-, 2- or 3-dimensional texture.
///
/// Texels are stored x-fastest, then y, then z. A 2D image has `depth == 1`.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub depth: u32,

    /// Linear RGBA texels
    pub pixels: Vec<[f32; 4]>,
}

impl Texture {
    /// Create a texture, checking that the texel count matches the dimensions.
    pub fn new(width: u32, height: u32, depth: u32, pixels: Vec<[f32; 4]>) -> ConfigResult<Self> {
        let expected = width as usize * height as usize * depth as usize;
        if expected == 0 || pixels.len() != expected {
            return Err(ConfigError::TextureSize {
                width,
                height,
                depth,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            pixels,
        })
    }

    /// Build a scalar density grid. The value is replicated into RGB.
    ///
    /// Negative samples are rejected.
    pub fn from_density(dims: [u32; 3], values: &[f32]) -> ConfigResult<Self> {
        let [w, h, d] = dims;
        let pixels = values.iter().map(|&v| [v, v, v, 1.0]).collect();
        let grid = Self::new(w, h, d, pixels)?;
        grid.validate_density()?;
        Ok(grid)
    }

    /// Checks that the first channel can serve as a density grid: no texel
    /// may be negative or NaN.
    pub fn validate_density(&self) -> ConfigResult<()> {
        let bad = self
            .pixels
            .iter()
            .position(|p| p[0] < 0.0 || p[0].is_nan());
        match bad {
            Some(i) => {
                let i = i as u32;
                Err(ConfigError::NegativeDensity {
                    x: i % self.width,
                    y: (i / self.width) % self.height,
                    z: i / (self.width * self.height),
                    value: self.pixels[i as usize][0],
                })
            }
            None => Ok(()),
        }
    }

    /// Create a solid color texture (1x1x1).
    pub fn solid_color(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            pixels: vec![[color.x, color.y, color.z, 1.0]],
        }
    }

    pub fn dims(&self) -> [u32; 3] {
        [self.width, self.height, self.depth]
    }

    /// Direct texel fetch; out-of-range coordinates read as zero.
    pub fn sample_at_index(&self, x: u32, y: u32, z: u32) -> Vec4 {
        if x >= self.width || y >= self.height || z >= self.depth {
            return Vec4::ZERO;
        }
        Vec4::from_array(self.pixels[self.index(x, y, z)])
    }

    /// Bilinear lookup on the first slice with clamp-to-edge addressing.
    ///
    /// `v` grows with the row index.
    pub fn sample(&self, u: f32, v: f32) -> Vec4 {
        let x = (u * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let y = (v * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.texel(x0, y0, 0).lerp(self.texel(x1, y0, 0), fx);
        let bottom = self.texel(x0, y1, 0).lerp(self.texel(x1, y1, 0), fx);
        top.lerp(bottom, fy)
    }

    /// Trilinear lookup over cell-centred samples. Outside the grid the
    /// texture reads zero, so the reconstruction fades out over the last
    /// half voxel.
    pub fn sample_3d(&self, u: f32, v: f32, w: f32) -> Vec4 {
        let p = Vec3::new(
            u * self.width as f32 - 0.5,
            v * self.height as f32 - 0.5,
            w * self.depth as f32 - 0.5,
        );
        let base = p.floor();
        let f = p - base;
        let (bx, by, bz) = (base.x as i64, base.y as i64, base.z as i64);

        let mut result = Vec4::ZERO;
        for corner in 0..8 {
            let dx = corner & 1;
            let dy = (corner >> 1) & 1;
            let dz = (corner >> 2) & 1;
            let weight = if dx == 1 { f.x } else { 1.0 - f.x }
                * if dy == 1 { f.y } else { 1.0 - f.y }
                * if dz == 1 { f.z } else { 1.0 - f.z };
            if weight == 0.0 {
                continue;
            }
            result += self.signed_texel(bx + dx, by + dy, bz + dz) * weight;
        }
        result
    }

    /// Scalar density at normalised coordinates (red channel).
    pub fn density(&self, p: Vec3) -> f32 {
        self.sample_3d(p.x, p.y, p.z).x
    }

    /// Largest value of one channel over all texels.
    pub fn max_channel(&self, channel: usize) -> f32 {
        self.pixels
            .iter()
            .map(|p| p[channel.min(3)])
            .fold(0.0, f32::max)
    }

    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (z as usize * self.height as usize + y as usize) * self.width as usize + x as usize
    }

    fn texel(&self, x: u32, y: u32, z: u32) -> Vec4 {
        Vec4::from_array(self.pixels[self.index(x, y, z)])
    }

    fn signed_texel(&self, x: i64, y: i64, z: i64) -> Vec4 {
        if x < 0 || y < 0 || z < 0 {
            return Vec4::ZERO;
        }
        self.sample_at_index(x as u32, y as u32, z as u32)
    }
}
