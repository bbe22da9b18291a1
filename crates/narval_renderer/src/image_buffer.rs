//! Linear HDR render output and its file encodings.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use narval_math::Vec3;

use crate::error::RenderResult;

/// Largest channel value of the 16-bit PPM output.
pub const PPM_MAX_VALUE: u16 = u16::MAX;

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color to 8-bit RGBA for previews.
pub fn color_to_rgba(color: Vec3) -> [u8; 4] {
    let r = (255.0 * linear_to_gamma(color.x).clamp(0.0, 1.0)) as u8;
    let g = (255.0 * linear_to_gamma(color.y).clamp(0.0, 1.0)) as u8;
    let b = (255.0 * linear_to_gamma(color.z).clamp(0.0, 1.0)) as u8;
    [r, g, b, 255]
}

/// Row-major image of linear radiance values, `(0, 0)` at the upper left.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec3>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec3::ZERO; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[self.offset(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, color: Vec3) {
        let offset = self.offset(x, y);
        self.pixels[offset] = color;
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Copy rows of `width` pixels to the block starting at `(x, y)`.
    pub fn blit(&mut self, x: u32, y: u32, width: u32, pixels: &[Vec3]) {
        for (row, line) in pixels.chunks(width.max(1) as usize).enumerate() {
            let start = self.offset(x, y + row as u32);
            self.pixels[start..start + line.len()].copy_from_slice(line);
        }
    }

    pub fn mean_luminance(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().map(|&c| narval_math::luminance(c)).sum::<f32>() / self.pixels.len() as f32
    }

    /// Convert to gamma-corrected RGBA bytes.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for color in &self.pixels {
            bytes.extend_from_slice(&color_to_rgba(*color));
        }
        bytes
    }

    /// Binary 16-bit PPM: `"P6\n<w> <h>\n65535\n"` then big-endian RGB
    /// triples of the linear values clamped to `[0, 1]`.
    pub fn write_ppm<W: Write>(&self, mut writer: W) -> RenderResult<()> {
        write!(writer, "P6\n{} {}\n{}\n", self.width, self.height, PPM_MAX_VALUE)?;
        let mut bytes = Vec::with_capacity(self.pixels.len() * 6);
        for color in &self.pixels {
            for channel in color.to_array() {
                let value = (channel.clamp(0.0, 1.0) * PPM_MAX_VALUE as f32).round() as u16;
                bytes.extend_from_slice(&value.to_be_bytes());
            }
        }
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn save_ppm(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        let path = path.as_ref();
        self.write_ppm(BufWriter::new(File::create(path)?))?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }

    /// 8-bit gamma-corrected PNG for previews.
    pub fn save_png(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        let path = path.as_ref();
        image::save_buffer(
            path,
            &self.to_rgba(),
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_header_and_payload() {
        let mut image = ImageBuffer::new(2, 1);
        image.set(0, 0, Vec3::new(1.0, 0.5, 0.0));
        image.set(1, 0, Vec3::new(2.0, -1.0, 0.0));

        let mut bytes = Vec::new();
        image.write_ppm(&mut bytes).unwrap();

        let header = b"P6\n2 1\n65535\n";
        assert_eq!(&bytes[..header.len()], header);
        let payload = &bytes[header.len()..];
        assert_eq!(payload.len(), 12);
        assert_eq!(&payload[0..2], &[0xff, 0xff]);
        assert_eq!(u16::from_be_bytes([payload[2], payload[3]]), 32768);
        assert_eq!(&payload[4..6], &[0, 0]);
        // Out of range values are clamped
        assert_eq!(&payload[6..8], &[0xff, 0xff]);
        assert_eq!(&payload[8..10], &[0, 0]);
    }

    #[test]
    fn test_color_to_rgba_applies_gamma() {
        assert_eq!(color_to_rgba(Vec3::new(0.25, 1.0, 4.0)), [127, 255, 255, 255]);
        assert_eq!(color_to_rgba(Vec3::splat(-1.0)), [0, 0, 0, 255]);
    }

    #[test]
    fn test_blit_places_block() {
        let mut image = ImageBuffer::new(4, 3);
        let block = vec![Vec3::ONE; 4];
        image.blit(1, 1, 2, &block);
        assert_eq!(image.get(1, 1), Vec3::ONE);
        assert_eq!(image.get(2, 2), Vec3::ONE);
        assert_eq!(image.get(0, 1), Vec3::ZERO);
        assert_eq!(image.get(3, 2), Vec3::ZERO);
        assert!((image.mean_luminance() - 4.0 / 12.0).abs() < 1e-6);
    }
}
