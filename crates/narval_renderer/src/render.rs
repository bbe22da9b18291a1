//! Tile-based parallel rendering.
//!
//! The image is split into a fixed grid of tiles which are rendered
//! independently on a rayon pool, centre tiles first. Each tile gets its own
//! integrator clone and a sampler seeded from the root seed and the tile's
//! grid index, so the result does not depend on the number of workers or on
//! scheduling order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use narval_core::RenderSettings;
use narval_math::{Sampler, Vec3};
use rayon::prelude::*;

use crate::error::{RenderError, RenderResult};
use crate::{ImageBuffer, Integrator, Scene, VolumetricPathIntegrator};

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// X coordinate of the tile's top-left corner
    pub x: u32,
    /// Y coordinate of the tile's top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major position in the tile grid; seeds the tile's sampler
    pub index: usize,
}

impl Tile {
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }
}

/// Split a `width` x `height` image into a `columns` x `rows` grid, sorted
/// from the centre outward.
///
/// Tile edges are spread evenly, so tiles differ by at most one pixel. A grid
/// finer than the image is reduced to one tile per pixel.
pub fn generate_tiles(width: u32, height: u32, columns: u32, rows: u32) -> Vec<Tile> {
    let columns = columns.clamp(1, width.max(1));
    let rows = rows.clamp(1, height.max(1));
    let edge = |i: u32, count: u32, size: u32| (i as u64 * size as u64 / count as u64) as u32;

    let mut tiles = Vec::with_capacity((columns * rows) as usize);
    for row in 0..rows {
        let (y0, y1) = (edge(row, rows, height), edge(row + 1, rows, height));
        for column in 0..columns {
            let (x0, x1) = (edge(column, columns, width), edge(column + 1, columns, width));
            tiles.push(Tile {
                x: x0,
                y: y0,
                width: x1 - x0,
                height: y1 - y0,
                index: (row * columns + column) as usize,
            });
        }
    }
    tiles.retain(|tile| tile.pixel_count() > 0);

    sort_spiral(&mut tiles, width, height);
    tiles
}

/// Sort tiles by distance from the image centre, ties by grid index.
fn sort_spiral(tiles: &mut [Tile], width: u32, height: u32) {
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let distance = |tile: &Tile| {
        let x = tile.x as f32 + tile.width as f32 / 2.0;
        let y = tile.y as f32 + tile.height as f32 / 2.0;
        (x - center_x).powi(2) + (y - center_y).powi(2)
    };

    tiles.sort_by(|a, b| {
        distance(a)
            .total_cmp(&distance(b))
            .then(a.index.cmp(&b.index))
    });
}

/// Pixels of one rendered tile, row-major within the tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutput {
    pub pixels: Vec<Vec3>,
    /// Non-finite estimates left out of the pixel averages
    pub dropped: u32,
}

/// Render one tile.
///
/// Non-finite estimates are left out of the pixel average and counted in
/// [`TileOutput::dropped`].
pub fn render_tile<I: Integrator>(tile: &Tile, scene: &Scene, integrator: &I, spp: u32, seed: u64) -> TileOutput {
    let mut sampler = Sampler::for_task(seed, tile.index as u64);
    let mut pixels = Vec::with_capacity(tile.pixel_count() as usize);
    let mut dropped = 0;

    for local_y in 0..tile.height {
        for local_x in 0..tile.width {
            let (x, y) = (tile.x + local_x, tile.y + local_y);
            let mut color = Vec3::ZERO;
            for _ in 0..spp {
                let ray = scene.camera.get_ray(x, y, &mut sampler);
                let l = integrator.li(&ray, scene, &mut sampler);
                if l.is_finite() {
                    color += l;
                } else {
                    dropped += 1;
                }
            }
            pixels.push(color / spp.max(1) as f32);
        }
    }
    TileOutput { pixels, dropped }
}

/// Render `scene` with the volumetric path integrator configured by its
/// settings.
pub fn render_scene(scene: &Scene) -> RenderResult<ImageBuffer> {
    let integrator = VolumetricPathIntegrator::new(scene.settings.bounces);
    render(scene, &integrator)
}

/// Render `scene` with `integrator` using the scene's tile grid, worker
/// count, sample count and seed.
pub fn render<I: Integrator>(scene: &Scene, integrator: &I) -> RenderResult<ImageBuffer> {
    let settings = &scene.settings;
    validate(settings)?;

    let (width, height) = (scene.camera.image_width, scene.camera.image_height);
    let tiles = generate_tiles(width, height, settings.tiles[0], settings.tiles[1]);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads as usize)
        .thread_name(|i| format!("narval-tile-{i}"))
        .build()?;

    log::info!(
        "Rendering {}x{} at {} spp: {} tiles on {} threads",
        width,
        height,
        settings.spp,
        tiles.len(),
        settings.threads
    );
    let start = Instant::now();
    let finished = AtomicUsize::new(0);

    let results: Vec<(Tile, TileOutput)> = pool.install(|| {
        tiles
            .par_iter()
            .map(|tile| {
                let integrator = integrator.clone();
                let output = panic::catch_unwind(AssertUnwindSafe(|| {
                    render_tile(tile, scene, &integrator, settings.spp, settings.seed)
                }))
                .map_err(|payload| RenderError::TileFailed {
                    tile: tile.index,
                    message: panic_message(payload.as_ref()),
                })?;

                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("Tile {} done ({}/{})", tile.index, done, tiles.len());
                Ok((*tile, output))
            })
            .collect::<RenderResult<Vec<_>>>()
    })?;

    let mut image = ImageBuffer::new(width, height);
    let mut dropped = 0u64;
    for (tile, output) in &results {
        image.blit(tile.x, tile.y, tile.width, &output.pixels);
        dropped += u64::from(output.dropped);
    }
    if dropped > 0 {
        log::warn!("{dropped} non-finite radiance samples were left out of the image");
    }

    log::info!("Render finished in {:.2?}", start.elapsed());
    Ok(image)
}

fn validate(settings: &RenderSettings) -> RenderResult<()> {
    let problem = if settings.width() == 0 || settings.height() == 0 {
        "resolution must be non-zero"
    } else if settings.spp == 0 {
        "spp must be at least 1"
    } else if settings.tiles[0] == 0 || settings.tiles[1] == 0 {
        "tile grid must be non-zero"
    } else if settings.threads == 0 {
        "thread count must be at least 1"
    } else {
        return Ok(());
    };
    Err(RenderError::InvalidSettings(problem.to_string()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Camera;
    use narval_math::Ray;

    #[test]
    fn test_tiles_cover_image_once() {
        let (width, height) = (37, 23);
        let tiles = generate_tiles(width, height, 5, 4);
        assert_eq!(tiles.len(), 20);

        let mut covered = vec![0u8; (width * height) as usize];
        for tile in &tiles {
            for y in tile.y..tile.y + tile.height {
                for x in tile.x..tile.x + tile.width {
                    covered[(y * width + x) as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_more_tiles_than_pixels() {
        let tiles = generate_tiles(3, 2, 40, 10);
        assert_eq!(tiles.len(), 6);
        assert!(tiles.iter().all(|t| t.pixel_count() == 1));
    }

    #[test]
    fn test_spiral_order() {
        let tiles = generate_tiles(192, 192, 3, 3);
        assert_eq!(tiles[0].x, 64);
        assert_eq!(tiles[0].y, 64);
        assert_eq!(tiles[0].index, 4);
    }

    #[derive(Clone)]
    struct Gradient;

    impl Integrator for Gradient {
        fn li(&self, ray: &Ray, _scene: &Scene, _sampler: &mut Sampler) -> Vec3 {
            Vec3::splat(ray.direction.y.max(0.0))
        }
    }

    /// NaN for every ray into the left half of the frame.
    #[derive(Clone)]
    struct LeftHalfNan;

    impl Integrator for LeftHalfNan {
        fn li(&self, ray: &Ray, _scene: &Scene, _sampler: &mut Sampler) -> Vec3 {
            if ray.direction.x < 0.0 {
                Vec3::NAN
            } else {
                Vec3::ONE
            }
        }
    }

    #[derive(Clone)]
    struct Exploding;

    impl Integrator for Exploding {
        fn li(&self, _ray: &Ray, _scene: &Scene, _sampler: &mut Sampler) -> Vec3 {
            panic!("integrator exploded");
        }
    }

    fn scene(settings: RenderSettings) -> Scene {
        let mut camera = Camera::new().with_resolution(settings.width(), settings.height());
        camera.initialize();
        Scene::new(settings, camera, Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn test_render_writes_every_tile() {
        let settings = RenderSettings::default()
            .with_resolution(16, 8)
            .with_spp(1)
            .with_tiles(4, 2)
            .with_threads(3);
        let image = render(&scene(settings), &Gradient).unwrap();
        assert_eq!(image.pixels.len(), 128);
        // Upper rows look up, lower rows down
        assert!(image.get(8, 0).x > 0.0);
        assert_eq!(image.get(8, 7), Vec3::ZERO);
    }

    #[test]
    fn test_non_finite_samples_are_counted() {
        let settings = RenderSettings::default()
            .with_resolution(4, 2)
            .with_spp(3)
            .with_tiles(1, 1)
            .with_threads(1);
        let scene = scene(settings);
        let tile = generate_tiles(4, 2, 1, 1)[0];
        let output = render_tile(&tile, &scene, &LeftHalfNan, 3, 0);

        // Two columns of two rows, three samples each
        assert_eq!(output.dropped, 12);
        assert!(output.pixels.iter().all(|p| p.is_finite()));
        assert_eq!(output.pixels[0], Vec3::ZERO);
        assert_eq!(output.pixels[3], Vec3::ONE);

        let image = render(&scene, &LeftHalfNan).unwrap();
        assert_eq!(image.pixels, output.pixels);
    }

    #[test]
    fn test_panicking_tile_is_reported() {
        let settings = RenderSettings::default()
            .with_resolution(4, 4)
            .with_spp(1)
            .with_tiles(2, 2)
            .with_threads(2);
        let err = render(&scene(settings), &Exploding).unwrap_err();
        match err {
            RenderError::TileFailed { message, .. } => assert!(message.contains("exploded")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_invalid_settings() {
        for settings in [
            RenderSettings::default().with_resolution(0, 4),
            RenderSettings::default().with_resolution(4, 4).with_spp(0),
            RenderSettings::default().with_resolution(4, 4).with_tiles(0, 1),
            RenderSettings::default().with_resolution(4, 4).with_threads(0),
        ] {
            let err = render(&scene(settings), &Gradient).unwrap_err();
            assert!(matches!(err, RenderError::InvalidSettings(_)));
        }
    }
}
