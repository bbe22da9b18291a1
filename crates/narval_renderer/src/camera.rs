//! Camera for primary ray generation.

use narval_core::CameraDescription;
use narval_math::sampling::concentric_sample_disk;
use narval_math::{Ray, Sampler, Vec3};

/// Pinhole camera with an optional thin lens.
#[derive(Debug, Clone)]
pub struct Camera {
    // Image settings
    pub image_width: u32,
    pub image_height: u32,

    // Camera positioning
    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,

    // Lens settings
    vfov: f32,           // Vertical field of view in degrees
    aperture: f32,       // Lens diameter, zero for a pinhole
    focus_dist: Option<f32>,

    // Derived in initialize()
    center: Vec3,
    upper_left: Vec3,
    viewport_u: Vec3,
    viewport_v: Vec3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
    lens_radius: f32,
}

impl Camera {
    /// Create a camera with default settings, looking down -z.
    pub fn new() -> Self {
        let mut camera = Self {
            image_width: 800,
            image_height: 450,
            look_from: Vec3::ZERO,
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::Y,
            vfov: 40.0,
            aperture: 0.0,
            focus_dist: None,
            center: Vec3::ZERO,
            upper_left: Vec3::ZERO,
            viewport_u: Vec3::ZERO,
            viewport_v: Vec3::ZERO,
            u: Vec3::X,
            v: Vec3::Y,
            w: Vec3::Z,
            lens_radius: 0.0,
        };
        camera.initialize();
        camera
    }

    /// Camera from a scene description at the given image size.
    pub fn from_description(description: &CameraDescription, width: u32, height: u32) -> Self {
        let mut camera = Self::new()
            .with_resolution(width, height)
            .with_position(
                Vec3::from_array(description.look_from),
                Vec3::from_array(description.look_at),
                Vec3::from_array(description.up),
            )
            .with_lens(description.vfov, description.aperture, description.focus_distance);
        camera.initialize();
        camera
    }

    /// Set image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.image_width = width.max(1);
        self.image_height = height.max(1);
        self
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self
    }

    /// Set lens settings. Without a focus distance the look-at point is in focus.
    pub fn with_lens(mut self, vfov: f32, aperture: f32, focus_dist: Option<f32>) -> Self {
        self.vfov = vfov;
        self.aperture = aperture.max(0.0);
        self.focus_dist = focus_dist;
        self
    }

    /// Recompute the cached basis (must be called after the builders).
    pub fn initialize(&mut self) {
        self.center = self.look_from;
        let focus_dist = self
            .focus_dist
            .unwrap_or_else(|| (self.look_from - self.look_at).length())
            .max(1e-3);

        // Film plane at focus_dist
        let h = (self.vfov.to_radians() / 2.0).tan();
        let viewport_height = 2.0 * h * focus_dist;
        let viewport_width = viewport_height * (self.image_width as f32 / self.image_height as f32);

        // Right-handed basis, w points backwards
        self.w = (self.look_from - self.look_at).normalize_or_zero();
        self.u = self.vup.cross(self.w).normalize_or_zero();
        self.v = self.w.cross(self.u);

        // Film spans u to the right and v downwards
        self.viewport_u = viewport_width * self.u;
        self.viewport_v = -viewport_height * self.v;
        self.upper_left = self.center - focus_dist * self.w - self.viewport_u / 2.0 - self.viewport_v / 2.0;
        self.lens_radius = self.aperture / 2.0;
    }

    /// Ray through normalised film coordinates `(u, v)` in `[0, 1]^2`,
    /// `(0, 0)` being the upper-left corner. The direction is unit length.
    pub fn get_ray_passing_through(&self, u: f32, v: f32, sampler: &mut Sampler) -> Ray {
        let target = self.upper_left + u * self.viewport_u + v * self.viewport_v;
        let origin = if self.lens_radius <= 0.0 {
            self.center
        } else {
            let p = concentric_sample_disk(sampler.next_2d()) * self.lens_radius;
            self.center + p.x * self.u + p.y * self.v
        };
        Ray::new(origin, (target - origin).normalize())
    }

    /// Jittered ray through pixel `(i, j)`.
    pub fn get_ray(&self, i: u32, j: u32, sampler: &mut Sampler) -> Ray {
        let offset = sampler.next_2d();
        let u = (i as f32 + offset.x) / self.image_width as f32;
        let v = (j as f32 + offset.y) / self.image_height as f32;
        self.get_ray_passing_through(u, v, sampler)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
