//! Emitters: area and point lights attached to instances, directional
//! lights and the environment.

use std::f32::consts::PI;
use std::sync::Arc;

use narval_core::Texture;
use narval_math::sampling::{spherical_direction, Distribution1D, Distribution2D};
use narval_math::{luminance, Ray, Sampler, Vec2, Vec3};

use crate::{InstancedModel, RayIntersection};

/// Minimum environment map resolution used for importance sampling.
const MIN_ENV_RESOLUTION: [u32; 2] = [32, 16];

/// Incident radiance sampled from a light.
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    /// Unit direction from the shading point toward the light
    pub wi: Vec3,
    /// Radiance arriving along `wi`, before visibility
    pub li: Vec3,
    /// Solid-angle density, 1 for delta lights
    pub pdf: f32,
    /// Distance to the sampled point, infinite for distant lights
    pub distance: f32,
}

/// Uniform emitter covering every primitive of one instance.
///
/// On a single point primitive it becomes a delta point light with
/// inverse-square falloff.
#[derive(Debug, Clone)]
pub struct DiffuseLight {
    radiance: Vec3,
    instance_index: usize,
    instance: InstancedModel,
    areas: Distribution1D,
    area: f32,
}

impl DiffuseLight {
    pub fn new(instance_index: usize, instance: InstancedModel, radiance: Vec3) -> Self {
        let areas: Vec<f32> = instance
            .model()
            .primitives()
            .iter()
            .map(|p| instance.world_area(p))
            .collect();
        let area = areas.iter().sum();
        Self {
            radiance,
            instance_index,
            areas: Distribution1D::new(&areas),
            area,
            instance,
        }
    }

    pub fn radiance(&self) -> Vec3 {
        self.radiance
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn instance_index(&self) -> usize {
        self.instance_index
    }

    fn is_point(&self) -> bool {
        self.area <= 0.0
    }

    fn sample_li(&self, point: Vec3, sampler: &mut Sampler) -> Option<LightSample> {
        let primitives = self.instance.model().primitives();
        if self.is_point() {
            let light = primitives.iter().find(|p| p.is_point())?;
            let position = self.instance.sample_primitive(light, Vec2::ZERO).point;
            let to_light = position - point;
            let distance = to_light.length();
            if distance <= 0.0 {
                return None;
            }
            return Some(LightSample {
                wi: to_light / distance,
                li: self.radiance / (distance * distance),
                pdf: 1.0,
                distance,
            });
        }

        let (index, _) = self.areas.sample_discrete(sampler.next_f32());
        let surface = self.instance.sample_primitive(&primitives[index], sampler.next_2d());
        let to_light = surface.point - point;
        let distance = to_light.length();
        if distance <= 0.0 {
            return None;
        }
        let wi = to_light / distance;
        // One-sided: only the outward face emits
        let cos_light = surface.normal.dot(-wi);
        if cos_light <= 0.0 {
            return None;
        }
        Some(LightSample {
            wi,
            li: self.radiance,
            pdf: distance * distance / (cos_light * self.area),
            distance,
        })
    }

    /// Solid-angle density of sampling the hit point `rec` from `origin`.
    fn pdf_li(&self, origin: Vec3, rec: &RayIntersection) -> f32 {
        if self.is_point() || !rec.front_face {
            return 0.0;
        }
        let to_light = rec.point - origin;
        let distance_squared = to_light.length_squared();
        let cos_light = rec.normal.dot(to_light.normalize_or_zero()).abs();
        if cos_light <= 0.0 {
            return 0.0;
        }
        distance_squared / (cos_light * self.area)
    }

    fn emitted(&self, rec: &RayIntersection) -> Vec3 {
        if rec.front_face {
            self.radiance
        } else {
            Vec3::ZERO
        }
    }
}

/// Parallel light arriving from infinitely far away.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Travel direction of the light (unit length)
    pub direction: Vec3,
    pub radiance: Vec3,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, radiance: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            radiance,
        }
    }
}

/// Environment light from a latitude-longitude map, y up.
///
/// `u` follows the azimuth measured from +x toward +z, `v` the polar angle
/// from +y.
#[derive(Debug, Clone)]
pub struct InfiniteAreaLight {
    radiance: Vec3,
    map: Arc<Texture>,
    distribution: Distribution2D,
}

impl InfiniteAreaLight {
    pub fn new(radiance: Vec3, map: Option<Arc<Texture>>) -> Self {
        let map = map.unwrap_or_else(|| Arc::new(Texture::solid_color(Vec3::ONE)));
        let [width, height, _] = map.dims();
        let nu = width.max(MIN_ENV_RESOLUTION[0]) as usize;
        let nv = height.max(MIN_ENV_RESOLUTION[1]) as usize;

        // Weighted by sin(theta) so the pdf accounts for the lat-long warp
        let mut func = Vec::with_capacity(nu * nv);
        for row in 0..nv {
            let v = (row as f32 + 0.5) / nv as f32;
            let sin_theta = (PI * v).sin();
            for col in 0..nu {
                let u = (col as f32 + 0.5) / nu as f32;
                func.push(luminance(map.sample(u, v).truncate()).max(0.0) * sin_theta);
            }
        }
        log::debug!("Environment distribution {}x{}", nu, nv);

        Self {
            radiance,
            map,
            distribution: Distribution2D::new(&func, nu, nv),
        }
    }

    fn direction_to_uv(w: Vec3) -> Vec2 {
        let theta = w.y.clamp(-1.0, 1.0).acos();
        let mut phi = w.z.atan2(w.x);
        if phi < 0.0 {
            phi += 2.0 * PI;
        }
        Vec2::new(phi / (2.0 * PI), theta / PI)
    }

    fn uv_to_direction(uv: Vec2) -> (Vec3, f32) {
        let theta = uv.y * PI;
        let phi = uv.x * 2.0 * PI;
        let (sin_theta, cos_theta) = theta.sin_cos();
        // spherical_direction is z-up; swap into the y-up convention
        let d = spherical_direction(sin_theta, cos_theta, phi);
        (Vec3::new(d.x, d.z, d.y), sin_theta)
    }

    /// Radiance arriving from direction `w` (pointing away from the scene).
    pub fn lookup(&self, w: Vec3) -> Vec3 {
        let uv = Self::direction_to_uv(w.normalize_or_zero());
        self.radiance * self.map.sample(uv.x, uv.y).truncate()
    }

    fn sample_li(&self, sampler: &mut Sampler) -> Option<LightSample> {
        let (uv, map_pdf) = self.distribution.sample_continuous(sampler.next_2d());
        if map_pdf <= 0.0 {
            return None;
        }
        let (wi, sin_theta) = Self::uv_to_direction(uv);
        if sin_theta <= 0.0 {
            return None;
        }
        Some(LightSample {
            wi,
            li: self.lookup(wi),
            pdf: map_pdf / (2.0 * PI * PI * sin_theta),
            distance: f32::INFINITY,
        })
    }

    fn pdf_li(&self, wi: Vec3) -> f32 {
        let uv = Self::direction_to_uv(wi.normalize_or_zero());
        let sin_theta = (uv.y * PI).sin();
        if sin_theta <= 0.0 {
            return 0.0;
        }
        self.distribution.pdf(uv) / (2.0 * PI * PI * sin_theta)
    }
}

/// Closed set of light kinds.
#[derive(Debug, Clone)]
pub enum Light {
    Diffuse(DiffuseLight),
    Directional(DirectionalLight),
    Infinite(InfiniteAreaLight),
}

impl Light {
    /// Sample incident illumination at `point`.
    pub fn sample_li(&self, point: Vec3, sampler: &mut Sampler) -> Option<LightSample> {
        match self {
            Light::Diffuse(light) => light.sample_li(point, sampler),
            Light::Directional(light) => Some(LightSample {
                wi: -light.direction,
                li: light.radiance,
                pdf: 1.0,
                distance: f32::INFINITY,
            }),
            Light::Infinite(light) => light.sample_li(sampler),
        }
    }

    /// Solid-angle density with which [`Self::sample_li`] produces `wi` from
    /// `origin`. `hit` is the intersection of that ray with this light's
    /// geometry, when it has any. Delta lights always report zero.
    pub fn pdf_li(&self, origin: Vec3, wi: Vec3, hit: Option<&RayIntersection>) -> f32 {
        match self {
            Light::Diffuse(light) => hit.map_or(0.0, |rec| light.pdf_li(origin, rec)),
            Light::Directional(_) => 0.0,
            Light::Infinite(light) => light.pdf_li(wi),
        }
    }

    /// Radiance carried by a ray that escapes the scene.
    pub fn le(&self, ray: &Ray) -> Vec3 {
        match self {
            Light::Infinite(light) => light.lookup(ray.direction),
            _ => Vec3::ZERO,
        }
    }

    /// Radiance leaving a surface hit on this light's geometry.
    pub fn emitted(&self, rec: &RayIntersection) -> Vec3 {
        match self {
            Light::Diffuse(light) => light.emitted(rec),
            _ => Vec3::ZERO,
        }
    }

    pub fn is_delta(&self) -> bool {
        match self {
            Light::Diffuse(light) => light.is_point(),
            Light::Directional(_) => true,
            Light::Infinite(_) => false,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Light::Infinite(_))
    }

    /// Index of the scene instance carrying this light.
    pub fn instance(&self) -> Option<usize> {
        match self {
            Light::Diffuse(light) => Some(light.instance_index),
            _ => None,
        }
    }
}
