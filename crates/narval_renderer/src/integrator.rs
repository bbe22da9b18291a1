//! Unidirectional volumetric path tracing.
//!
//! Each path alternates between surface and medium interactions. Direct
//! lighting is estimated at every scattering vertex with one uniformly
//! chosen light, combining light and BSDF (or phase function) sampling with
//! the power heuristic.

use narval_math::sampling::power_heuristic;
use narval_math::{is_black, Frame, Interval, Ray, Sampler, Vec3};

use crate::medium::SampleOutcome;
use crate::scene::SHADOW_EPSILON;
use crate::{Bsdf, Light, Scene};

/// Non-scattering events (media passed through or missed) allowed per path.
const MAX_MEDIUM_CROSSINGS: u32 = 64;

/// Radiance estimator for one camera ray.
///
/// Render workers clone the integrator; an implementation may keep scratch
/// state but must not share it between clones.
pub trait Integrator: Clone + Send + Sync {
    fn li(&self, ray: &Ray, scene: &Scene, sampler: &mut Sampler) -> Vec3;
}

/// A scattering vertex: the local frame and its scattering function.
struct Vertex {
    point: Vec3,
    frame: Frame,
    /// Outgoing direction in the local frame
    wo: Vec3,
    bsdf: Bsdf,
}

impl Vertex {
    fn eval(&self, wi: Vec3) -> (Vec3, f32) {
        let wi = self.frame.to_local(wi);
        (self.bsdf.eval(self.wo, wi), self.bsdf.pdf(self.wo, wi))
    }

    fn sample(&self, sampler: &mut Sampler) -> Option<(Vec3, Vec3, f32)> {
        let wi = self.bsdf.sample(self.wo, sampler.next_2d())?;
        let f = self.bsdf.eval(self.wo, wi);
        let pdf = self.bsdf.pdf(self.wo, wi);
        Some((self.frame.to_world(wi).normalize_or_zero(), f, pdf))
    }
}

#[derive(Debug, Clone)]
pub struct VolumetricPathIntegrator {
    max_bounces: u32,
}

impl VolumetricPathIntegrator {
    pub fn new(max_bounces: u32) -> Self {
        Self { max_bounces }
    }

    pub fn max_bounces(&self) -> u32 {
        self.max_bounces
    }

    /// Estimate direct lighting at `vertex` from one light picked uniformly.
    fn uniform_sample_one_light(&self, vertex: &Vertex, scene: &Scene, sampler: &mut Sampler) -> Vec3 {
        let lights = scene.lights();
        if lights.is_empty() {
            return Vec3::ZERO;
        }
        let index = sampler.next_index(lights.len());
        self.estimate_direct(vertex, index, &lights[index], scene, sampler) * lights.len() as f32
    }

    /// Light sampling and BSDF sampling, combined with the power heuristic.
    fn estimate_direct(
        &self,
        vertex: &Vertex,
        light_index: usize,
        light: &Light,
        scene: &Scene,
        sampler: &mut Sampler,
    ) -> Vec3 {
        let mut ld = Vec3::ZERO;

        if let Some(sample) = light.sample_li(vertex.point, sampler) {
            if sample.pdf > 0.0 && !is_black(sample.li) {
                let (f, scattering_pdf) = vertex.eval(sample.wi);
                if !is_black(f) {
                    let tr = scene.visibility_tr(vertex.point, sample.wi, sample.distance, sampler);
                    if !is_black(tr) {
                        let weight = if light.is_delta() {
                            1.0
                        } else {
                            power_heuristic(1, sample.pdf, 1, scattering_pdf)
                        };
                        ld += f * sample.li * tr * weight / sample.pdf;
                    }
                }
            }
        }

        if light.is_delta() {
            return ld;
        }

        let Some((wi, f, scattering_pdf)) = vertex.sample(sampler) else {
            return ld;
        };
        if scattering_pdf <= 0.0 || is_black(f) || wi == Vec3::ZERO {
            return ld;
        }

        let ray = Ray::new(vertex.point, wi);
        let (hit, tr) = scene.intersect_tr(&ray, Interval::new(SHADOW_EPSILON, f32::INFINITY), sampler);
        if is_black(tr) {
            return ld;
        }
        let (li, light_pdf) = match hit {
            // Only credit the light this estimate was drawn for
            Some(rec) => match scene.hit_light(&rec) {
                Some((index, _)) if index == light_index => {
                    (light.emitted(&rec), light.pdf_li(vertex.point, wi, Some(&rec)))
                }
                _ => return ld,
            },
            None if light.is_infinite() => (light.le(&ray), light.pdf_li(vertex.point, wi, None)),
            None => return ld,
        };
        if light_pdf > 0.0 && !is_black(li) {
            let weight = power_heuristic(1, scattering_pdf, 1, light_pdf);
            ld += f * li * tr * weight / scattering_pdf;
        }
        ld
    }
}

impl Default for VolumetricPathIntegrator {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Integrator for VolumetricPathIntegrator {
    fn li(&self, camera_ray: &Ray, scene: &Scene, sampler: &mut Sampler) -> Vec3 {
        let mut l = Vec3::ZERO;
        let mut transmittance = Vec3::ONE;
        let mut ray = *camera_ray;
        let mut scattered = false;
        let mut crossings = 0;
        let mut bounce = 0;

        while bounce < self.max_bounces {
            if is_black(transmittance) {
                break;
            }

            let mut rec = Default::default();
            if !scene.intersect_scene(&ray, Interval::new(SHADOW_EPSILON, f32::INFINITY), &mut rec) {
                if !scattered {
                    for light in scene.infinite_lights() {
                        l += transmittance * light.le(&ray);
                    }
                }
                break;
            }
            let material = scene.material(&rec);

            if material.is_medium() {
                let (Some(medium), Some(phase)) = (material.medium.as_ref(), material.bsdf) else {
                    break;
                };
                let instance = scene.instance(rec.instance);
                let segment = Interval::new(rec.t_near, rec.t_far);

                match medium.sample(&ray, segment, instance, &phase, sampler) {
                    SampleOutcome::Missed | SampleOutcome::PassedThrough { .. } if crossings >= MAX_MEDIUM_CROSSINGS => {
                        break;
                    }
                    SampleOutcome::Missed => {
                        // No occupied voxel on the way: retry the same bounce
                        crossings += 1;
                        ray = Ray::new(ray.at(rec.t_far), ray.direction);
                    }
                    SampleOutcome::PassedThrough { weight } => {
                        crossings += 1;
                        transmittance *= weight;
                        ray = Ray::new(ray.at(rec.t_far), ray.direction);
                    }
                    SampleOutcome::Scattered { t, direction, weight } => {
                        transmittance *= weight;
                        let travel = ray.direction.normalize_or_zero();
                        let frame = Frame::from_normal(travel);
                        let vertex = Vertex {
                            point: ray.at(t),
                            wo: frame.to_local(-travel),
                            frame,
                            bsdf: phase,
                        };

                        let (f, pdf) = vertex.eval(direction);
                        if pdf <= 0.0 || is_black(f) {
                            break;
                        }
                        l += transmittance * self.uniform_sample_one_light(&vertex, scene, sampler);

                        transmittance *= f / pdf;
                        ray = Ray::new(vertex.point, direction);
                        scattered = true;
                        bounce += 1;
                    }
                }
                continue;
            }

            // Surface interaction
            if !scattered {
                if let Some((_, light)) = scene.hit_light(&rec) {
                    l += transmittance * light.emitted(&rec);
                }
            }
            let Some(bsdf) = material.bsdf_at(rec.uv) else {
                break;
            };

            let frame = Frame::from_normal(rec.normal);
            let vertex = Vertex {
                point: rec.point,
                wo: frame.to_local(-ray.direction.normalize_or_zero()),
                frame,
                bsdf,
            };
            l += transmittance * self.uniform_sample_one_light(&vertex, scene, sampler);

            let Some((wi, f, pdf)) = vertex.sample(sampler) else {
                break;
            };
            if pdf <= 0.0 || is_black(f) {
                break;
            }
            // eval already carries the cosine
            transmittance *= f / pdf;
            ray = Ray::new(rec.point, wi);
            scattered = true;
            bounce += 1;
        }

        if cfg!(debug_assertions) && (!l.is_finite() || l.min_element() < 0.0) {
            log::warn!("Invalid radiance estimate {l} for ray {camera_ray:?}");
        }
        l
    }
}
