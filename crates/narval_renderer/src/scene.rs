//! The immutable scene the integrator renders.
//!
//! Instances are kept in the leaf order of a top-level BVH; light and hit
//! records refer to them by index into that order.

use narval_core::RenderSettings;
use narval_math::{Interval, Ray, Sampler, Vec3};

use crate::light::DiffuseLight;
use crate::{Bvh, Camera, InstancedModel, Light, Material, RayIntersection};

/// Offset applied to secondary rays to avoid self-intersection.
pub const SHADOW_EPSILON: f32 = 1e-4;

/// Upper bound on medium boundaries crossed by one shadow ray.
const MAX_MEDIUM_CROSSINGS: usize = 64;

#[derive(Debug)]
pub struct Scene {
    pub settings: RenderSettings,
    pub camera: Camera,
    instances: Vec<InstancedModel>,
    bvh: Bvh,
    materials: Vec<Material>,
    lights: Vec<Light>,
}

impl Scene {
    /// Assemble a scene. Every instance whose material is an emitter gets a
    /// [`DiffuseLight`] attached; `lights` holds the lights without geometry.
    pub fn new(
        settings: RenderSettings,
        camera: Camera,
        mut instances: Vec<InstancedModel>,
        materials: Vec<Material>,
        mut lights: Vec<Light>,
    ) -> Self {
        let bvh = Bvh::build(&mut instances, |instance| instance.bounds());

        for (index, instance) in instances.iter_mut().enumerate() {
            let emission = instance
                .model()
                .primitives()
                .first()
                .and_then(|p| materials.get(p.material))
                .and_then(|m| m.emission);
            if let Some(radiance) = emission {
                instance.light = Some(lights.len());
                lights.push(Light::Diffuse(DiffuseLight::new(index, instance.clone(), radiance)));
            }
        }

        log::info!(
            "Scene: {} instances, {} materials, {} lights",
            instances.len(),
            materials.len(),
            lights.len()
        );

        Self {
            settings,
            camera,
            instances,
            bvh,
            materials,
            lights,
        }
    }

    /// Closest hit along `ray` within `ray_t`. Media report their entry
    /// point, clipped to `ray_t`.
    pub fn intersect_scene(&self, ray: &Ray, ray_t: Interval, rec: &mut RayIntersection) -> bool {
        let mut candidate = RayIntersection::default();
        self.bvh.intersect(ray, ray_t, |index, range| {
            if !self.instances[index].intersect(ray, range, &mut candidate) {
                return None;
            }
            candidate.instance = index;
            *rec = candidate;
            Some(candidate.t_near)
        })
    }

    /// Material of the primitive in a hit record.
    pub fn material(&self, rec: &RayIntersection) -> &Material {
        let id = self.instances[rec.instance].model().primitive(rec.primitive).material;
        &self.materials[id]
    }

    /// Light attached to the hit instance, if any.
    pub fn hit_light(&self, rec: &RayIntersection) -> Option<(usize, &Light)> {
        let index = self.instances[rec.instance].light?;
        Some((index, &self.lights[index]))
    }

    /// Walk `ray` through `ray_t`, multiplying the transmittance of every
    /// medium crossed, until the first opaque hit or the end of the range.
    ///
    /// Returns that hit (if any) and the transmittance accumulated before it.
    pub fn intersect_tr(
        &self,
        ray: &Ray,
        ray_t: Interval,
        sampler: &mut Sampler,
    ) -> (Option<RayIntersection>, Vec3) {
        let mut tr = Vec3::ONE;
        let mut range = ray_t;
        for _ in 0..MAX_MEDIUM_CROSSINGS {
            let mut rec = RayIntersection::default();
            if !self.intersect_scene(ray, range, &mut rec) {
                return (None, tr);
            }
            let material = self.material(&rec);
            let Some(medium) = material.medium.as_ref().filter(|_| material.is_medium()) else {
                return (Some(rec), tr);
            };

            let exit = rec.t_far.min(range.max);
            tr *= medium.tr(ray, Interval::new(rec.t_near, exit), &self.instances[rec.instance], sampler);
            if tr == Vec3::ZERO {
                return (None, tr);
            }
            range.min = exit + SHADOW_EPSILON;
            if range.is_empty() {
                return (None, tr);
            }
        }
        (None, tr)
    }

    /// Transmittance from `origin` toward `wi` over `distance`: zero when an
    /// opaque surface blocks the way, the product of the media crossed
    /// otherwise.
    pub fn visibility_tr(&self, origin: Vec3, wi: Vec3, distance: f32, sampler: &mut Sampler) -> Vec3 {
        let ray = Ray::new(origin, wi);
        let t_max = if distance.is_finite() {
            distance * (1.0 - SHADOW_EPSILON)
        } else {
            f32::INFINITY
        };
        match self.intersect_tr(&ray, Interval::new(SHADOW_EPSILON, t_max), sampler) {
            (Some(_), _) => Vec3::ZERO,
            (None, tr) => tr,
        }
    }

    pub fn instances(&self) -> &[InstancedModel] {
        &self.instances
    }

    pub fn instance(&self, index: usize) -> &InstancedModel {
        &self.instances[index]
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Environment lights.
    pub fn infinite_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().filter(|light| light.is_infinite())
    }
}
