//! Participating media.
//!
//! A medium fills the box primitive of the instance it is attached to. All
//! segment parameters are world-ray parameters, which instance transforms
//! keep valid in object space. Coefficients are per world unit.

use std::sync::Arc;

use narval_core::{ConfigError, ConfigResult, Texture};
use narval_math::{mean, Frame, Interval, Ray, Sampler, Vec3};

use crate::bucket_lbvh::{BucketLbvh, TreeMode, DEFAULT_BUCKET_SIZE};
use crate::{Bsdf, InstancedModel};

/// Below this transmittance ratio tracking plays Russian roulette.
const RR_THRESHOLD: f32 = 0.1;

/// Minimum termination probability of the roulette.
const RR_MIN_Q: f32 = 0.05;

/// Result of free-flight sampling along a medium segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// A real scattering event at ray parameter `t`, continuing along
    /// `direction` (unit length, world space).
    Scattered { t: f32, direction: Vec3, weight: Vec3 },
    /// The ray left the segment without scattering.
    PassedThrough { weight: Vec3 },
    /// The segment does not touch a single occupied voxel. The caller moves
    /// past the medium and retries the same bounce.
    Missed,
}

/// Constant-density medium.
#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneousMedium {
    pub absorption: Vec3,
    pub scattering: Vec3,
    pub density: f32,
}

impl HomogeneousMedium {
    pub fn new(absorption: Vec3, scattering: Vec3, density: f32) -> ConfigResult<Self> {
        check_coefficients(absorption, scattering, density)?;
        Ok(Self {
            absorption,
            scattering,
            density,
        })
    }

    /// Density-weighted extinction.
    pub fn sigma_t(&self) -> Vec3 {
        (self.absorption + self.scattering) * self.density
    }

    /// Beer-Lambert transmittance over `segment`.
    pub fn tr(&self, ray: &Ray, segment: Interval) -> Vec3 {
        let distance = segment.size().max(0.0) * ray.direction.length();
        (-self.sigma_t() * distance).exp()
    }

    pub fn sample(&self, ray: &Ray, segment: Interval, phase: &Bsdf, sampler: &mut Sampler) -> SampleOutcome {
        let sigma_t = self.sigma_t();
        let sigma_t_mean = mean(sigma_t);
        let speed = ray.direction.length();
        let length = segment.size().max(0.0) * speed;

        let xi = sampler.next_f32();
        if sigma_t_mean > 0.0 {
            let distance = -(1.0 - xi).ln() / sigma_t_mean;
            if distance < length {
                let tr = (-sigma_t * distance).exp();
                let pdf = positive_or_one(mean(sigma_t * tr));
                let Some(direction) = scatter_direction(phase, ray.direction, sampler) else {
                    return SampleOutcome::PassedThrough { weight: Vec3::ZERO };
                };
                return SampleOutcome::Scattered {
                    t: segment.min + distance / speed,
                    direction,
                    weight: tr * self.scattering * self.density / pdf,
                };
            }
        }

        let tr = (-sigma_t * length).exp();
        SampleOutcome::PassedThrough {
            weight: tr / positive_or_one(mean(tr)),
        }
    }
}

/// Heterogeneous medium over a density grid filling the unit cube
/// `[-0.5, 0.5]^3` of its instance.
#[derive(Debug, Clone)]
pub struct GridMedium {
    pub absorption: Vec3,
    pub scattering: Vec3,
    /// Multiplier applied to every grid value
    pub density: f32,
    lbvh: BucketLbvh,
    max_density: f32,
    inv_max_density: f32,
}

impl GridMedium {
    /// Validates the grid (at most 1024 voxels per axis, no negative or NaN
    /// values) and builds its index.
    pub fn new(grid: Arc<Texture>, absorption: Vec3, scattering: Vec3, density: f32) -> ConfigResult<Self> {
        Self::with_tree_mode(grid, absorption, scattering, density, TreeMode::default())
    }

    pub fn with_tree_mode(
        grid: Arc<Texture>,
        absorption: Vec3,
        scattering: Vec3,
        density: f32,
        mode: TreeMode,
    ) -> ConfigResult<Self> {
        check_coefficients(absorption, scattering, density)?;
        grid.validate_density()?;
        let max_density = grid.max_channel(0);
        let lbvh = BucketLbvh::with_options(grid, mode, DEFAULT_BUCKET_SIZE)?;
        Ok(Self {
            absorption,
            scattering,
            density,
            lbvh,
            max_density,
            inv_max_density: if max_density > 0.0 { 1.0 / max_density } else { 0.0 },
        })
    }

    pub fn lbvh(&self) -> &BucketLbvh {
        &self.lbvh
    }

    pub fn max_density(&self) -> f32 {
        self.max_density
    }

    /// Scalar extinction per unit grid value (channel mean).
    fn sigma_t(&self) -> f32 {
        mean((self.absorption + self.scattering) * self.density)
    }

    /// Grid-space ray: `[0, dims]` spans the unit cube. The parameter is
    /// unchanged.
    fn grid_ray(&self, ray: &Ray, instance: &InstancedModel) -> Ray {
        let local = instance.to_local(ray);
        let dims = self.dims();
        Ray::new((local.origin + 0.5) * dims, local.direction * dims)
    }

    fn dims(&self) -> Vec3 {
        let [x, y, z] = self.lbvh.dims();
        Vec3::new(x as f32, y as f32, z as f32)
    }

    /// Interpolated grid value at a grid-space point.
    fn density_at(&self, p: Vec3) -> f32 {
        self.lbvh.grid().density(p / self.dims())
    }

    /// Tentative step along the world ray, in ray-parameter units.
    fn step(&self, speed: f32, sampler: &mut Sampler) -> f32 {
        -(1.0 - sampler.next_f32()).ln() * self.inv_max_density / (self.sigma_t() * speed)
    }

    fn is_transparent(&self) -> bool {
        self.sigma_t() <= 0.0 || self.max_density <= 0.0
    }

    /// Ratio-tracking estimate of the transmittance over `segment`.
    pub fn tr(&self, ray: &Ray, segment: Interval, instance: &InstancedModel, sampler: &mut Sampler) -> Vec3 {
        if self.is_transparent() || segment.size() <= 0.0 {
            return Vec3::ONE;
        }
        let grid_ray = self.grid_ray(ray, instance);
        let hit = self.lbvh.traverse_tree_until(&grid_ray, segment, segment.size());
        if hit.is_miss() {
            return Vec3::ONE;
        }

        let speed = ray.direction.length();
        let mut tr = 1.0f32;
        let mut t = hit.t_near;
        loop {
            t += self.step(speed, sampler);
            if t >= hit.t_far {
                break;
            }
            let d = self.density_at(grid_ray.at(t));
            tr *= (1.0 - d * self.inv_max_density).max(0.0);

            if tr < RR_THRESHOLD {
                let q = (1.0 - tr).max(RR_MIN_Q);
                if sampler.next_f32() < q {
                    return Vec3::ZERO;
                }
                tr /= 1.0 - q;
            }
        }
        Vec3::splat(tr)
    }

    /// Delta tracking inside the occupied span of `segment`.
    pub fn sample(
        &self,
        ray: &Ray,
        segment: Interval,
        instance: &InstancedModel,
        phase: &Bsdf,
        sampler: &mut Sampler,
    ) -> SampleOutcome {
        if segment.size() <= 0.0 {
            return SampleOutcome::Missed;
        }
        let grid_ray = self.grid_ray(ray, instance);
        let hit = self.lbvh.traverse_tree_until(&grid_ray, segment, segment.size());
        if hit.is_miss() {
            return SampleOutcome::Missed;
        }
        if self.is_transparent() {
            return SampleOutcome::PassedThrough { weight: Vec3::ONE };
        }

        let speed = ray.direction.length();
        let mut t = hit.t_near;
        loop {
            t += self.step(speed, sampler);
            if t >= hit.t_far {
                return SampleOutcome::PassedThrough { weight: Vec3::ONE };
            }
            let d = self.density_at(grid_ray.at(t));
            if sampler.next_f32() < d * self.inv_max_density {
                let Some(direction) = scatter_direction(phase, ray.direction, sampler) else {
                    return SampleOutcome::PassedThrough { weight: Vec3::ZERO };
                };
                return SampleOutcome::Scattered {
                    t,
                    direction,
                    weight: self.scattering * self.density / self.sigma_t(),
                };
            }
        }
    }
}

/// Closed set of media.
#[derive(Debug, Clone)]
pub enum Medium {
    Homogeneous(HomogeneousMedium),
    Grid(GridMedium),
}

impl Medium {
    /// Transmittance along `segment` of a world ray inside `instance`.
    pub fn tr(&self, ray: &Ray, segment: Interval, instance: &InstancedModel, sampler: &mut Sampler) -> Vec3 {
        match self {
            Medium::Homogeneous(m) => m.tr(ray, segment),
            Medium::Grid(m) => m.tr(ray, segment, instance, sampler),
        }
    }

    /// Sample a free-flight distance and, on a scattering event, a new
    /// direction from `phase`.
    pub fn sample(
        &self,
        ray: &Ray,
        segment: Interval,
        instance: &InstancedModel,
        phase: &Bsdf,
        sampler: &mut Sampler,
    ) -> SampleOutcome {
        match self {
            Medium::Homogeneous(m) => m.sample(ray, segment, phase, sampler),
            Medium::Grid(m) => m.sample(ray, segment, instance, phase, sampler),
        }
    }
}

/// Extinction must stay non-negative.
fn check_coefficients(absorption: Vec3, scattering: Vec3, density: f32) -> ConfigResult<()> {
    let valid = |v: f32| v >= 0.0;
    if absorption.to_array().into_iter().all(valid) && scattering.to_array().into_iter().all(valid) && valid(density) {
        Ok(())
    } else {
        Err(ConfigError::NegativeCoefficient {
            absorption,
            scattering,
            density,
        })
    }
}

#[inline]
fn positive_or_one(pdf: f32) -> f32 {
    if pdf > 0.0 {
        pdf
    } else {
        1.0
    }
}

/// Sample the phase function in the frame whose z-axis is the travel
/// direction.
fn scatter_direction(phase: &Bsdf, direction: Vec3, sampler: &mut Sampler) -> Option<Vec3> {
    let frame = Frame::from_normal(direction.normalize_or_zero());
    let wo = frame.to_local(-direction.normalize_or_zero());
    phase
        .sample(wo, sampler.next_2d())
        .map(|wi| frame.to_world(wi).normalize_or_zero())
        .filter(|wi| *wi != Vec3::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Shape;
    use crate::{HenyeyGreenstein, Model};
    use narval_math::Mat4;

    fn unit_box() -> InstancedModel {
        let model = Model::from_shape(
            "box",
            Shape::Box {
                min: Vec3::splat(-0.5),
                max: Vec3::splat(0.5),
            },
            0,
        );
        InstancedModel::new(Arc::new(model), Mat4::IDENTITY)
    }

    fn constant_grid(n: u32, value: f32) -> Arc<Texture> {
        let values = vec![value; (n * n * n) as usize];
        Arc::new(Texture::from_density([n, n, n], &values).unwrap())
    }

    fn through_centre() -> (Ray, Interval) {
        (Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z), Interval::new(4.5, 5.5))
    }

    #[test]
    fn test_homogeneous_beer_lambert() {
        let medium = HomogeneousMedium::new(Vec3::new(0.5, 0.0, 1.0), Vec3::new(0.5, 1.0, 1.0), 2.0).unwrap();
        let (ray, segment) = through_centre();
        let tr = medium.tr(&ray, segment);
        assert!((tr.x - (-2.0f32).exp()).abs() < 1e-5);
        assert!((tr.y - (-2.0f32).exp()).abs() < 1e-5);
        assert!((tr.z - (-4.0f32).exp()).abs() < 1e-5);
    }

    #[test]
    fn test_homogeneous_scatter_probability() {
        let medium = HomogeneousMedium::new(Vec3::ZERO, Vec3::ONE, 1.0).unwrap();
        let (ray, segment) = through_centre();
        let phase = Bsdf::Isotropic;
        let mut sampler = Sampler::new(3);

        let n = 50_000;
        let mut scattered = 0;
        for _ in 0..n {
            match medium.sample(&ray, segment, &phase, &mut sampler) {
                SampleOutcome::Scattered { t, direction, weight } => {
                    scattered += 1;
                    assert!(segment.contains(t));
                    assert!((direction.length() - 1.0).abs() < 1e-3);
                    // Pure scatterer: the weight is exactly one
                    assert!((weight - Vec3::ONE).length() < 1e-4);
                }
                SampleOutcome::PassedThrough { weight } => {
                    assert!((weight - Vec3::ONE).length() < 1e-4);
                }
                SampleOutcome::Missed => panic!("homogeneous media never miss"),
            }
        }
        let fraction = scattered as f32 / n as f32;
        let expected = 1.0 - (-1.0f32).exp();
        assert!((fraction - expected).abs() < 0.01, "scatter fraction {fraction}");
    }

    #[test]
    fn test_empty_homogeneous_passes_through() {
        let medium = HomogeneousMedium::new(Vec3::ZERO, Vec3::ZERO, 1.0).unwrap();
        let (ray, segment) = through_centre();
        let mut sampler = Sampler::new(0);
        assert_eq!(
            medium.sample(&ray, segment, &Bsdf::Isotropic, &mut sampler),
            SampleOutcome::PassedThrough { weight: Vec3::ONE }
        );
    }

    #[test]
    fn test_grid_ratio_tracking_matches_optical_depth() {
        let n = 8;
        let medium = GridMedium::new(constant_grid(n, 1.0), Vec3::ZERO, Vec3::ONE, 1.0).unwrap();
        let instance = unit_box();
        let (ray, segment) = through_centre();
        let mut sampler = Sampler::new(11);

        // Trilinear reconstruction ramps from 0.5 to 1 over the outer half
        // voxel on both ends of the path
        let optical_depth = (n as f32 - 0.25) / n as f32;
        let trials = 20_000;
        let mut sum = 0.0;
        for _ in 0..trials {
            let tr = medium.tr(&ray, segment, &instance, &mut sampler);
            assert!(tr.x >= 0.0 && tr.x.is_finite());
            sum += tr.x;
        }
        let estimate = sum / trials as f32;
        assert!(
            (estimate - (-optical_depth).exp()).abs() < 0.02,
            "tr {estimate}, expected {}",
            (-optical_depth).exp()
        );
    }

    #[test]
    fn test_grid_delta_tracking_scatter_fraction() {
        let n = 8;
        let medium = GridMedium::new(constant_grid(n, 2.0), Vec3::ZERO, Vec3::ONE, 0.5).unwrap();
        let instance = unit_box();
        let (ray, segment) = through_centre();
        let phase = Bsdf::HenyeyGreenstein(HenyeyGreenstein::new(0.3));
        let mut sampler = Sampler::new(17);

        let trials = 20_000;
        let mut passed = 0;
        for _ in 0..trials {
            match medium.sample(&ray, segment, &instance, &phase, &mut sampler) {
                SampleOutcome::Scattered { t, weight, .. } => {
                    assert!(t >= segment.min && t <= segment.max);
                    assert!((weight - Vec3::ONE).length() < 1e-4);
                }
                SampleOutcome::PassedThrough { .. } => passed += 1,
                SampleOutcome::Missed => panic!("the ray crosses occupied voxels"),
            }
        }
        let optical_depth = (n as f32 - 0.25) / n as f32;
        let fraction = passed as f32 / trials as f32;
        assert!((fraction - (-optical_depth).exp()).abs() < 0.02, "pass fraction {fraction}");
    }

    #[test]
    fn test_grid_reports_missed_voxels() {
        // Only the voxel in the (0, 0, 0) corner is occupied
        let n = 8usize;
        let mut values = vec![0.0; n * n * n];
        values[0] = 1.0;
        let grid = Arc::new(Texture::from_density([8, 8, 8], &values).unwrap());
        let medium = GridMedium::new(grid, Vec3::ZERO, Vec3::ONE, 1.0).unwrap();
        let instance = unit_box();
        let (ray, segment) = through_centre();
        let mut sampler = Sampler::new(5);

        assert_eq!(
            medium.sample(&ray, segment, &instance, &Bsdf::Isotropic, &mut sampler),
            SampleOutcome::Missed
        );
        assert_eq!(medium.tr(&ray, segment, &instance, &mut sampler), Vec3::ONE);
    }

    #[test]
    fn test_scaled_instance_uses_world_distances() {
        // Stretching the box along z doubles the optical depth
        let n = 4;
        let medium = Medium::Grid(GridMedium::new(constant_grid(n, 1.0), Vec3::ONE, Vec3::ZERO, 1.0).unwrap());
        let model = Arc::clone(unit_box().model());
        let instance = InstancedModel::new(model, Mat4::from_scale(Vec3::new(1.0, 1.0, 2.0)));
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let segment = Interval::new(4.0, 6.0);
        let mut sampler = Sampler::new(23);

        let trials = 20_000;
        let estimate: f32 =
            (0..trials).map(|_| medium.tr(&ray, segment, &instance, &mut sampler).x).sum::<f32>() / trials as f32;
        let optical_depth = 2.0 * (n as f32 - 0.25) / n as f32;
        assert!((estimate - (-optical_depth).exp()).abs() < 0.02, "tr {estimate}");
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let grid = Arc::new(Texture::new(1025, 1, 1, vec![[1.0; 4]; 1025]).unwrap());
        let err = GridMedium::new(grid, Vec3::ZERO, Vec3::ONE, 1.0).unwrap_err();
        assert!(matches!(err, ConfigError::GridTooLarge { .. }));
    }

    #[test]
    fn test_negative_grid_texel_is_rejected() {
        // Grids handed over by an importer skip the checks of from_density
        let mut pixels = vec![[1.0; 4]; 8];
        pixels[3] = [-5.0, -5.0, -5.0, 1.0];
        let grid = Arc::new(Texture::new(2, 2, 2, pixels).unwrap());
        match GridMedium::new(grid, Vec3::ZERO, Vec3::ONE, 1.0) {
            Err(ConfigError::NegativeDensity { x, y, z, value }) => {
                assert_eq!((x, y, z), (1, 1, 0));
                assert_eq!(value, -5.0);
            }
            other => panic!("expected NegativeDensity, got {other:?}"),
        }

        let mut pixels = vec![[1.0; 4]; 8];
        pixels[0][0] = f32::NAN;
        let grid = Arc::new(Texture::new(2, 2, 2, pixels).unwrap());
        assert!(GridMedium::new(grid, Vec3::ZERO, Vec3::ONE, 1.0).is_err());
    }

    #[test]
    fn test_negative_coefficients_are_rejected() {
        for (absorption, scattering, density) in [
            (Vec3::new(0.0, -0.1, 0.0), Vec3::ONE, 1.0),
            (Vec3::ZERO, Vec3::splat(-1.0), 1.0),
            (Vec3::ZERO, Vec3::ONE, -2.0),
            (Vec3::ZERO, Vec3::ONE, f32::NAN),
        ] {
            assert!(matches!(
                HomogeneousMedium::new(absorption, scattering, density),
                Err(ConfigError::NegativeCoefficient { .. })
            ));
            assert!(matches!(
                GridMedium::new(constant_grid(2, 1.0), absorption, scattering, density),
                Err(ConfigError::NegativeCoefficient { .. })
            ));
        }
        assert!(HomogeneousMedium::new(Vec3::ZERO, Vec3::ZERO, 0.0).is_ok());
    }
}
