//! Random numbers, warps and discrete distributions for Monte Carlo sampling.
//!
//! Every render task owns its own [`Sampler`]; nothing in the light-transport
//! code touches a process-wide generator, which keeps renders reproducible no
//! matter how tiles are scheduled.

use crate::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{FRAC_1_PI, PI};

/// Largest f32 strictly below one.
pub const ONE_MINUS_EPSILON: f32 = 1.0 - f32::EPSILON / 2.0;

/// Constant pdf of uniform sphere sampling.
pub const UNIFORM_SPHERE_PDF: f32 = 1.0 / (4.0 * PI);

/// Per-task random number generator.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Independent stream for task `index` (a tile, a thread) under `root_seed`.
    pub fn for_task(root_seed: u64, index: u64) -> Self {
        Self::new(split_mix(root_seed ^ split_mix(index.wrapping_add(0x9E37_79B9_7F4A_7C15))))
    }

    /// Uniform sample in `[0, 1)`.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        self.rng.gen::<f32>().min(ONE_MINUS_EPSILON)
    }

    /// Two uniform samples in `[0, 1)^2`.
    #[inline]
    pub fn next_2d(&mut self) -> Vec2 {
        Vec2::new(self.next_f32(), self.next_f32())
    }

    /// Uniform index in `0..n` (n > 0).
    #[inline]
    pub fn next_index(&mut self, n: usize) -> usize {
        ((self.next_f32() * n as f32) as usize).min(n - 1)
    }
}

/// SplitMix64 finaliser, used to decorrelate task seeds.
fn split_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Direction from spherical coordinates around the z-axis.
#[inline]
pub fn spherical_direction(sin_theta: f32, cos_theta: f32, phi: f32) -> Vec3 {
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Uniformly distributed direction on the unit sphere.
pub fn uniform_sample_sphere(u: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Uniform point on the unit disk (Shirley-Chiu concentric mapping).
pub fn concentric_sample_disk(u: Vec2) -> Vec2 {
    let offset = 2.0 * u - Vec2::ONE;
    if offset.x == 0.0 && offset.y == 0.0 {
        return Vec2::ZERO;
    }
    let (r, theta) = if offset.x.abs() > offset.y.abs() {
        (offset.x, std::f32::consts::FRAC_PI_4 * (offset.y / offset.x))
    } else {
        (
            offset.y,
            std::f32::consts::FRAC_PI_2 - std::f32::consts::FRAC_PI_4 * (offset.x / offset.y),
        )
    };
    r * Vec2::new(theta.cos(), theta.sin())
}

/// Cosine-weighted direction on the +z hemisphere.
pub fn cosine_sample_hemisphere(u: Vec2) -> Vec3 {
    let d = concentric_sample_disk(u);
    let z = (1.0 - d.x * d.x - d.y * d.y).max(0.0).sqrt();
    Vec3::new(d.x, d.y, z)
}

#[inline]
pub fn cosine_hemisphere_pdf(cos_theta: f32) -> f32 {
    cos_theta * FRAC_1_PI
}

/// Uniform barycentrics `(b0, b1)` over a triangle.
pub fn uniform_sample_triangle(u: Vec2) -> (f32, f32) {
    let su0 = u.x.sqrt();
    (1.0 - su0, u.y * su0)
}

/// Power heuristic with beta = 2.
#[inline]
pub fn power_heuristic(nf: u32, f_pdf: f32, ng: u32, g_pdf: f32) -> f32 {
    let f = nf as f32 * f_pdf;
    let g = ng as f32 * g_pdf;
    if f.is_infinite() {
        return 1.0;
    }
    let denom = f * f + g * g;
    if denom == 0.0 {
        0.0
    } else {
        (f * f) / denom
    }
}

/// Piecewise-constant 1-D distribution over `[0, 1)`.
#[derive(Debug, Clone)]
pub struct Distribution1D {
    func: Vec<f32>,
    cdf: Vec<f32>,
    func_int: f32,
}

impl Distribution1D {
    /// Build from non-negative function values. An all-zero function falls
    /// back to the uniform distribution.
    pub fn new(func: &[f32]) -> Self {
        let n = func.len().max(1);
        let func: Vec<f32> = if func.is_empty() {
            vec![0.0]
        } else {
            func.iter().map(|f| f.max(0.0)).collect()
        };

        let mut cdf = vec![0.0f32; n + 1];
        for i in 1..=n {
            cdf[i] = cdf[i - 1] + func[i - 1] / n as f32;
        }
        let func_int = cdf[n];
        if func_int == 0.0 {
            for (i, c) in cdf.iter_mut().enumerate() {
                *c = i as f32 / n as f32;
            }
        } else {
            for c in cdf.iter_mut() {
                *c /= func_int;
            }
        }

        Self { func, cdf, func_int }
    }

    pub fn count(&self) -> usize {
        self.func.len()
    }

    /// Integral of the function over `[0, 1)`.
    pub fn integral(&self) -> f32 {
        self.func_int
    }

    /// Index of the segment containing `u`.
    fn find_interval(&self, u: f32) -> usize {
        // Last index with cdf[i] <= u, clamped to a valid segment
        let upper = self.cdf.partition_point(|&c| c <= u);
        upper.saturating_sub(1).min(self.count() - 1)
    }

    /// Sample a continuous value; returns `(x, pdf, segment)`.
    pub fn sample_continuous(&self, u: f32) -> (f32, f32, usize) {
        let offset = self.find_interval(u);
        let width = self.cdf[offset + 1] - self.cdf[offset];
        let du = if width > 0.0 {
            (u - self.cdf[offset]) / width
        } else {
            0.0
        };
        let pdf = if self.func_int > 0.0 {
            self.func[offset] / self.func_int
        } else {
            1.0
        };
        ((offset as f32 + du) / self.count() as f32, pdf, offset)
    }

    /// Sample a segment index; returns `(index, probability)`.
    pub fn sample_discrete(&self, u: f32) -> (usize, f32) {
        let offset = self.find_interval(u);
        (offset, self.discrete_pdf(offset))
    }

    /// Probability of picking segment `index` in [`Self::sample_discrete`].
    pub fn discrete_pdf(&self, index: usize) -> f32 {
        if self.func_int > 0.0 {
            self.func[index] / (self.func_int * self.count() as f32)
        } else {
            1.0 / self.count() as f32
        }
    }

    /// Density of [`Self::sample_continuous`] at `x`.
    pub fn pdf(&self, x: f32) -> f32 {
        let index = ((x * self.count() as f32) as usize).min(self.count() - 1);
        if self.func_int > 0.0 {
            self.func[index] / self.func_int
        } else {
            1.0
        }
    }
}

/// Piecewise-constant 2-D distribution over `[0, 1)^2`, row-major `nu × nv`.
#[derive(Debug, Clone)]
pub struct Distribution2D {
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
}

impl Distribution2D {
    pub fn new(func: &[f32], nu: usize, nv: usize) -> Self {
        let conditional: Vec<Distribution1D> = (0..nv)
            .map(|v| Distribution1D::new(&func[v * nu..(v + 1) * nu]))
            .collect();
        let marginal_func: Vec<f32> = conditional.iter().map(|d| d.integral()).collect();
        Self {
            conditional,
            marginal: Distribution1D::new(&marginal_func),
        }
    }

    /// Sample a point; returns `(uv, pdf)`.
    pub fn sample_continuous(&self, u: Vec2) -> (Vec2, f32) {
        let (v, pdf_v, row) = self.marginal.sample_continuous(u.y);
        let (x, pdf_u, _) = self.conditional[row].sample_continuous(u.x);
        (Vec2::new(x, v), pdf_u * pdf_v)
    }

    pub fn pdf(&self, uv: Vec2) -> f32 {
        let nv = self.conditional.len();
        let row = ((uv.y * nv as f32) as usize).min(nv - 1);
        self.conditional[row].pdf(uv.x) * self.marginal.pdf(uv.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_bounds() {
        let mut sampler = Sampler::new(0);
        for _ in 0..100_000 {
            let x = sampler.next_f32();
            assert!((0.0..=1.0).contains(&x), "sample {x} out of range");
        }
    }

    #[test]
    fn test_task_streams_are_reproducible_and_distinct() {
        let mut a = Sampler::for_task(42, 3);
        let mut b = Sampler::for_task(42, 3);
        let mut c = Sampler::for_task(42, 4);

        let sa: Vec<f32> = (0..8).map(|_| a.next_f32()).collect();
        let sb: Vec<f32> = (0..8).map(|_| b.next_f32()).collect();
        let sc: Vec<f32> = (0..8).map(|_| c.next_f32()).collect();
        assert_eq!(sa, sb);
        assert_ne!(sa, sc);
    }

    #[test]
    fn test_uniform_sphere_is_unit_and_centered() {
        let mut sampler = Sampler::new(1);
        let mut sum = Vec3::ZERO;
        let n = 50_000;
        for _ in 0..n {
            let d = uniform_sample_sphere(sampler.next_2d());
            assert!((d.length() - 1.0).abs() < 1e-4);
            sum += d;
        }
        assert!((sum / n as f32).length() < 0.02);
    }

    #[test]
    fn test_cosine_hemisphere_stays_above_plane() {
        let mut sampler = Sampler::new(2);
        for _ in 0..10_000 {
            let d = cosine_sample_hemisphere(sampler.next_2d());
            assert!(d.z >= 0.0);
            assert!((d.length() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_power_heuristic() {
        assert_eq!(power_heuristic(1, 1.0, 1, 0.0), 1.0);
        assert_eq!(power_heuristic(1, 0.0, 1, 1.0), 0.0);
        assert!((power_heuristic(1, 1.0, 1, 1.0) - 0.5).abs() < 1e-6);
        assert!((power_heuristic(1, 3.0, 1, 1.0) - 0.9).abs() < 1e-6);
        assert_eq!(power_heuristic(1, 0.0, 1, 0.0), 0.0);
    }

    #[test]
    fn test_distribution1d_discrete() {
        let dist = Distribution1D::new(&[1.0, 3.0, 0.0]);
        assert!((dist.discrete_pdf(0) - 0.25).abs() < 1e-6);
        assert!((dist.discrete_pdf(1) - 0.75).abs() < 1e-6);
        assert_eq!(dist.discrete_pdf(2), 0.0);

        assert_eq!(dist.sample_discrete(0.1).0, 0);
        assert_eq!(dist.sample_discrete(0.5).0, 1);
        assert_eq!(dist.sample_discrete(0.999).0, 1);
    }

    #[test]
    fn test_distribution1d_continuous_pdf_matches() {
        let dist = Distribution1D::new(&[1.0, 2.0, 3.0, 4.0]);
        let mut sampler = Sampler::new(5);
        for _ in 0..1000 {
            let (x, pdf, _) = dist.sample_continuous(sampler.next_f32());
            assert!((0.0..1.0).contains(&x));
            assert!((dist.pdf(x) - pdf).abs() < 1e-4);
        }
    }

    #[test]
    fn test_distribution1d_all_zero_is_uniform() {
        let dist = Distribution1D::new(&[0.0, 0.0]);
        let (x, pdf, _) = dist.sample_continuous(0.75);
        assert!((x - 0.75).abs() < 1e-6);
        assert_eq!(pdf, 1.0);
    }

    #[test]
    fn test_distribution2d_concentrates_mass() {
        // Only the bottom-right cell has weight
        let dist = Distribution2D::new(&[0.0, 0.0, 0.0, 1.0], 2, 2);
        let mut sampler = Sampler::new(9);
        for _ in 0..100 {
            let (uv, pdf) = dist.sample_continuous(sampler.next_2d());
            assert!(uv.x >= 0.5 && uv.y >= 0.5, "sample {uv:?} outside the lit cell");
            assert!((pdf - 4.0).abs() < 1e-3);
        }
    }
}
