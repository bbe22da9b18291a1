//! Surface BSDFs and volumetric phase functions.
//!
//! Everything here works in a local frame whose z-axis is the shading
//! normal (surfaces) or an arbitrary reference axis (media). `wo` points
//! back along the incoming ray, `wi` is the scattered direction; both
//! point away from the scattering point.

use std::f32::consts::{FRAC_1_PI, PI};

use narval_math::frame::{cos_theta, reflect, same_hemisphere, Frame};
use narval_math::sampling::{
    cosine_hemisphere_pdf, cosine_sample_hemisphere, spherical_direction, uniform_sample_sphere,
    UNIFORM_SPHERE_PDF,
};
use narval_math::{Vec2, Vec3};

/// Smallest GGX alpha; perfectly smooth mirrors are not supported.
const MIN_ALPHA: f32 = 1e-3;

/// Lower bound of the Henyey-Greenstein denominator.
const HG_MIN_DENOM: f32 = 1e-6;

/// Lobe flags of a scattering function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BxdfType(u8);

impl BxdfType {
    pub const REFLECTION: BxdfType = BxdfType(1);
    pub const TRANSMISSION: BxdfType = BxdfType(2);

    pub fn contains(self, other: BxdfType) -> bool {
        self.0 & other.0 == other.0
    }
}

/// GGX microfacet reflection with Schlick Fresnel and a Lambertian base
/// weighted by `1 - metallic`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlossyBsdf {
    pub albedo: Vec3,
    pub roughness: f32,
    pub metallic: f32,
}

impl GlossyBsdf {
    pub fn new(albedo: Vec3, roughness: f32, metallic: f32) -> Self {
        Self {
            albedo,
            roughness: roughness.clamp(0.0, 1.0),
            metallic: metallic.clamp(0.0, 1.0),
        }
    }

    #[inline]
    fn alpha(&self) -> f32 {
        (self.roughness * self.roughness).max(MIN_ALPHA)
    }

    /// GGX normal distribution.
    fn distribution(&self, n_dot_h: f32) -> f32 {
        let a2 = self.alpha() * self.alpha();
        let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
        a2 / (PI * d * d)
    }

    /// Smith masking for one direction.
    fn smith_g1(&self, n_dot_v: f32) -> f32 {
        let a2 = self.alpha() * self.alpha();
        2.0 * n_dot_v / (n_dot_v + (a2 + (1.0 - a2) * n_dot_v * n_dot_v).sqrt())
    }

    fn fresnel(&self, v_dot_h: f32) -> Vec3 {
        let f0 = Vec3::splat(0.04).lerp(self.albedo, self.metallic);
        f0 + (Vec3::ONE - f0) * (1.0 - v_dot_h).clamp(0.0, 1.0).powi(5)
    }

    /// Projected BSDF `fr(wo, wi) * cos(theta_i)`.
    pub fn eval(&self, wo: Vec3, wi: Vec3) -> Vec3 {
        let n_dot_v = cos_theta(wo);
        let n_dot_l = cos_theta(wi);
        if n_dot_v <= 0.0 || n_dot_l <= 0.0 {
            return Vec3::ZERO;
        }
        let h = (wo + wi).normalize_or_zero();
        if h == Vec3::ZERO {
            return Vec3::ZERO;
        }

        let d = self.distribution(cos_theta(h));
        let g = self.smith_g1(n_dot_v) * self.smith_g1(n_dot_l);
        let f = self.fresnel(wo.dot(h));
        let specular = f * (d * g / (4.0 * n_dot_v * n_dot_l));
        let diffuse = self.albedo * ((1.0 - self.metallic) * FRAC_1_PI);
        (specular + diffuse) * n_dot_l
    }

    /// Sample a microfacet normal from the GGX distribution and mirror `wo`.
    pub fn sample(&self, wo: Vec3, u: Vec2) -> Option<Vec3> {
        if cos_theta(wo) <= 0.0 {
            return None;
        }
        let alpha = self.alpha();
        let tan2_theta = alpha * alpha * u.x / (1.0 - u.x).max(f32::EPSILON);
        let cos_h = 1.0 / (1.0 + tan2_theta).sqrt();
        let sin_h = (1.0 - cos_h * cos_h).max(0.0).sqrt();
        let h = spherical_direction(sin_h, cos_h, 2.0 * PI * u.y);

        let wi = reflect(wo, h);
        same_hemisphere(wo, wi).then_some(wi)
    }

    /// Density of [`Self::sample`]: `D(h) cos(theta_h) / (4 |wo.h|)`.
    pub fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        if !same_hemisphere(wo, wi) || cos_theta(wo) <= 0.0 {
            return 0.0;
        }
        let h = (wo + wi).normalize_or_zero();
        let v_dot_h = wo.dot(h).abs();
        if h == Vec3::ZERO || v_dot_h == 0.0 {
            return 0.0;
        }
        let n_dot_h = cos_theta(h).abs();
        self.distribution(n_dot_h) * n_dot_h / (4.0 * v_dot_h)
    }
}

/// Ideal diffuse reflection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertianBsdf {
    pub albedo: Vec3,
}

impl LambertianBsdf {
    pub fn eval(&self, wo: Vec3, wi: Vec3) -> Vec3 {
        if cos_theta(wo) <= 0.0 || cos_theta(wi) <= 0.0 {
            return Vec3::ZERO;
        }
        self.albedo * FRAC_1_PI * cos_theta(wi)
    }

    pub fn sample(&self, wo: Vec3, u: Vec2) -> Option<Vec3> {
        (cos_theta(wo) > 0.0).then(|| cosine_sample_hemisphere(u))
    }

    pub fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        if cos_theta(wo) <= 0.0 || cos_theta(wi) <= 0.0 {
            return 0.0;
        }
        cosine_hemisphere_pdf(cos_theta(wi))
    }
}

/// Henyey-Greenstein phase function with asymmetry `g` in `[-1, 1]`;
/// positive values scatter forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HenyeyGreenstein {
    pub g: f32,
}

impl HenyeyGreenstein {
    pub fn new(g: f32) -> Self {
        Self {
            g: g.clamp(-0.999, 0.999),
        }
    }

    /// Phase value for the cosine between propagation and scattered direction.
    pub fn phase(&self, cos_theta: f32) -> f32 {
        let g = self.g;
        let denom = (1.0 + g * g - 2.0 * g * cos_theta).max(HG_MIN_DENOM);
        (1.0 - g * g) / (4.0 * PI * denom * denom.sqrt())
    }

    pub fn eval(&self, wo: Vec3, wi: Vec3) -> f32 {
        self.phase(-wo.dot(wi))
    }

    pub fn sample(&self, wo: Vec3, u: Vec2) -> Vec3 {
        let g = self.g;
        let cos_theta = if g.abs() < 1e-3 {
            1.0 - 2.0 * u.x
        } else {
            let sqr = (1.0 - g * g) / (1.0 + g - 2.0 * g * u.x);
            (1.0 + g * g - sqr * sqr) / (2.0 * g)
        }
        .clamp(-1.0, 1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let local = spherical_direction(sin_theta, cos_theta, 2.0 * PI * u.y);
        Frame::from_normal(-wo).to_world(local)
    }
}

/// Closed set of scattering functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bsdf {
    Glossy(GlossyBsdf),
    Lambertian(LambertianBsdf),
    Isotropic,
    HenyeyGreenstein(HenyeyGreenstein),
}

impl Bsdf {
    /// Phase functions are flagged as transmission: hitting a material
    /// with one means entering a medium.
    pub fn bxdf_type(&self) -> BxdfType {
        match self {
            Bsdf::Glossy(_) | Bsdf::Lambertian(_) => BxdfType::REFLECTION,
            Bsdf::Isotropic | Bsdf::HenyeyGreenstein(_) => BxdfType::TRANSMISSION,
        }
    }

    pub fn is_phase_function(&self) -> bool {
        self.bxdf_type().contains(BxdfType::TRANSMISSION)
    }

    /// Projected scattering value. Phase functions return their value in
    /// every channel.
    pub fn eval(&self, wo: Vec3, wi: Vec3) -> Vec3 {
        match self {
            Bsdf::Glossy(b) => b.eval(wo, wi),
            Bsdf::Lambertian(b) => b.eval(wo, wi),
            Bsdf::Isotropic => Vec3::splat(UNIFORM_SPHERE_PDF),
            Bsdf::HenyeyGreenstein(hg) => Vec3::splat(hg.eval(wo, wi)),
        }
    }

    /// Sample a scattered direction, `None` when no valid direction exists.
    pub fn sample(&self, wo: Vec3, u: Vec2) -> Option<Vec3> {
        match self {
            Bsdf::Glossy(b) => b.sample(wo, u),
            Bsdf::Lambertian(b) => b.sample(wo, u),
            Bsdf::Isotropic => Some(uniform_sample_sphere(u)),
            Bsdf::HenyeyGreenstein(hg) => Some(hg.sample(wo, u)),
        }
    }

    pub fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        match self {
            Bsdf::Glossy(b) => b.pdf(wo, wi),
            Bsdf::Lambertian(b) => b.pdf(wo, wi),
            Bsdf::Isotropic => UNIFORM_SPHERE_PDF,
            Bsdf::HenyeyGreenstein(hg) => hg.eval(wo, wi),
        }
    }

    /// Copy with the base color replaced (texture lookups).
    pub fn with_albedo(self, albedo: Vec3) -> Self {
        match self {
            Bsdf::Glossy(b) => Bsdf::Glossy(GlossyBsdf { albedo, ..b }),
            Bsdf::Lambertian(_) => Bsdf::Lambertian(LambertianBsdf { albedo }),
            other => other,
        }
    }
}
