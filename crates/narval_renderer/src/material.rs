//! Materials bind scattering, media, emission and texture channels.

use std::sync::Arc;

use narval_core::{Texture, TextureName};
use narval_math::{Vec2, Vec3};

use crate::{Bsdf, GlossyBsdf, LambertianBsdf, Medium};

/// Albedo of the fallback material used by lenient scene loads.
const FALLBACK_ALBEDO: f32 = 0.5;

/// Surface, medium or emitter description shared by every primitive that
/// references it.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    /// Surface BSDF, or the phase function of `medium`
    pub bsdf: Option<Bsdf>,
    pub medium: Option<Medium>,
    /// Radiance of the lights created for instances using this material
    pub emission: Option<Vec3>,
    textures: Vec<(TextureName, Arc<Texture>)>,
}

impl Material {
    fn with_parts(name: impl Into<String>, bsdf: Option<Bsdf>, medium: Option<Medium>, emission: Option<Vec3>) -> Self {
        Self {
            name: name.into(),
            bsdf,
            medium,
            emission,
            textures: Vec::new(),
        }
    }

    pub fn lambertian(name: impl Into<String>, albedo: Vec3) -> Self {
        Self::with_parts(name, Some(Bsdf::Lambertian(LambertianBsdf { albedo })), None, None)
    }

    pub fn glossy(name: impl Into<String>, albedo: Vec3, roughness: f32, metallic: f32) -> Self {
        Self::with_parts(
            name,
            Some(Bsdf::Glossy(GlossyBsdf::new(albedo, roughness, metallic))),
            None,
            None,
        )
    }

    /// Emitters have no BSDF: paths end on them.
    pub fn emitter(name: impl Into<String>, radiance: Vec3) -> Self {
        Self::with_parts(name, None, None, Some(radiance))
    }

    /// Participating medium; `phase` must be a phase function.
    pub fn medium(name: impl Into<String>, medium: Medium, phase: Bsdf) -> Self {
        Self::with_parts(name, Some(phase), Some(medium), None)
    }

    /// Flat grey diffuse stand-in for materials that failed to load.
    pub fn fallback() -> Self {
        Self::lambertian("fallback", Vec3::splat(FALLBACK_ALBEDO))
    }

    pub fn with_texture(mut self, channel: TextureName, texture: Arc<Texture>) -> Self {
        self.textures.retain(|(name, _)| *name != channel);
        self.textures.push((channel, texture));
        self
    }

    pub fn texture(&self, channel: TextureName) -> Option<&Arc<Texture>> {
        self.textures
            .iter()
            .find(|(name, _)| *name == channel)
            .map(|(_, texture)| texture)
    }

    /// True when hitting this material means entering a medium.
    pub fn is_medium(&self) -> bool {
        self.medium.is_some() && self.bsdf.is_some_and(|b| b.is_phase_function())
    }

    pub fn is_emitter(&self) -> bool {
        self.emission.is_some()
    }

    /// BSDF at surface coordinates `uv` with texture channels applied.
    pub fn bsdf_at(&self, uv: Vec2) -> Option<Bsdf> {
        let bsdf = self.bsdf?;
        let bsdf = match self.texture(TextureName::Albedo) {
            Some(texture) => {
                let texel = texture.sample(uv.x, uv.y).truncate();
                let base = match bsdf {
                    Bsdf::Glossy(b) => b.albedo,
                    Bsdf::Lambertian(b) => b.albedo,
                    _ => return Some(bsdf),
                };
                bsdf.with_albedo(base * texel)
            }
            None => bsdf,
        };

        Some(match bsdf {
            Bsdf::Glossy(mut glossy) => {
                if let Some(texture) = self.texture(TextureName::Roughness) {
                    glossy.roughness = (glossy.roughness * texture.sample(uv.x, uv.y).x).clamp(0.0, 1.0);
                }
                if let Some(texture) = self.texture(TextureName::Metallic) {
                    glossy.metallic = (glossy.metallic * texture.sample(uv.x, uv.y).x).clamp(0.0, 1.0);
                }
                Bsdf::Glossy(glossy)
            }
            other => other,
        })
    }
}
