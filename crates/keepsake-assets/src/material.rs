// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Material promises: a composite of up to four texture sub-promises.

use std::{cell::RefCell, rc::Rc};

use keepsake_core::{
    asset::{Asset, AssetHandle},
    math::LinearRgba,
};
use keepsake_keeper::{AssetPromise, BuildFuture, Dependency, LoadContext};
use serde::{Deserialize, Serialize};

use crate::texture::{Texture, TextureModel, TexturePromise, Textures};

/// Render queue of opaque geometry.
pub const QUEUE_GEOMETRY: u32 = 2000;
/// Render queue of alpha-tested geometry.
pub const QUEUE_ALPHA_TEST: u32 = 2450;
/// Render queue of blended geometry.
pub const QUEUE_TRANSPARENT: u32 = 3000;

/// Keyword set when the material emits light.
pub const KEYWORD_EMISSION: &str = "_EMISSION";
/// Keyword set for alpha-tested materials.
pub const KEYWORD_ALPHA_TEST: &str = "_ALPHATEST_ON";
/// Keyword set for alpha-blended materials.
pub const KEYWORD_ALPHA_BLEND: &str = "_ALPHABLEND_ON";
/// Keyword set for materials that both test and blend alpha.
pub const KEYWORD_ALPHA_PREMULTIPLY: &str = "_ALPHAPREMULTIPLY_ON";

/// Requested transparency of a material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransparencyMode {
    /// Never transparent.
    Opaque,
    /// Fragments below the cutoff are discarded.
    AlphaTest,
    /// Fragments are blended by their alpha.
    AlphaBlend,
    /// Alpha test followed by premultiplied blending.
    AlphaTestAndBlend,
    /// Picks [`AlphaBlend`](Self::AlphaBlend) or [`Opaque`](Self::Opaque)
    /// from the material's inputs.
    #[default]
    Auto,
}

impl TransparencyMode {
    /// Resolves [`Auto`](Self::Auto); other modes are returned unchanged.
    pub fn resolve(self, has_alpha_texture: bool, albedo_alpha: f32) -> Self {
        match self {
            Self::Auto if has_alpha_texture || albedo_alpha < 1.0 => Self::AlphaBlend,
            Self::Auto => Self::Opaque,
            mode => mode,
        }
    }
}

/// Blend factor of the color blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    /// `1`
    One,
    /// `0`
    Zero,
    /// Source alpha.
    SrcAlpha,
    /// `1 - source alpha`.
    OneMinusSrcAlpha,
}

/// Whether the surface is rendered in the opaque or the transparent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Opaque pass.
    Opaque,
    /// Transparent pass.
    Transparent,
}

/// Fixed-function state derived from a resolved [`TransparencyMode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    /// The resolved mode; never [`TransparencyMode::Auto`].
    pub mode: TransparencyMode,
    /// Render queue the material is sorted into.
    pub render_queue: u32,
    /// Source blend factor.
    pub src_blend: BlendFactor,
    /// Destination blend factor.
    pub dst_blend: BlendFactor,
    /// Whether depth is written.
    pub z_write: bool,
    /// Whether fragments are clipped against `cutoff`.
    pub alpha_clip: bool,
    /// Alpha cutoff, when the mode tests alpha against one.
    pub cutoff: Option<f32>,
    /// Pass the surface is rendered in.
    pub surface: Surface,
}

impl BlendState {
    /// The state for `mode`, which must already be resolved.
    /// [`TransparencyMode::Auto`] is treated as opaque.
    pub fn for_mode(mode: TransparencyMode, alpha_test: f32) -> Self {
        let opaque = Self {
            mode: TransparencyMode::Opaque,
            render_queue: QUEUE_GEOMETRY,
            src_blend: BlendFactor::One,
            dst_blend: BlendFactor::Zero,
            z_write: true,
            alpha_clip: false,
            cutoff: None,
            surface: Surface::Opaque,
        };

        match mode {
            TransparencyMode::Opaque | TransparencyMode::Auto => opaque,
            TransparencyMode::AlphaTest => Self {
                mode,
                render_queue: QUEUE_ALPHA_TEST,
                alpha_clip: true,
                cutoff: Some(alpha_test),
                ..opaque
            },
            TransparencyMode::AlphaBlend => Self {
                mode,
                render_queue: QUEUE_TRANSPARENT,
                src_blend: BlendFactor::SrcAlpha,
                dst_blend: BlendFactor::OneMinusSrcAlpha,
                z_write: false,
                surface: Surface::Transparent,
                ..opaque
            },
            TransparencyMode::AlphaTestAndBlend => Self {
                mode,
                render_queue: QUEUE_TRANSPARENT,
                src_blend: BlendFactor::One,
                dst_blend: BlendFactor::OneMinusSrcAlpha,
                z_write: false,
                alpha_clip: true,
                surface: Surface::Transparent,
                ..opaque
            },
        }
    }

    /// The shader keyword enabled by this state, if any.
    pub fn keyword(&self) -> Option<&'static str> {
        match self.mode {
            TransparencyMode::AlphaTest => Some(KEYWORD_ALPHA_TEST),
            TransparencyMode::AlphaBlend => Some(KEYWORD_ALPHA_BLEND),
            TransparencyMode::AlphaTestAndBlend => Some(KEYWORD_ALPHA_PREMULTIPLY),
            TransparencyMode::Opaque | TransparencyMode::Auto => None,
        }
    }
}

/// A texture slot of a [`Material`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// Emission map.
    Emission,
    /// Alpha map.
    Alpha,
    /// Albedo (base) map.
    Base,
    /// Normal map.
    Bump,
}

/// The declarative description of a PBR material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialModel {
    /// Base color.
    pub albedo_color: LinearRgba,
    /// Emitted color before intensity is applied.
    pub emissive_color: LinearRgba,
    /// Multiplier applied to `emissive_color`.
    pub emissive_intensity: f32,
    /// Specular color.
    pub reflectivity_color: LinearRgba,
    /// Metalness in `[0, 1]`.
    pub metallic: f32,
    /// Roughness in `[0, 1]`.
    pub roughness: f32,
    /// Strength of environment reflections.
    pub micro_surface: f32,
    /// Strength of specular highlights.
    pub specular_intensity: f32,
    /// Strength of direct lighting, folded into the highlights.
    pub direct_intensity: f32,
    /// Cutoff of alpha-tested modes.
    pub alpha_test: f32,
    /// Requested transparency.
    pub transparency_mode: TransparencyMode,
    /// Albedo map.
    pub albedo_texture: Option<TextureModel>,
    /// Alpha map.
    pub alpha_texture: Option<TextureModel>,
    /// Emission map.
    pub emissive_texture: Option<TextureModel>,
    /// Normal map.
    pub bump_texture: Option<TextureModel>,
}

impl Default for MaterialModel {
    fn default() -> Self {
        Self {
            albedo_color: LinearRgba::WHITE,
            emissive_color: LinearRgba::TRANSPARENT,
            emissive_intensity: 2.0,
            reflectivity_color: LinearRgba::WHITE,
            metallic: 0.5,
            roughness: 0.5,
            micro_surface: 1.0,
            specular_intensity: 1.0,
            direct_intensity: 1.0,
            alpha_test: 0.5,
            transparency_mode: TransparencyMode::Auto,
            albedo_texture: None,
            alpha_texture: None,
            emissive_texture: None,
            bump_texture: None,
        }
    }
}

impl MaterialModel {
    /// The identity of the material described by this model.
    pub fn key(&self) -> MaterialKey {
        MaterialKey {
            colors: [
                self.albedo_color.to_bits(),
                self.emissive_color.to_bits(),
                self.reflectivity_color.to_bits(),
            ],
            scalars: [
                self.emissive_intensity.to_bits(),
                self.metallic.to_bits(),
                self.roughness.to_bits(),
                self.micro_surface.to_bits(),
                self.specular_intensity.to_bits(),
                self.direct_intensity.to_bits(),
                self.alpha_test.to_bits(),
            ],
            transparency_mode: self.transparency_mode,
            textures: [
                self.emissive_texture.clone(),
                self.alpha_texture.clone(),
                self.albedo_texture.clone(),
                self.bump_texture.clone(),
            ],
        }
    }

    /// The texture model requested for `slot`.
    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureModel> {
        match slot {
            TextureSlot::Emission => self.emissive_texture.as_ref(),
            TextureSlot::Alpha => self.alpha_texture.as_ref(),
            TextureSlot::Base => self.albedo_texture.as_ref(),
            TextureSlot::Bump => self.bump_texture.as_ref(),
        }
    }
}

/// Hashable identity of a [`MaterialModel`]; floats are compared by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterialKey {
    colors: [[u32; 4]; 3],
    scalars: [u32; 7],
    transparency_mode: TransparencyMode,
    textures: [Option<TextureModel>; 4],
}

/// A built material.
#[derive(Debug, Clone)]
pub struct Material {
    /// Base color.
    pub base_color: LinearRgba,
    /// Emitted color, intensity applied.
    pub emission_color: LinearRgba,
    /// Specular color.
    pub specular_color: LinearRgba,
    /// Metalness.
    pub metallic: f32,
    /// `1 - roughness`.
    pub smoothness: f32,
    /// Strength of environment reflections.
    pub environment_reflections: f32,
    /// Strength of specular highlights.
    pub specular_highlights: f32,
    /// Fixed-function state.
    pub blend: BlendState,
    /// Enabled shader keywords.
    pub keywords: Vec<&'static str>,
    /// Set by the final assembly step.
    pub batching_optimized: bool,
    emission_map: Option<AssetHandle<Texture>>,
    alpha_map: Option<AssetHandle<Texture>>,
    base_map: Option<AssetHandle<Texture>>,
    bump_map: Option<AssetHandle<Texture>>,
}

impl Asset for Material {}

impl Material {
    /// Derives every scalar property of the material from `model`.
    /// Texture slots start empty.
    pub fn from_model(model: &MaterialModel) -> Self {
        let mode = model
            .transparency_mode
            .resolve(model.alpha_texture.is_some(), model.albedo_color.a);
        let blend = BlendState::for_mode(mode, model.alpha_test);

        let emissive = model.emissive_color;
        let mut keywords = Vec::new();
        if emissive != LinearRgba::TRANSPARENT && emissive != LinearRgba::BLACK {
            keywords.push(KEYWORD_EMISSION);
        }
        keywords.extend(blend.keyword());

        Self {
            base_color: model.albedo_color,
            emission_color: emissive * model.emissive_intensity,
            specular_color: model.reflectivity_color,
            metallic: model.metallic,
            smoothness: 1.0 - model.roughness,
            environment_reflections: model.micro_surface,
            specular_highlights: model.specular_intensity * model.direct_intensity,
            blend,
            keywords,
            batching_optimized: false,
            emission_map: None,
            alpha_map: None,
            base_map: None,
            bump_map: None,
        }
    }

    /// Whether emission is enabled.
    pub fn emits(&self) -> bool {
        self.keywords.contains(&KEYWORD_EMISSION)
    }

    /// The texture bound to `slot`.
    pub fn texture(&self, slot: TextureSlot) -> Option<&AssetHandle<Texture>> {
        self.slot(slot).as_ref()
    }

    /// Binds `texture` to `slot`.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: AssetHandle<Texture>) {
        *self.slot_mut(slot) = Some(texture);
    }

    fn slot(&self, slot: TextureSlot) -> &Option<AssetHandle<Texture>> {
        match slot {
            TextureSlot::Emission => &self.emission_map,
            TextureSlot::Alpha => &self.alpha_map,
            TextureSlot::Base => &self.base_map,
            TextureSlot::Bump => &self.bump_map,
        }
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> &mut Option<AssetHandle<Texture>> {
        match slot {
            TextureSlot::Emission => &mut self.emission_map,
            TextureSlot::Alpha => &mut self.alpha_map,
            TextureSlot::Base => &mut self.base_map,
            TextureSlot::Bump => &mut self.bump_map,
        }
    }

    /// Final assembly: sorts and dedups keywords so materials with equal
    /// state batch together.
    fn optimize_for_batching(&mut self) {
        self.keywords.sort_unstable();
        self.keywords.dedup();
        self.batching_optimized = true;
    }
}

/// Slots in the order their textures are kept.
const KEEP_ORDER: [TextureSlot; 4] = [
    TextureSlot::Emission,
    TextureSlot::Alpha,
    TextureSlot::Base,
    TextureSlot::Bump,
];

/// Slots in the order their textures are awaited.
const WAIT_ORDER: [TextureSlot; 4] = [
    TextureSlot::Alpha,
    TextureSlot::Base,
    TextureSlot::Bump,
    TextureSlot::Emission,
];

/// A material request. Its textures are kept on the bundled [`Textures`].
pub struct MaterialPromise {
    model: MaterialModel,
    textures: Textures,
}

impl MaterialPromise {
    /// Creates a request for `model`.
    pub fn new(model: MaterialModel, textures: Textures) -> Self {
        Self { model, textures }
    }

    /// The requested model.
    pub fn model(&self) -> &MaterialModel {
        &self.model
    }
}

impl AssetPromise for MaterialPromise {
    type Asset = Material;
    type Key = MaterialKey;

    fn id(&self) -> MaterialKey {
        self.model.key()
    }

    fn load(&mut self, ctx: LoadContext) -> BuildFuture<Material> {
        let model = self.model.clone();
        let textures = self.textures.clone();
        Box::pin(async move {
            let material = Rc::new(RefCell::new(Material::from_model(&model)));

            let mut bound: Vec<(TextureSlot, Dependency<TexturePromise>)> = Vec::new();
            for slot in KEEP_ORDER {
                let Some(texture) = model.texture(slot) else {
                    continue;
                };
                let dependency = ctx.keep(textures.keeper(), textures.request(texture.clone()));
                let target = material.clone();
                dependency.on_success(move |handle| {
                    target.borrow_mut().set_texture(slot, handle.clone());
                });
                bound.push((slot, dependency));
            }

            for slot in WAIT_ORDER {
                if let Some((_, dependency)) = bound.iter().find(|(s, _)| *s == slot) {
                    dependency.settled().await;
                }
            }

            let mut material = material.borrow().clone();
            material.optimize_for_batching();
            log::debug!(
                "Assembled material with {} of {} textures",
                KEEP_ORDER
                    .iter()
                    .filter(|slot| material.texture(**slot).is_some())
                    .count(),
                bound.len()
            );
            ctx.finish(material)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolves_from_alpha_inputs() {
        assert_eq!(
            TransparencyMode::Auto.resolve(false, 1.0),
            TransparencyMode::Opaque
        );
        assert_eq!(
            TransparencyMode::Auto.resolve(true, 1.0),
            TransparencyMode::AlphaBlend
        );
        assert_eq!(
            TransparencyMode::Auto.resolve(false, 0.5),
            TransparencyMode::AlphaBlend
        );
        assert_eq!(
            TransparencyMode::AlphaTest.resolve(true, 0.0),
            TransparencyMode::AlphaTest
        );
    }

    #[test]
    fn test_blend_state_per_mode() {
        let opaque = BlendState::for_mode(TransparencyMode::Opaque, 0.5);
        assert_eq!(opaque.render_queue, QUEUE_GEOMETRY);
        assert!(opaque.z_write && !opaque.alpha_clip);
        assert_eq!(opaque.keyword(), None);

        let test = BlendState::for_mode(TransparencyMode::AlphaTest, 0.3);
        assert_eq!(test.render_queue, QUEUE_ALPHA_TEST);
        assert_eq!(test.cutoff, Some(0.3));
        assert_eq!(test.surface, Surface::Opaque);

        let blend = BlendState::for_mode(TransparencyMode::AlphaBlend, 0.5);
        assert_eq!(
            (blend.src_blend, blend.dst_blend),
            (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)
        );
        assert!(!blend.z_write);
        assert_eq!(blend.surface, Surface::Transparent);

        let both = BlendState::for_mode(TransparencyMode::AlphaTestAndBlend, 0.5);
        assert_eq!(both.src_blend, BlendFactor::One);
        assert!(both.alpha_clip);
        assert_eq!(both.keyword(), Some(KEYWORD_ALPHA_PREMULTIPLY));
    }

    #[test]
    fn test_scalars_derived_from_model() {
        let model = MaterialModel {
            emissive_color: LinearRgba::rgb(1.0, 0.5, 0.0),
            emissive_intensity: 4.0,
            roughness: 0.25,
            micro_surface: 0.75,
            specular_intensity: 0.5,
            direct_intensity: 2.0,
            ..MaterialModel::default()
        };
        let material = Material::from_model(&model);

        assert_eq!(material.emission_color, LinearRgba::new(4.0, 2.0, 0.0, 4.0));
        assert_eq!(material.smoothness, 0.75);
        assert_eq!(material.environment_reflections, 0.75);
        assert_eq!(material.specular_highlights, 1.0);
        assert!(material.emits());
        assert_eq!(material.blend.mode, TransparencyMode::Opaque);
    }

    #[test]
    fn test_emission_disabled_for_clear_or_black() {
        let clear = Material::from_model(&MaterialModel::default());
        assert!(!clear.emits());

        let black = Material::from_model(&MaterialModel {
            emissive_color: LinearRgba::BLACK,
            ..MaterialModel::default()
        });
        assert!(!black.emits());
    }

    #[test]
    fn test_key_tracks_every_input() {
        let base = MaterialModel::default();
        assert_eq!(base.key(), MaterialModel::default().key());

        let rougher = MaterialModel {
            roughness: 0.9,
            ..MaterialModel::default()
        };
        assert_ne!(base.key(), rougher.key());

        let textured = MaterialModel {
            bump_texture: Some(TextureModel::new("tex/bump.png")),
            ..MaterialModel::default()
        };
        assert_ne!(base.key(), textured.key());
    }

    #[test]
    fn test_optimize_for_batching_sorts_keywords() {
        let mut material = Material::from_model(&MaterialModel {
            emissive_color: LinearRgba::WHITE,
            transparency_mode: TransparencyMode::AlphaBlend,
            ..MaterialModel::default()
        });
        material.keywords.push(KEYWORD_EMISSION);
        material.optimize_for_batching();

        assert_eq!(material.keywords, vec![KEYWORD_ALPHA_BLEND, KEYWORD_EMISSION]);
        assert!(material.batching_optimized);
    }
}
