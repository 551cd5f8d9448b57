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

//! Texture promises: raw bytes fetched through a [`RawLoader`] and decoded.

use std::rc::Rc;

use keepsake_core::{asset::Asset, loader::RawLoader, BuildError};
use keepsake_keeper::{AssetPromise, BuildFuture, KeepHandle, Keeper, LoadContext};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size in bytes of the `width`/`height` header preceding the pixel payload.
pub const HEADER_LEN: usize = 8;

/// Bytes per RGBA8 pixel.
const BYTES_PER_PIXEL: usize = 4;

/// How texture coordinates outside `[0, 1]` are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    /// Tile the texture.
    #[default]
    Repeat,
    /// Clamp to the edge texel.
    Clamp,
    /// Tile the texture, mirroring every other repetition.
    Mirror,
}

/// How texels are sampled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest texel.
    Point,
    /// Linear interpolation between texels.
    #[default]
    Bilinear,
    /// Linear interpolation between texels and mip levels.
    Trilinear,
}

/// Describes a texture request. Two requests with equal models share one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureModel {
    /// Source path handed to the raw loader.
    pub src: String,
    /// Wrap mode applied to the decoded texture.
    #[serde(default)]
    pub wrap: WrapMode,
    /// Filter mode applied to the decoded texture.
    #[serde(default)]
    pub filter: FilterMode,
}

impl TextureModel {
    /// A model for `src` with default sampling.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            wrap: WrapMode::default(),
            filter: FilterMode::default(),
        }
    }

    /// Replaces the wrap mode.
    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    /// Replaces the filter mode.
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }
}

/// Errors raised while decoding raw texture bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextureError {
    /// Fewer bytes than the header needs.
    #[error("Texture data is {len} bytes, shorter than the {HEADER_LEN}-byte header")]
    MissingHeader {
        /// Length of the received data.
        len: usize,
    },
    /// The payload does not match the size announced by the header.
    #[error("Texture of {width}x{height} expects {expected} pixel bytes, got {actual}")]
    SizeMismatch {
        /// Width announced by the header.
        width: u32,
        /// Height announced by the header.
        height: u32,
        /// Payload length implied by the header.
        expected: usize,
        /// Payload length actually received.
        actual: usize,
    },
    /// The announced extent does not fit in memory.
    #[error("Texture extent {width}x{height} is too large")]
    TooLarge {
        /// Width announced by the header.
        width: u32,
        /// Height announced by the header.
        height: u32,
    },
    /// Zero-sized textures are rejected.
    #[error("Texture has an empty extent")]
    Empty,
}

/// A decoded RGBA8 texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Row-major RGBA8 pixel data.
    pub pixels: Vec<u8>,
    /// Wrap mode taken from the request.
    pub wrap: WrapMode,
    /// Filter mode taken from the request.
    pub filter: FilterMode,
}

impl Asset for Texture {}

impl Texture {
    /// Encodes `pixels` with the little-endian `width`/`height` header
    /// understood by [`Texture::decode`].
    pub fn encode(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + pixels.len());
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(pixels);
        bytes
    }

    /// Decodes raw texture bytes.
    pub fn decode(bytes: &[u8], wrap: WrapMode, filter: FilterMode) -> Result<Self, TextureError> {
        if bytes.len() < HEADER_LEN {
            return Err(TextureError::MissingHeader { len: bytes.len() });
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);
        let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if width == 0 || height == 0 {
            return Err(TextureError::Empty);
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|texels| texels.checked_mul(BYTES_PER_PIXEL))
            .ok_or(TextureError::TooLarge { width, height })?;
        if payload.len() != expected {
            return Err(TextureError::SizeMismatch {
                width,
                height,
                expected,
                actual: payload.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels: payload.to_vec(),
            wrap,
            filter,
        })
    }

    /// Whether any texel has an alpha below 255.
    pub fn has_transparency(&self) -> bool {
        self.pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .any(|texel| texel[3] < u8::MAX)
    }
}

/// A texture request bound to the loader that fetches its bytes.
pub struct TexturePromise {
    model: TextureModel,
    loader: Rc<dyn RawLoader>,
}

impl TexturePromise {
    /// Creates a request for `model`, fetched through `loader`.
    pub fn new(model: TextureModel, loader: Rc<dyn RawLoader>) -> Self {
        Self { model, loader }
    }

    /// The requested model.
    pub fn model(&self) -> &TextureModel {
        &self.model
    }
}

impl AssetPromise for TexturePromise {
    type Asset = Texture;
    type Key = TextureModel;

    fn id(&self) -> TextureModel {
        self.model.clone()
    }

    fn load(&mut self, _ctx: LoadContext) -> BuildFuture<Texture> {
        let model = self.model.clone();
        let loader = self.loader.clone();
        Box::pin(async move {
            let name = format!("texture '{}'", model.src);
            let bytes = loader
                .load(&model.src)
                .await
                .map_err(|err| BuildError::new(name.clone(), err))?;
            let texture = Texture::decode(&bytes, model.wrap, model.filter)
                .map_err(|err| BuildError::new(name, err))?;
            log::trace!(
                "Decoded texture '{}' ({}x{})",
                model.src,
                texture.width,
                texture.height
            );
            Ok(texture)
        })
    }

    fn cleanup(&mut self) {
        log::trace!("Releasing texture '{}'", self.model.src);
    }
}

/// A texture keeper paired with the loader its requests fetch through.
#[derive(Clone)]
pub struct Textures {
    keeper: Keeper<TexturePromise>,
    loader: Rc<dyn RawLoader>,
}

impl Textures {
    /// Bundles `keeper` and `loader`.
    pub fn new(keeper: Keeper<TexturePromise>, loader: Rc<dyn RawLoader>) -> Self {
        Self { keeper, loader }
    }

    /// The underlying keeper.
    pub fn keeper(&self) -> &Keeper<TexturePromise> {
        &self.keeper
    }

    /// Builds a request for `model` using the bundled loader.
    pub fn request(&self, model: TextureModel) -> TexturePromise {
        TexturePromise::new(model, self.loader.clone())
    }

    /// Keeps the texture described by `model`.
    pub fn keep(&self, model: TextureModel) -> KeepHandle<TexturePromise> {
        self.keeper.keep(self.request(model))
    }
}
