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

//! The RON scene description driving the sandbox.

use std::time::Duration;

use anyhow::{Context, Result};
use keepsake_assets::{MaterialModel, MemoryLoader, Texture};
use keepsake_core::KeeperConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    pub material: MaterialModel,
}

#[derive(Debug, Deserialize)]
pub struct SceneDescription {
    pub textures: KeeperConfig,
    pub materials: KeeperConfig,
    pub texture_latency_ms: u64,
    #[serde(default)]
    pub textures_available: Vec<String>,
    #[serde(default)]
    pub textures_corrupt: Vec<String>,
    pub entities: Vec<EntityDescription>,
}

impl SceneDescription {
    pub fn parse(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse scene description")
    }

    /// Fills `loader` with a generated 4x4 texture for every available
    /// source and a truncated payload for every corrupt one.
    pub fn populate(&self, loader: &MemoryLoader) {
        let latency = Duration::from_millis(self.texture_latency_ms);
        for (i, src) in self.textures_available.iter().enumerate() {
            let shade = (i as u8).wrapping_mul(64);
            let pixels: Vec<u8> = (0..16).flat_map(|_| [shade, shade, shade, 255]).collect();
            loader.insert(src, Texture::encode(4, 4, &pixels), latency);
        }
        for src in &self.textures_corrupt {
            loader.insert(src, Texture::encode(4, 4, &[0; 8]), latency * 2);
        }
    }
}
