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

//! Concrete promise types for the Keepsake keeper.
//!
//! [`TexturePromise`] is a leaf: it fetches bytes through a
//! [`RawLoader`](keepsake_core::loader::RawLoader) and decodes them.
//! [`MaterialPromise`] is a composite that keeps up to four textures and
//! applies each one as it arrives.

#![warn(missing_docs)]

pub mod material;
pub mod memory;
pub mod texture;

pub use material::{Material, MaterialKey, MaterialModel, MaterialPromise, TextureSlot, TransparencyMode};
pub use memory::MemoryLoader;
pub use texture::{Texture, TextureModel, TexturePromise, Textures};
