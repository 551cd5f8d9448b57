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

//! Provides the foundational traits and primitive types for Keepsake's asset system.
//!
//! The key components are:
//! - The [`Asset`] trait: a marker for all types that a promise can produce.
//! - [`AssetHandle`]: the shared, reference-counted pointer handed to consumers.
//! - [`AssetUUID`]: a stable identifier for raw asset sources.

mod handle;
mod uuid;

pub use handle::*;
pub use uuid::*;

/// A marker trait for types that can be produced by a promise.
///
/// The supertraits enforce that a finished asset can be shared freely once it
/// leaves the keeper:
/// - `Send` + `Sync`: a loaded asset may be handed to other threads, even though
///   the keeper itself runs on a single logical thread.
/// - `'static`: the asset does not borrow from the build parameters.
///
/// # Examples
///
/// ```
/// use keepsake_core::asset::Asset;
///
/// struct Texture {
///     width: u32,
///     height: u32,
/// }
///
/// impl Asset for Texture {}
/// ```
pub trait Asset: Send + Sync + 'static {}
