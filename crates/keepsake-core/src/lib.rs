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

//! # Keepsake Core
//!
//! Foundational crate containing the traits, core types, and interface contracts
//! shared by the promise keeper and the concrete resource types.
//!
//! Nothing in here knows how a resource is built or cached. It only defines the
//! vocabulary: what an asset is, how promises report their state, how failures
//! are described, and which runtime capabilities (task runner, raw loader) the
//! keeper consumes.

#![warn(missing_docs)]

pub mod asset;
pub mod config;
pub mod error;
pub mod loader;
pub mod math;
pub mod state;
pub mod task;

pub use config::{KeeperConfig, SubFailurePolicy};
pub use error::{BuildError, KeeperError};
pub use state::PromiseState;
