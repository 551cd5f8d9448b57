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

//! # Keepsake Keeper
//!
//! An identity-keyed, reference-counted cache of asynchronously built assets.
//!
//! Consumers ask a [`Keeper`] to *keep* a request. The keeper either shares
//! the promise already registered for the request's identity or registers a new
//! one and starts its build routine. Consumers subscribe to the returned
//! [`KeepHandle`] and eventually *forget* it; when the last reference of an
//! identity is forgotten the keeper cancels any load in flight and disposes the
//! asset.
//!
//! Build routines may depend on other promises through the [`LoadContext`] they
//! receive, which ties the lifetime of every sub-promise to its dependent.
//!
//! Everything runs on one logical thread: the registry and promises use
//! `Rc`/`RefCell`, and build routines are multiplexed on a tokio `LocalSet`.

#![warn(missing_docs)]

mod composition;
mod handle;
mod keeper;
mod promise;
mod runner;
mod stats;

pub use composition::{Dependency, LoadContext};
pub use handle::{KeepHandle, Settled};
pub use keeper::Keeper;
pub use promise::{AssetPromise, BuildFuture};
pub use runner::LocalTaskRunner;
pub use stats::KeeperStats;

pub use keepsake_core::{
    asset::{Asset, AssetHandle},
    BuildError, KeeperConfig, KeeperError, PromiseState, SubFailurePolicy,
};
