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

/// Lifetime counters of a keeper.
///
/// Snapshotted by value; the keeper updates its own copy as promises move
/// through their lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeeperStats {
    /// Build routines started (fresh identities and restarts).
    pub loads_started: u64,
    /// Build routines that produced an asset.
    pub loads_completed: u64,
    /// Requests served by an existing `Loading` or `Loaded` promise.
    pub reuses: u64,
    /// Requests that replaced a `Failed` or `Canceled` promise with a fresh one.
    pub restarts: u64,
    /// Build routines that reported an error.
    pub failures: u64,
    /// Promises stopped before they finished.
    pub cancellations: u64,
    /// Promises removed from the registry.
    pub disposals: u64,
}
