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

//! The lifecycle states a promise moves through.

use serde::{Deserialize, Serialize};

/// The state of a single promise instance.
///
/// The only legal transitions are `Idle -> Loading` and `Loading -> {Loaded,
/// Failed, Canceled}`, plus `Idle -> Canceled` when a promise is dropped before
/// it ever started. The three right-hand states are terminal for that instance:
/// a later request for the same identity either reuses a `Loaded` result or
/// starts a brand-new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PromiseState {
    /// Created but not started.
    #[default]
    Idle,
    /// The build routine is running (or suspended).
    Loading,
    /// The asset was produced and is cached.
    Loaded,
    /// The build routine reported an error.
    Failed,
    /// The load was stopped before it finished. No callbacks ever fire.
    Canceled,
}

impl PromiseState {
    /// Returns `true` for `Loaded`, `Failed` and `Canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded | Self::Failed | Self::Canceled)
    }

    /// Returns `true` if a new request for the same identity must start a fresh
    /// instance instead of sharing this one.
    pub fn is_dead(self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!PromiseState::Idle.is_terminal());
        assert!(!PromiseState::Loading.is_terminal());
        assert!(PromiseState::Loaded.is_terminal());
        assert!(PromiseState::Failed.is_terminal());
        assert!(PromiseState::Canceled.is_terminal());
    }

    #[test]
    fn test_only_failed_and_canceled_are_dead() {
        assert!(!PromiseState::Loaded.is_dead());
        assert!(PromiseState::Failed.is_dead());
        assert!(PromiseState::Canceled.is_dead());
        assert_eq!(PromiseState::default(), PromiseState::Idle);
    }
}
