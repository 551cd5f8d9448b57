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

//! Runtime configuration for a keeper instance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How a composite promise reacts when one of its sub-promises fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubFailurePolicy {
    /// Every sub failure is forwarded to the composite's failure subscribers as
    /// soon as it happens. The composite still finishes and fires success once all
    /// requested sub-promises are terminal, so subscribers may observe both paths.
    #[default]
    Forward,
    /// Sub failures are held back. Once every requested sub-promise is terminal
    /// the composite fails with the first recorded error and never fires success.
    Fatal,
}

/// Settings for a single `Keeper`.
///
/// Can be built in code or parsed from a RON document:
///
/// ```
/// use keepsake_core::{KeeperConfig, SubFailurePolicy};
///
/// let config = KeeperConfig::from_ron_str(
///     "(name: \"materials\", sub_failure_policy: Fatal)",
/// ).unwrap();
/// assert_eq!(config.name, "materials");
/// assert_eq!(config.sub_failure_policy, SubFailurePolicy::Fatal);
/// assert!(config.log_transitions);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Name used as the prefix of every log line emitted by the keeper.
    pub name: String,
    /// Policy applied by composite promises built through this keeper.
    pub sub_failure_policy: SubFailurePolicy,
    /// Emit a `debug` log line for every promise state transition.
    pub log_transitions: bool,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            name: "keeper".to_string(),
            sub_failure_policy: SubFailurePolicy::default(),
            log_transitions: true,
        }
    }
}

impl KeeperConfig {
    /// Default configuration with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Replaces the sub-failure policy.
    pub fn with_sub_failure_policy(mut self, policy: SubFailurePolicy) -> Self {
        self.sub_failure_policy = policy;
        self
    }

    /// Parses a configuration from RON. Missing fields fall back to defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse keeper configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KeeperConfig::default();
        assert_eq!(config.name, "keeper");
        assert_eq!(config.sub_failure_policy, SubFailurePolicy::Forward);
        assert!(config.log_transitions);
    }

    #[test]
    fn test_builder_helpers() {
        let config = KeeperConfig::named("textures").with_sub_failure_policy(SubFailurePolicy::Fatal);
        assert_eq!(config.name, "textures");
        assert_eq!(config.sub_failure_policy, SubFailurePolicy::Fatal);
    }

    #[test]
    fn test_parse_partial_ron() {
        let config = KeeperConfig::from_ron_str("(log_transitions: false)").unwrap();
        assert_eq!(config.name, "keeper");
        assert!(!config.log_transitions);
    }

    #[test]
    fn test_parse_invalid_ron_fails() {
        assert!(KeeperConfig::from_ron_str("(sub_failure_policy: Sometimes)").is_err());
    }
}
