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

//! Defines the error taxonomy of the promise keeper.
//!
//! Two families exist:
//! - [`BuildError`]: a resource could not be produced. It travels through
//!   failure subscribers, possibly to many consumers, so it is cheap to clone.
//! - [`KeeperError`]: the keeper API was misused (double forget, unknown
//!   identity, loading a promise twice). These are returned to the caller and
//!   logged; they never corrupt the registry.
//!
//! Cancellation is deliberately absent: a canceled promise simply never calls back.

use crate::state::PromiseState;
use std::{error::Error as StdError, fmt, sync::Arc};
use thiserror::Error;

/// An error raised by a resource type's build routine.
///
/// Carries a label describing which resource failed and the original cause.
#[derive(Debug, Clone)]
pub struct BuildError {
    asset: String,
    cause: Arc<dyn StdError + Send + Sync>,
}

impl BuildError {
    /// Wraps `cause` as the reason `asset` could not be built.
    pub fn new(asset: impl Into<String>, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            asset: asset.into(),
            cause: Arc::from(cause.into()),
        }
    }

    /// Builds an error from a plain message.
    pub fn msg(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(asset, message.into())
    }

    /// The label of the resource that failed.
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// The original cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }

    /// Returns `true` if both values are clones of the same original error.
    pub fn same_origin(&self, other: &BuildError) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to build '{}': {}", self.asset, self.cause)
    }
}

impl StdError for BuildError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause)
    }
}

/// A misuse of the keeper protocol.
///
/// Reported rather than panicking so that one misbehaving consumer only affects
/// its own identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeeperError {
    /// `forget` was called for an identity that has no registry entry.
    #[error("No promise is registered for identity {identity}")]
    UnknownIdentity {
        /// Debug rendering of the identity key.
        identity: String,
    },
    /// The handle holds no reference here: it was already forgotten, or it
    /// was issued by another keeper.
    #[error("Handle #{ticket} for identity {identity} is not held by this keeper")]
    StaleHandle {
        /// Debug rendering of the identity key.
        identity: String,
        /// The ticket number of the offending handle.
        ticket: u64,
    },
    /// `load` was invoked on a promise that is not `Idle`.
    #[error("Cannot load promise {identity}: state is {state:?}, expected Idle")]
    LoadNotIdle {
        /// Debug rendering of the identity key.
        identity: String,
        /// The state the promise was in.
        state: PromiseState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = BuildError::new("texture 'brick.png'", io);

        assert_eq!(err.asset(), "texture 'brick.png'");
        assert_eq!(
            err.to_string(),
            "Failed to build 'texture 'brick.png'': missing file"
        );
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("missing file"));
    }

    #[test]
    fn test_clones_share_origin() {
        let err = BuildError::msg("a", "boom");
        let clone = err.clone();
        let other = BuildError::msg("a", "boom");

        assert!(err.same_origin(&clone));
        assert!(!err.same_origin(&other));
    }

    #[test]
    fn test_anyhow_error_converts() {
        let cause = anyhow::anyhow!("decode failed").context("while reading header");
        let err = BuildError::new("texture", cause);
        assert!(err.to_string().contains("while reading header"));
    }

    #[test]
    fn test_keeper_error_messages() {
        let err = KeeperError::StaleHandle {
            identity: "\"brick\"".to_string(),
            ticket: 3,
        };
        assert_eq!(
            err.to_string(),
            "Handle #3 for identity \"brick\" is not held by this keeper"
        );
    }
}
