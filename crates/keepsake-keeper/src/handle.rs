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

use std::{fmt, future::Future};

use keepsake_core::{
    asset::{Asset, AssetHandle},
    BuildError, PromiseState,
};

use crate::promise::{AssetPromise, PromiseRef, WeakPromise};

/// The terminal outcome of a promise.
pub enum Settled<A: Asset> {
    /// The asset was produced.
    Loaded(AssetHandle<A>),
    /// The build routine failed.
    Failed(BuildError),
    /// The promise was stopped or disposed before it produced anything.
    Canceled,
}

impl<A: Asset> Settled<A> {
    /// Returns the asset if the promise loaded.
    pub fn loaded(self) -> Option<AssetHandle<A>> {
        match self {
            Self::Loaded(asset) => Some(asset),
            _ => None,
        }
    }

    /// Returns `true` for [`Settled::Loaded`].
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

impl<A: Asset> fmt::Debug for Settled<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("Loaded"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
            Self::Canceled => f.write_str("Canceled"),
        }
    }
}

/// One counted reference to a kept promise.
///
/// Returned by [`Keeper::keep`](crate::Keeper::keep) and released with
/// [`Keeper::forget`](crate::Keeper::forget). A handle is not `Clone`: every
/// handle is exactly one unit of the identity's reference count.
///
/// Subscribing to a handle whose promise already finished delivers the result
/// synchronously; otherwise subscribers are queued and fire in subscription
/// order when the load resolves. A canceled promise never calls back.
pub struct KeepHandle<P: AssetPromise> {
    key: P::Key,
    ticket: u64,
    promise: PromiseRef<P>,
}

impl<P: AssetPromise> KeepHandle<P> {
    pub(crate) fn new(key: P::Key, ticket: u64, promise: PromiseRef<P>) -> Self {
        Self {
            key,
            ticket,
            promise,
        }
    }

    pub(crate) fn promise(&self) -> &PromiseRef<P> {
        &self.promise
    }

    /// The identity key this handle refers to.
    pub fn key(&self) -> &P::Key {
        &self.key
    }

    /// The number of this reference, unique across all keepers.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// The state of the promise instance this handle was issued for.
    pub fn state(&self) -> PromiseState {
        self.promise.state()
    }

    /// The loaded asset, if any.
    pub fn asset(&self) -> Option<AssetHandle<P::Asset>> {
        self.promise.asset()
    }

    /// The error the promise failed with, if any.
    pub fn error(&self) -> Option<BuildError> {
        self.promise.last_error()
    }

    /// Number of sub-promises currently held by the promise.
    pub fn dependency_count(&self) -> usize {
        self.promise.dependency_count()
    }

    /// Returns `true` if both handles refer to the same promise instance.
    pub fn same_promise(&self, other: &Self) -> bool {
        self.promise.ptr_eq(&other.promise)
    }

    /// Subscribes to the successful completion of the promise.
    pub fn on_success(&self, f: impl FnMut(&AssetHandle<P::Asset>) + 'static) -> &Self {
        self.promise.subscribe_success(Box::new(f));
        self
    }

    /// Subscribes to failures of the promise.
    pub fn on_fail(&self, f: impl FnMut(&BuildError) + 'static) -> &Self {
        self.promise.subscribe_failure(Box::new(f));
        self
    }

    /// Resolves once the promise reaches a terminal state.
    pub fn settled(&self) -> impl Future<Output = Settled<P::Asset>> + 'static {
        settle(self.promise.downgrade())
    }
}

impl<P: AssetPromise> fmt::Debug for KeepHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepHandle")
            .field("key", &self.key)
            .field("ticket", &self.ticket)
            .field("state", &self.state())
            .finish()
    }
}

pub(crate) fn settle<P: AssetPromise>(
    promise: WeakPromise<P>,
) -> impl Future<Output = Settled<P::Asset>> + 'static {
    let status = promise.upgrade().map(|p| p.status());
    async move {
        let Some(mut status) = status else {
            return Settled::Canceled;
        };
        let state = match status.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => PromiseState::Canceled,
        };

        let promise = promise.upgrade();
        match state {
            PromiseState::Loaded => promise
                .and_then(|p| p.asset())
                .map_or(Settled::Canceled, Settled::Loaded),
            PromiseState::Failed => promise
                .and_then(|p| p.last_error())
                .map_or(Settled::Canceled, Settled::Failed),
            _ => Settled::Canceled,
        }
    }
}
