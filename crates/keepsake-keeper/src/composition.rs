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

//! Dependent composition: promises built out of sub-promises.
//!
//! A composite build routine acquires its sub-resources through the
//! [`LoadContext`] it receives. The context records every acquired handle in the
//! composite's [`DependencySet`], so cancellation and cleanup of the composite
//! forget them no matter how far the build got, and it routes sub failures
//! according to the keeper's [`SubFailurePolicy`].
//!
//! The intended shape of a composite routine is:
//!
//! 1. `ctx.keep(...)` every present sub-resource and subscribe `on_success` to
//!    apply its result to the partially built asset;
//! 2. only then `settled().await` each dependency, in a fixed order;
//! 3. return `ctx.finish(asset)`.

use std::{cell::RefCell, future::Future, rc::Rc, rc::Weak};

use keepsake_core::{
    asset::AssetHandle, BuildError, PromiseState, SubFailurePolicy,
};

use crate::{
    handle::{KeepHandle, Settled},
    keeper::Keeper,
    promise::{AssetPromise, FailureSink, WeakPromise},
};

/// Handed to [`AssetPromise::load`]; the composite's view of its own promise.
pub struct LoadContext {
    label: String,
    dependencies: DependencySet,
    sink: Weak<dyn FailureSink>,
    policy: SubFailurePolicy,
    held_failures: Rc<RefCell<Vec<BuildError>>>,
}

impl LoadContext {
    pub(crate) fn new(
        label: String,
        dependencies: DependencySet,
        sink: Weak<dyn FailureSink>,
        policy: SubFailurePolicy,
    ) -> Self {
        Self {
            label,
            dependencies,
            sink,
            policy,
            held_failures: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The log label of the promise being built.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The sub-failure policy in effect for this build.
    pub fn policy(&self) -> SubFailurePolicy {
        self.policy
    }

    /// Keeps a sub-promise on `keeper` on behalf of the promise being built.
    ///
    /// The handle is owned by the composite and forgotten when the composite is
    /// canceled or cleaned up. Under [`SubFailurePolicy::Forward`] a failure of
    /// the sub-promise is immediately reported to the composite's failure
    /// subscribers; under [`SubFailurePolicy::Fatal`] it is held until
    /// [`finish`](Self::finish).
    pub fn keep<S: AssetPromise>(&self, keeper: &Keeper<S>, request: S) -> Dependency<S> {
        let handle = keeper.keep(request);
        let dependency = Dependency::of(&handle);

        match self.policy {
            SubFailurePolicy::Forward => {
                let sink = self.sink.clone();
                handle.on_fail(move |err| {
                    if let Some(sink) = sink.upgrade() {
                        sink.forward_failure(err);
                    }
                });
            }
            SubFailurePolicy::Fatal => {
                let held = self.held_failures.clone();
                handle.on_fail(move |err| held.borrow_mut().push(err.clone()));
            }
        }

        self.dependencies.hold(keeper.clone(), handle);
        dependency
    }

    /// Failures held back under [`SubFailurePolicy::Fatal`], in arrival order.
    pub fn held_failures(&self) -> Vec<BuildError> {
        self.held_failures.borrow().clone()
    }

    /// Final step of a composite build.
    ///
    /// Returns the asset, unless the policy is `Fatal` and a sub-promise
    /// failed, in which case the first held failure is returned instead.
    pub fn finish<A>(&self, asset: A) -> Result<A, BuildError> {
        match self.held_failures.borrow().first() {
            Some(err) if self.policy == SubFailurePolicy::Fatal => Err(err.clone()),
            _ => Ok(asset),
        }
    }
}

/// A composite's non-owning view of one of its sub-promises.
///
/// The owning reference lives in the composite's dependency set, so a
/// `Dependency` never keeps the sub-promise alive by itself.
pub struct Dependency<S: AssetPromise> {
    key: S::Key,
    promise: WeakPromise<S>,
}

impl<S: AssetPromise> Clone for Dependency<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            promise: self.promise.clone(),
        }
    }
}

impl<S: AssetPromise> Dependency<S> {
    fn of(handle: &KeepHandle<S>) -> Self {
        Self {
            key: handle.key().clone(),
            promise: handle.promise().downgrade(),
        }
    }

    /// The identity key of the sub-promise.
    pub fn key(&self) -> &S::Key {
        &self.key
    }

    /// The current state, or `Canceled` if the sub-promise is gone.
    pub fn state(&self) -> PromiseState {
        self.promise
            .upgrade()
            .map_or(PromiseState::Canceled, |p| p.state())
    }

    /// See [`KeepHandle::on_success`].
    pub fn on_success(&self, f: impl FnMut(&AssetHandle<S::Asset>) + 'static) -> &Self {
        if let Some(promise) = self.promise.upgrade() {
            promise.subscribe_success(Box::new(f));
        }
        self
    }

    /// See [`KeepHandle::on_fail`].
    pub fn on_fail(&self, f: impl FnMut(&BuildError) + 'static) -> &Self {
        if let Some(promise) = self.promise.upgrade() {
            promise.subscribe_failure(Box::new(f));
        }
        self
    }

    /// Resolves once the sub-promise reaches a terminal state.
    pub fn settled(&self) -> impl Future<Output = Settled<S::Asset>> + 'static {
        crate::handle::settle(self.promise.clone())
    }
}

trait HeldDependency {
    fn release(self: Box<Self>);
}

struct Held<S: AssetPromise> {
    keeper: Keeper<S>,
    handle: KeepHandle<S>,
}

impl<S: AssetPromise> HeldDependency for Held<S> {
    fn release(self: Box<Self>) {
        if let Err(err) = self.keeper.forget(&self.handle) {
            log::warn!("Failed to release sub-promise {:?}: {err}", self.handle.key());
        }
    }
}

#[derive(Default)]
struct DependencyState {
    held: Vec<Box<dyn HeldDependency>>,
    released: bool,
}

/// The sub-promise handles owned by one promise.
///
/// Once released, any handle added later is released immediately, so a build
/// routine that keeps on after its promise was torn down cannot leak references.
#[derive(Clone, Default)]
pub(crate) struct DependencySet(Rc<RefCell<DependencyState>>);

impl DependencySet {
    fn hold<S: AssetPromise>(&self, keeper: Keeper<S>, handle: KeepHandle<S>) {
        let held = Box::new(Held { keeper, handle });
        let mut state = self.0.borrow_mut();
        if state.released {
            drop(state);
            held.release();
        } else {
            state.held.push(held);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.borrow().held.len()
    }

    /// Forgets every held handle. Safe to call more than once.
    pub(crate) fn release_all(&self) {
        let held = {
            let mut state = self.0.borrow_mut();
            state.released = true;
            std::mem::take(&mut state.held)
        };
        if !held.is_empty() {
            log::trace!("Releasing {} sub-promise(s)", held.len());
        }
        for dependency in held {
            dependency.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingSink {
        forwarded: Cell<u32>,
    }

    impl FailureSink for CountingSink {
        fn forward_failure(&self, _err: &BuildError) {
            self.forwarded.set(self.forwarded.get() + 1);
        }
    }

    fn context(policy: SubFailurePolicy, sink: &Rc<CountingSink>) -> LoadContext {
        let sink: Rc<dyn FailureSink> = sink.clone();
        LoadContext::new(
            "test".to_string(),
            DependencySet::default(),
            Rc::downgrade(&sink),
            policy,
        )
    }

    #[test]
    fn test_finish_ignores_failures_under_forward() {
        let sink = Rc::new(CountingSink::default());
        let ctx = context(SubFailurePolicy::Forward, &sink);
        ctx.held_failures
            .borrow_mut()
            .push(BuildError::msg("sub", "boom"));

        assert_eq!(ctx.finish(5).unwrap(), 5);
        assert_eq!(ctx.label(), "test");
    }

    #[test]
    fn test_finish_returns_first_held_failure_under_fatal() {
        let sink = Rc::new(CountingSink::default());
        let ctx = context(SubFailurePolicy::Fatal, &sink);
        assert_eq!(ctx.finish("ok").unwrap(), "ok");

        ctx.held_failures
            .borrow_mut()
            .extend([BuildError::msg("first", "x"), BuildError::msg("second", "y")]);
        let err = ctx.finish("ok").unwrap_err();
        assert_eq!(err.asset(), "first");
        assert_eq!(ctx.held_failures().len(), 2);
    }

    #[test]
    fn test_release_all_is_idempotent_on_empty_set() {
        let set = DependencySet::default();
        set.release_all();
        set.release_all();
        assert_eq!(set.len(), 0);
    }
}
