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

//! The promise state machine.
//!
//! A promise is the unit tracking one resource's asynchronous construction. The
//! resource-type specific behaviour lives behind the [`AssetPromise`] hooks; this
//! module owns everything generic: state transitions, the ordered subscriber
//! lists, the running task, and the set of sub-promises acquired while loading.
//!
//! All mutation happens through [`PromiseRef`], which is only reachable from the
//! keeper and from handles. No `RefCell` borrow is held while subscribers run or
//! while sub-promises are released, so subscribers may freely call back into any
//! keeper.

use std::{
    cell::{Cell, RefCell},
    fmt,
    hash::Hash,
    panic::AssertUnwindSafe,
    rc::{Rc, Weak},
};

use futures::FutureExt;

use keepsake_core::{
    asset::{Asset, AssetHandle},
    task::{LocalBoxFuture, RunningTask, TaskRunner},
    BuildError, KeeperError, PromiseState, SubFailurePolicy,
};
use tokio::sync::watch;

use crate::{
    composition::{DependencySet, LoadContext},
    stats::KeeperStats,
};

/// The future returned by a build routine.
pub type BuildFuture<A> = LocalBoxFuture<'static, Result<A, BuildError>>;

pub(crate) type SuccessCallback<A> = Box<dyn FnMut(&AssetHandle<A>)>;
pub(crate) type FailureCallback = Box<dyn FnMut(&BuildError)>;

/// The per-resource-type build hooks.
///
/// An implementor is both the *request* (it carries the build parameters and
/// computes the identity key) and the *hook object* the keeper drives once the
/// request is registered. A request that turns out to be a duplicate of an
/// existing identity is dropped without any hook being called.
///
/// Hooks run while the promise is borrowed and must not use the handle of the
/// promise they belong to.
pub trait AssetPromise: 'static {
    /// The asset this promise produces.
    type Asset: Asset;
    /// The identity key. Two requests with equal keys are the same resource.
    type Key: Clone + Eq + Hash + fmt::Debug + 'static;

    /// Computes the identity key from the build parameters.
    fn id(&self) -> Self::Key;

    /// Called right before the build routine is created.
    fn on_before_load_or_reuse(&mut self) {}

    /// Creates the build routine.
    ///
    /// The returned future is driven by the keeper's task runner. Sub-promises
    /// must be acquired through `ctx` so they are released on cancellation and
    /// cleanup.
    fn load(&mut self, ctx: LoadContext) -> BuildFuture<Self::Asset>;

    /// Called once the build routine has finished, before subscribers run.
    fn on_after_load_or_reuse(&mut self) {}

    /// Called when a load is canceled. Sub-promises acquired through the
    /// [`LoadContext`] are released by the keeper right after this hook.
    fn on_cancel_loading(&mut self) {}

    /// Called once when the promise is disposed, whatever its final state.
    fn cleanup(&mut self) {}
}

pub(crate) struct PromiseCell<P: AssetPromise> {
    key: P::Key,
    label: String,
    state: PromiseState,
    hooks: P,
    asset: Option<AssetHandle<P::Asset>>,
    on_success: Vec<SuccessCallback<P::Asset>>,
    on_fail: Vec<FailureCallback>,
    last_error: Option<BuildError>,
    task: Option<Box<dyn RunningTask>>,
    dependencies: DependencySet,
    status: watch::Sender<PromiseState>,
    stats: Rc<Cell<KeeperStats>>,
    log_transitions: bool,
    cleaned_up: bool,
}

impl<P: AssetPromise> PromiseCell<P> {
    fn transition(&mut self, next: PromiseState) {
        if self.log_transitions {
            log::debug!("{}: {:?} -> {:?}", self.label, self.state, next);
        }
        self.state = next;
        self.status.send_replace(next);
    }
}

/// Receives failures forwarded from sub-promises.
pub(crate) trait FailureSink {
    fn forward_failure(&self, err: &BuildError);
}

impl<P: AssetPromise> FailureSink for RefCell<PromiseCell<P>> {
    fn forward_failure(&self, err: &BuildError) {
        let mut cell = self.borrow_mut();
        if cell.state != PromiseState::Loading {
            return;
        }
        log::debug!("{}: forwarding sub-resource failure: {err}", cell.label);
        let mut subscribers = std::mem::take(&mut cell.on_fail);
        drop(cell);

        for subscriber in subscribers.iter_mut() {
            subscriber(err);
        }

        // Subscribers added during delivery go after the existing ones.
        let mut cell = self.borrow_mut();
        if cell.state == PromiseState::Loading {
            let added = std::mem::replace(&mut cell.on_fail, subscribers);
            cell.on_fail.extend(added);
        }
    }
}

/// Shared pointer to a promise instance.
pub(crate) struct PromiseRef<P: AssetPromise>(Rc<RefCell<PromiseCell<P>>>);

impl<P: AssetPromise> Clone for PromiseRef<P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<P: AssetPromise> PromiseRef<P> {
    pub(crate) fn new(
        hooks: P,
        key: P::Key,
        label: String,
        stats: Rc<Cell<KeeperStats>>,
        log_transitions: bool,
    ) -> Self {
        let (status, _) = watch::channel(PromiseState::Idle);
        Self(Rc::new(RefCell::new(PromiseCell {
            key,
            label,
            state: PromiseState::Idle,
            hooks,
            asset: None,
            on_success: Vec::new(),
            on_fail: Vec::new(),
            last_error: None,
            task: None,
            dependencies: DependencySet::default(),
            status,
            stats,
            log_transitions,
            cleaned_up: false,
        })))
    }

    pub(crate) fn downgrade(&self) -> WeakPromise<P> {
        WeakPromise(Rc::downgrade(&self.0))
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn state(&self) -> PromiseState {
        self.0.borrow().state
    }

    pub(crate) fn label(&self) -> String {
        self.0.borrow().label.clone()
    }

    pub(crate) fn asset(&self) -> Option<AssetHandle<P::Asset>> {
        self.0.borrow().asset.clone()
    }

    pub(crate) fn last_error(&self) -> Option<BuildError> {
        self.0.borrow().last_error.clone()
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.0.borrow().dependencies.len()
    }

    pub(crate) fn status(&self) -> watch::Receiver<PromiseState> {
        self.0.borrow().status.subscribe()
    }

    /// Starts the build routine. Only valid from `Idle`.
    pub(crate) fn load(
        &self,
        runner: &dyn TaskRunner,
        policy: SubFailurePolicy,
    ) -> Result<(), KeeperError> {
        let mut cell = self.0.borrow_mut();
        if cell.state != PromiseState::Idle {
            return Err(KeeperError::LoadNotIdle {
                identity: format!("{:?}", cell.key),
                state: cell.state,
            });
        }

        cell.hooks.on_before_load_or_reuse();
        cell.transition(PromiseState::Loading);

        let weak_cell = Rc::downgrade(&self.0);
        let sink: Weak<dyn FailureSink> = weak_cell;
        let ctx = LoadContext::new(
            cell.label.clone(),
            cell.dependencies.clone(),
            sink,
            policy,
        );
        let build = cell.hooks.load(ctx);
        let label = cell.label.clone();
        drop(cell);

        let weak = self.downgrade();
        let task = runner.start(Box::pin(async move {
            // A panicking routine fails its promise instead of leaving it loading.
            let result = match AssertUnwindSafe(build).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    log::error!("{label}: build routine panicked");
                    Err(BuildError::msg(label, "build routine panicked"))
                }
            };
            if let Some(promise) = weak.upgrade() {
                promise.complete(result);
            }
        }));

        let mut cell = self.0.borrow_mut();
        if cell.state == PromiseState::Loading {
            cell.task = Some(task);
        }
        Ok(())
    }

    fn complete(&self, result: Result<P::Asset, BuildError>) {
        let mut cell = self.0.borrow_mut();
        // A stopped routine can still be mid-poll when it is canceled; its
        // result is discarded here.
        if cell.state != PromiseState::Loading {
            log::trace!("{}: dropping result of a {:?} promise", cell.label, cell.state);
            return;
        }
        cell.task = None;

        match result {
            Ok(asset) => {
                let asset = AssetHandle::new(asset);
                cell.asset = Some(asset.clone());
                cell.on_fail.clear();
                let subscribers = std::mem::take(&mut cell.on_success);
                cell.hooks.on_after_load_or_reuse();
                cell.transition(PromiseState::Loaded);
                update_stats(&cell.stats, |s| s.loads_completed += 1);
                log::info!("{}: loaded", cell.label);
                drop(cell);

                log::trace!("delivering asset to {} subscriber(s)", subscribers.len());
                for mut subscriber in subscribers {
                    subscriber(&asset);
                }
            }
            Err(err) => {
                cell.last_error = Some(err.clone());
                cell.on_success.clear();
                let subscribers = std::mem::take(&mut cell.on_fail);
                cell.hooks.on_after_load_or_reuse();
                cell.transition(PromiseState::Failed);
                update_stats(&cell.stats, |s| s.failures += 1);
                log::warn!("{}: load failed: {err}", cell.label);
                drop(cell);

                for mut subscriber in subscribers {
                    subscriber(&err);
                }
            }
        }
    }

    /// Stops an `Idle` or `Loading` promise. No subscriber ever fires afterwards.
    pub(crate) fn cancel(&self) {
        let mut cell = self.0.borrow_mut();
        if cell.state.is_terminal() {
            return;
        }
        if let Some(task) = cell.task.take() {
            task.stop();
        }
        cell.hooks.on_cancel_loading();
        cell.on_success.clear();
        cell.on_fail.clear();
        cell.transition(PromiseState::Canceled);
        update_stats(&cell.stats, |s| s.cancellations += 1);
        let dependencies = cell.dependencies.clone();
        drop(cell);

        dependencies.release_all();
    }

    /// Final teardown. Idempotent and valid in any state.
    pub(crate) fn cleanup(&self) {
        let mut cell = self.0.borrow_mut();
        if cell.cleaned_up {
            return;
        }
        cell.cleaned_up = true;

        if let Some(task) = cell.task.take() {
            task.stop();
        }
        if !cell.state.is_terminal() {
            cell.transition(PromiseState::Canceled);
        }
        cell.hooks.cleanup();
        cell.asset = None;
        cell.on_success.clear();
        cell.on_fail.clear();
        let dependencies = cell.dependencies.clone();
        drop(cell);

        dependencies.release_all();
    }

    /// Queues `subscriber`, or calls it right away if the asset is already loaded.
    pub(crate) fn subscribe_success(&self, mut subscriber: SuccessCallback<P::Asset>) {
        let mut cell = self.0.borrow_mut();
        match cell.state {
            PromiseState::Idle | PromiseState::Loading => cell.on_success.push(subscriber),
            PromiseState::Loaded => {
                let asset = cell.asset.clone();
                drop(cell);
                if let Some(asset) = asset {
                    subscriber(&asset);
                }
            }
            PromiseState::Failed | PromiseState::Canceled => {}
        }
    }

    /// Queues `subscriber`, or calls it right away if the build already failed.
    pub(crate) fn subscribe_failure(&self, mut subscriber: FailureCallback) {
        let mut cell = self.0.borrow_mut();
        match cell.state {
            PromiseState::Idle | PromiseState::Loading => cell.on_fail.push(subscriber),
            PromiseState::Failed => {
                let err = cell.last_error.clone();
                drop(cell);
                if let Some(err) = err {
                    subscriber(&err);
                }
            }
            PromiseState::Loaded | PromiseState::Canceled => {}
        }
    }
}

/// Non-owning pointer to a promise instance.
pub(crate) struct WeakPromise<P: AssetPromise>(Weak<RefCell<PromiseCell<P>>>);

impl<P: AssetPromise> Clone for WeakPromise<P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<P: AssetPromise> WeakPromise<P> {
    pub(crate) fn upgrade(&self) -> Option<PromiseRef<P>> {
        self.0.upgrade().map(PromiseRef)
    }
}

pub(crate) fn update_stats(stats: &Cell<KeeperStats>, f: impl FnOnce(&mut KeeperStats)) {
    let mut current = stats.get();
    f(&mut current);
    stats.set(current);
}
