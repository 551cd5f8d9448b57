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

//! The promise keeper: the registry that deduplicates promises by identity and
//! owns their shared reference count.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use keepsake_core::{task::TaskRunner, KeeperConfig, KeeperError, PromiseState};

use crate::{
    handle::KeepHandle,
    promise::{update_stats, AssetPromise, PromiseRef},
    runner::LocalTaskRunner,
    stats::KeeperStats,
};

/// Tickets are unique across every keeper, so a handle forgotten on the wrong
/// keeper never matches a ticket there.
static NEXT_TICKET: AtomicU64 = AtomicU64::new(0);

struct Entry<P: AssetPromise> {
    promise: PromiseRef<P>,
    /// One ticket per live `KeepHandle`; its size is the reference count.
    tickets: HashSet<u64>,
}

struct Registry<P: AssetPromise> {
    entries: HashMap<P::Key, Entry<P>>,
}

struct KeeperInner<P: AssetPromise> {
    config: KeeperConfig,
    runner: Rc<dyn TaskRunner>,
    registry: RefCell<Registry<P>>,
    stats: Rc<Cell<KeeperStats>>,
}

enum KeepPlan<P: AssetPromise> {
    Reuse,
    Start(PromiseRef<P>),
    Restart {
        fresh: PromiseRef<P>,
        dead: PromiseRef<P>,
    },
}

/// A registry of promises for one resource type.
///
/// `Keeper` is a cheap, clonable handle; clones share the same registry. It is
/// the single source of truth for "is this identity already being built or
/// already built": at most one live promise exists per identity, and
/// [`keep`](Self::keep) / [`forget`](Self::forget) are the only operations that
/// change reference counts or registry membership.
///
/// The keeper is single-threaded (`!Send`). Build routines run on the
/// configured [`TaskRunner`], by default a [`LocalTaskRunner`].
pub struct Keeper<P: AssetPromise> {
    inner: Rc<KeeperInner<P>>,
}

impl<P: AssetPromise> Clone for Keeper<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: AssetPromise> Keeper<P> {
    /// Creates an empty keeper that runs build routines on `runner`.
    pub fn new(config: KeeperConfig, runner: Rc<dyn TaskRunner>) -> Self {
        log::info!("{}: keeper initialized.", config.name);
        Self {
            inner: Rc::new(KeeperInner {
                config,
                runner,
                registry: RefCell::new(Registry {
                    entries: HashMap::new(),
                }),
                stats: Rc::new(Cell::new(KeeperStats::default())),
            }),
        }
    }

    /// Creates an empty keeper backed by a [`LocalTaskRunner`].
    pub fn with_local_runner(config: KeeperConfig) -> Self {
        Self::new(config, Rc::new(LocalTaskRunner))
    }

    /// The configuration this keeper was created with.
    pub fn config(&self) -> &KeeperConfig {
        &self.inner.config
    }

    /// Registers interest in the resource described by `request`.
    ///
    /// - If the identity is already `Loading` or `Loaded`, the existing promise
    ///   is shared and `request` is dropped.
    /// - If the previous promise for the identity `Failed` or was `Canceled`, a
    ///   fresh promise built from `request` replaces it and starts loading.
    /// - Otherwise `request` is registered and starts loading.
    ///
    /// In every case the identity's reference count grows by one.
    pub fn keep(&self, request: P) -> KeepHandle<P> {
        let key = request.id();
        let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.inner.registry.borrow_mut();

        let (plan, promise) = match registry.entries.get_mut(&key) {
            Some(entry) if !entry.promise.state().is_dead() => {
                entry.tickets.insert(ticket);
                (KeepPlan::Reuse, entry.promise.clone())
            }
            Some(entry) => {
                let fresh = self.new_promise(request, &key);
                let dead = std::mem::replace(&mut entry.promise, fresh.clone());
                entry.tickets.insert(ticket);
                (
                    KeepPlan::Restart {
                        fresh: fresh.clone(),
                        dead,
                    },
                    fresh,
                )
            }
            None => {
                let fresh = self.new_promise(request, &key);
                registry.entries.insert(
                    key.clone(),
                    Entry {
                        promise: fresh.clone(),
                        tickets: HashSet::from([ticket]),
                    },
                );
                (KeepPlan::Start(fresh.clone()), fresh)
            }
        };
        drop(registry);

        match plan {
            KeepPlan::Reuse => {
                update_stats(&self.inner.stats, |s| s.reuses += 1);
                log::debug!(
                    "{}: reusing {:?} promise for {key:?}",
                    self.inner.config.name,
                    promise.state()
                );
            }
            KeepPlan::Start(fresh) => self.start(&fresh),
            KeepPlan::Restart { fresh, dead } => {
                update_stats(&self.inner.stats, |s| s.restarts += 1);
                log::info!(
                    "{}: previous promise for {key:?} ended {:?}, starting a new one",
                    self.inner.config.name,
                    dead.state()
                );
                dead.cleanup();
                self.start(&fresh);
            }
        }

        KeepHandle::new(key, ticket, promise)
    }

    /// Releases one reference.
    ///
    /// When the identity's count reaches zero its promise is canceled if still
    /// loading, cleaned up, and removed from the registry.
    ///
    /// # Errors
    /// Returns [`KeeperError::UnknownIdentity`] if the identity is not
    /// registered and [`KeeperError::StaleHandle`] if this handle was already
    /// forgotten. The registry is left untouched in both cases.
    pub fn forget(&self, handle: &KeepHandle<P>) -> Result<(), KeeperError> {
        let mut registry = self.inner.registry.borrow_mut();
        let Some(entry) = registry.entries.get_mut(handle.key()) else {
            let err = KeeperError::UnknownIdentity {
                identity: format!("{:?}", handle.key()),
            };
            log::error!("{}: {err}", self.inner.config.name);
            return Err(err);
        };

        if !entry.tickets.remove(&handle.ticket()) {
            let err = KeeperError::StaleHandle {
                identity: format!("{:?}", handle.key()),
                ticket: handle.ticket(),
            };
            log::error!("{}: {err}", self.inner.config.name);
            return Err(err);
        }

        if !entry.tickets.is_empty() {
            return Ok(());
        }

        let removed = registry.entries.remove(handle.key());
        drop(registry);

        if let Some(entry) = removed {
            self.dispose(entry.promise);
        }
        Ok(())
    }

    /// Forgets every identity at once, canceling in-flight loads.
    ///
    /// Outstanding handles become stale: forgetting them afterwards reports
    /// [`KeeperError::UnknownIdentity`].
    pub fn cleanup_all(&self) {
        let entries = std::mem::take(&mut self.inner.registry.borrow_mut().entries);
        if entries.is_empty() {
            return;
        }
        log::info!(
            "{}: cleaning up {} promise(s)",
            self.inner.config.name,
            entries.len()
        );
        for (_, entry) in entries {
            self.dispose(entry.promise);
        }
    }

    /// The reference count of `key`, zero if it is not registered.
    pub fn ref_count(&self, key: &P::Key) -> usize {
        self.inner
            .registry
            .borrow()
            .entries
            .get(key)
            .map_or(0, |entry| entry.tickets.len())
    }

    /// The state of the live promise for `key`.
    pub fn state(&self, key: &P::Key) -> Option<PromiseState> {
        self.inner
            .registry
            .borrow()
            .entries
            .get(key)
            .map(|entry| entry.promise.state())
    }

    /// Returns `true` if the live promise for `key` is still loading.
    pub fn is_loading(&self, key: &P::Key) -> bool {
        self.state(key) == Some(PromiseState::Loading)
    }

    /// Returns `true` if `key` is registered.
    pub fn contains(&self, key: &P::Key) -> bool {
        self.inner.registry.borrow().entries.contains_key(key)
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.inner.registry.borrow().entries.len()
    }

    /// Returns `true` if no identity is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.borrow().entries.is_empty()
    }

    /// A snapshot of the lifetime counters.
    pub fn stats(&self) -> KeeperStats {
        self.inner.stats.get()
    }

    fn new_promise(&self, request: P, key: &P::Key) -> PromiseRef<P> {
        PromiseRef::new(
            request,
            key.clone(),
            format!("{}:{key:?}", self.inner.config.name),
            self.inner.stats.clone(),
            self.inner.config.log_transitions,
        )
    }

    fn start(&self, promise: &PromiseRef<P>) {
        update_stats(&self.inner.stats, |s| s.loads_started += 1);
        log::info!("{}: loading", promise.label());
        if let Err(err) = promise.load(
            self.inner.runner.as_ref(),
            self.inner.config.sub_failure_policy,
        ) {
            log::error!("{}: {err}", self.inner.config.name);
        }
    }

    fn dispose(&self, promise: PromiseRef<P>) {
        if !promise.state().is_terminal() {
            promise.cancel();
        }
        promise.cleanup();
        update_stats(&self.inner.stats, |s| s.disposals += 1);
        log::info!("{}: disposed", promise.label());
    }
}
