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

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use keepsake_keeper::{
    Asset, AssetHandle, AssetPromise, BuildError, BuildFuture, KeepHandle, Keeper, KeeperConfig,
    LoadContext, PromiseState, SubFailurePolicy,
};
use tokio::{task::LocalSet, time::Instant};

// --- Test Setup: leaf "parts" and a composite "pair" built from two of them ---
const TICK: Duration = Duration::from_millis(10);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug)]
struct Part {
    name: String,
}
impl Asset for Part {}

#[derive(Clone)]
struct PartDef {
    name: &'static str,
    ticks: u32,
    fail: bool,
}

fn ok(name: &'static str, ticks: u32) -> PartDef {
    PartDef {
        name,
        ticks,
        fail: false,
    }
}

fn bad(name: &'static str, ticks: u32) -> PartDef {
    PartDef {
        name,
        ticks,
        fail: true,
    }
}

struct PartRequest {
    def: PartDef,
    completions: Rc<Cell<u32>>,
}

impl AssetPromise for PartRequest {
    type Asset = Part;
    type Key = &'static str;

    fn id(&self) -> &'static str {
        self.def.name
    }

    fn load(&mut self, _ctx: LoadContext) -> BuildFuture<Part> {
        let def = self.def.clone();
        let completions = self.completions.clone();
        Box::pin(async move {
            tokio::time::sleep(TICK * def.ticks).await;
            completions.set(completions.get() + 1);
            if def.fail {
                Err(BuildError::msg(def.name, "corrupt data"))
            } else {
                Ok(Part {
                    name: def.name.to_string(),
                })
            }
        })
    }
}

#[derive(Clone, Default)]
struct Pair {
    left: Option<AssetHandle<Part>>,
    right: Option<AssetHandle<Part>>,
    assembled: bool,
}
impl Asset for Pair {}

struct PairRequest {
    name: &'static str,
    left: Option<PartDef>,
    right: Option<PartDef>,
    parts: Keeper<PartRequest>,
    completions: Rc<Cell<u32>>,
}

impl AssetPromise for PairRequest {
    type Asset = Pair;
    type Key = &'static str;

    fn id(&self) -> &'static str {
        self.name
    }

    fn load(&mut self, ctx: LoadContext) -> BuildFuture<Pair> {
        let (left, right) = (self.left.clone(), self.right.clone());
        let parts = self.parts.clone();
        let completions = self.completions.clone();

        Box::pin(async move {
            let pair = Rc::new(RefCell::new(Pair::default()));
            let request = |def: PartDef| PartRequest {
                def,
                completions: completions.clone(),
            };

            // Keep every requested part before waiting on any of them.
            let left = left.map(|def| {
                let dep = ctx.keep(&parts, request(def));
                let pair = pair.clone();
                dep.on_success(move |part| pair.borrow_mut().left = Some(part.clone()));
                dep
            });
            let right = right.map(|def| {
                let dep = ctx.keep(&parts, request(def));
                let pair = pair.clone();
                dep.on_success(move |part| pair.borrow_mut().right = Some(part.clone()));
                dep
            });

            for dep in [&left, &right].into_iter().flatten() {
                dep.settled().await;
            }

            let mut pair = pair.borrow().clone();
            pair.assembled = true;
            ctx.finish(pair)
        })
    }
}

struct Fixture {
    parts: Keeper<PartRequest>,
    pairs: Keeper<PairRequest>,
    completions: Rc<Cell<u32>>,
}

impl Fixture {
    fn new(policy: SubFailurePolicy) -> Self {
        Self {
            parts: Keeper::with_local_runner(KeeperConfig::named("parts")),
            pairs: Keeper::with_local_runner(
                KeeperConfig::named("pairs").with_sub_failure_policy(policy),
            ),
            completions: Rc::new(Cell::new(0)),
        }
    }

    fn pair(
        &self,
        name: &'static str,
        left: Option<PartDef>,
        right: Option<PartDef>,
    ) -> KeepHandle<PairRequest> {
        self.pairs.keep(PairRequest {
            name,
            left,
            right,
            parts: self.parts.clone(),
            completions: self.completions.clone(),
        })
    }

    fn part(&self, def: PartDef) -> KeepHandle<PartRequest> {
        self.parts.keep(PartRequest {
            def,
            completions: self.completions.clone(),
        })
    }
}

struct Events {
    successes: Rc<RefCell<Vec<AssetHandle<Pair>>>>,
    failures: Rc<RefCell<Vec<BuildError>>>,
}

fn observe(handle: &KeepHandle<PairRequest>) -> Events {
    let events = Events {
        successes: Rc::default(),
        failures: Rc::default(),
    };
    let successes = events.successes.clone();
    let failures = events.failures.clone();
    handle
        .on_success(move |pair| successes.borrow_mut().push(pair.clone()))
        .on_fail(move |err| failures.borrow_mut().push(err.clone()));
    events
}

async fn past_tick(start: Instant, n: u32) {
    tokio::time::sleep_until(start + TICK * n + TICK / 2).await;
}
// ---

#[tokio::test(start_paused = true)]
async fn test_partial_failure_fires_both_paths() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            // --- 1. ARRANGE ---
            let fx = Fixture::new(SubFailurePolicy::Forward);
            let start = Instant::now();

            // --- 2. ACT ---
            let pair = fx.pair("ab", Some(ok("a", 1)), Some(bad("b", 2)));
            let events = observe(&pair);

            // --- 3. ASSERT ---
            past_tick(start, 1).await;
            assert!(events.failures.borrow().is_empty());
            assert!(events.successes.borrow().is_empty());
            assert_eq!(pair.state(), PromiseState::Loading);

            past_tick(start, 2).await;
            assert_eq!(events.failures.borrow().len(), 1);
            assert_eq!(events.failures.borrow()[0].asset(), "b");
            assert_eq!(events.successes.borrow().len(), 1);

            let built = &events.successes.borrow()[0];
            assert!(built.assembled);
            assert_eq!(built.left.as_ref().map(|p| p.name.as_str()), Some("a"));
            assert!(built.right.is_none(), "failed slot keeps its default");
            assert_eq!(pair.state(), PromiseState::Loaded);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_forwarded_failure_carries_the_sub_error() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Forward);
            let start = Instant::now();

            let pair = fx.pair("xb", None, Some(bad("b", 1)));
            let events = observe(&pair);
            // Keep the failing part directly too so its error can be compared.
            let part = fx.part(bad("b", 1));

            past_tick(start, 1).await;
            let sub_error = part.error().expect("part should have failed");
            assert!(events.failures.borrow()[0].same_origin(&sub_error));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_sibling_keeps_loading_after_failure() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Forward);
            let start = Instant::now();

            let pair = fx.pair("ba", Some(ok("slow", 3)), Some(bad("fast", 1)));
            let events = observe(&pair);

            past_tick(start, 1).await;
            assert_eq!(events.failures.borrow().len(), 1);
            assert_eq!(fx.parts.state(&"slow"), Some(PromiseState::Loading));

            past_tick(start, 3).await;
            assert_eq!(fx.parts.state(&"slow"), Some(PromiseState::Loaded));
            let built = &events.successes.borrow()[0];
            assert_eq!(built.left.as_ref().map(|p| p.name.as_str()), Some("slow"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_fatal_policy_fails_once_without_success() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Fatal);
            let start = Instant::now();

            let pair = fx.pair("ab", Some(ok("a", 3)), Some(bad("b", 1)));
            let events = observe(&pair);

            past_tick(start, 1).await;
            assert!(
                events.failures.borrow().is_empty(),
                "fatal policy holds failures until every part is terminal"
            );

            past_tick(start, 3).await;
            assert_eq!(events.failures.borrow().len(), 1);
            assert_eq!(events.failures.borrow()[0].asset(), "b");
            assert!(events.successes.borrow().is_empty());
            assert_eq!(pair.state(), PromiseState::Failed);

            // The failed composite still holds its parts until it is forgotten.
            assert_eq!(fx.parts.len(), 2);
            fx.pairs.forget(&pair).unwrap();
            assert!(fx.parts.is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_forgetting_composite_cascades_to_parts() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Forward);
            let start = Instant::now();

            let pair = fx.pair("ab", Some(ok("a", 2)), Some(ok("b", 3)));
            let events = observe(&pair);

            past_tick(start, 1).await;
            assert_eq!(fx.parts.len(), 2);
            assert_eq!(pair.dependency_count(), 2);
            assert!(fx.parts.is_loading(&"a"));

            fx.pairs.forget(&pair).unwrap();
            assert!(fx.pairs.is_empty());
            assert!(fx.parts.is_empty());
            assert_eq!(fx.parts.stats().cancellations, 2);

            past_tick(start, 5).await;
            assert_eq!(fx.completions.get(), 0, "canceled parts must not finish");
            assert!(events.successes.borrow().is_empty());
            assert!(events.failures.borrow().is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_shared_part_survives_composite_disposal() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Forward);
            let start = Instant::now();

            let direct = fx.part(ok("a", 2));
            let pair = fx.pair("a_only", Some(ok("a", 2)), None);
            // The composite keeps its parts once its routine first runs.
            assert_eq!(fx.parts.ref_count(&"a"), 1);

            past_tick(start, 1).await;
            assert_eq!(fx.parts.ref_count(&"a"), 2);
            fx.pairs.forget(&pair).unwrap();
            assert_eq!(fx.parts.ref_count(&"a"), 1);
            assert!(fx.parts.is_loading(&"a"));

            past_tick(start, 2).await;
            assert_eq!(direct.state(), PromiseState::Loaded);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_cached_part_is_applied_synchronously() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Forward);
            let start = Instant::now();

            let direct = fx.part(ok("a", 1));
            past_tick(start, 1).await;
            assert_eq!(direct.state(), PromiseState::Loaded);

            let pair = fx.pair("a_only", Some(ok("a", 1)), None);
            let built = pair.settled().await.loaded().expect("pair should load");
            assert!(AssetHandle::ptr_eq(
                built.left.as_ref().unwrap(),
                &direct.asset().unwrap()
            ));
            assert_eq!(fx.completions.get(), 1, "the cached part is not rebuilt");
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_only_requested_parts_are_kept() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Forward);

            let pair = fx.pair("empty", None, None);
            let built = pair.settled().await.loaded().expect("pair should load");
            assert!(built.assembled);
            assert!(built.left.is_none() && built.right.is_none());
            assert!(fx.parts.is_empty());

            let single = fx.pair("right", None, Some(ok("r", 1)));
            single.settled().await;
            assert_eq!(single.dependency_count(), 1);
            assert_eq!(fx.parts.len(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_restarting_failed_composite_releases_old_parts() {
    LocalSet::new()
        .run_until(async {
            let fx = Fixture::new(SubFailurePolicy::Fatal);
            let start = Instant::now();

            let first = fx.pair("ab", Some(ok("a", 1)), Some(bad("b", 1)));
            past_tick(start, 1).await;
            assert_eq!(first.state(), PromiseState::Failed);
            assert_eq!(fx.parts.ref_count(&"a"), 1);

            // The retry asks for a good "b"; the dead composite's parts are forgotten
            // so the failed "b" promise is replaced rather than shared.
            let retry = fx.pair("ab", Some(ok("a", 1)), Some(ok("b", 1)));
            past_tick(start, 3).await;
            assert_eq!(retry.state(), PromiseState::Loaded);
            assert_eq!(fx.parts.ref_count(&"a"), 1);
            assert_eq!(fx.parts.ref_count(&"b"), 1);
            assert_eq!(fx.pairs.ref_count(&"ab"), 2);
        })
        .await;
}
