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

use keepsake_core::task::{LocalBoxFuture, RunningTask, TaskRunner};
use tokio::task::JoinHandle;

/// A [`TaskRunner`] backed by `tokio::task::spawn_local`.
///
/// Build routines are multiplexed on the current thread's `LocalSet`, which
/// gives the single-threaded cooperative scheduling the keeper relies on.
/// Starting a routine outside of a `LocalSet` context panics.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTaskRunner;

impl TaskRunner for LocalTaskRunner {
    fn start(&self, routine: LocalBoxFuture<'static, ()>) -> Box<dyn RunningTask> {
        Box::new(LocalTask(tokio::task::spawn_local(routine)))
    }
}

struct LocalTask(JoinHandle<()>);

impl RunningTask for LocalTask {
    fn stop(&self) {
        self.0.abort();
    }

    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}
