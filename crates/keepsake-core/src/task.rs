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

//! The cooperative task runner consumed by the keeper.
//!
//! The keeper never decides *how* build routines are scheduled. It hands each
//! routine to a [`TaskRunner`] and keeps the returned [`RunningTask`] so it can
//! stop the routine when the owning promise is canceled.

use std::{future::Future, pin::Pin};

/// A boxed future that is not required to be `Send`.
///
/// Build routines run on a single logical thread and freely capture `Rc`
/// state, so they cannot be `Send`.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Runs suspendable build routines.
pub trait TaskRunner {
    /// Starts `routine` and returns a handle that can stop it.
    ///
    /// Implementations must not poll the routine to completion synchronously
    /// inside this call.
    fn start(&self, routine: LocalBoxFuture<'static, ()>) -> Box<dyn RunningTask>;
}

/// A handle to a routine started by a [`TaskRunner`].
pub trait RunningTask {
    /// Stops the routine. After this returns the routine is never resumed again.
    fn stop(&self);

    /// Returns `true` once the routine has run to completion or was stopped.
    fn is_finished(&self) -> bool;
}
