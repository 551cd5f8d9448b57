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

//! An in-memory [`RawLoader`] with per-source latency.

use std::{cell::Cell, cell::RefCell, collections::HashMap, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use keepsake_core::{asset::AssetUUID, loader::RawLoader};

#[derive(Clone)]
struct StoredSource {
    bytes: Vec<u8>,
    latency: Duration,
}

/// Serves byte blobs registered under their source path.
///
/// Sources are indexed by [`AssetUUID::new_v5`] of their path. A load waits
/// for the source's latency on the tokio clock before returning its bytes;
/// unknown sources fail immediately.
#[derive(Default)]
pub struct MemoryLoader {
    sources: RefCell<HashMap<AssetUUID, StoredSource>>,
    requests: Cell<usize>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` under `source`, replacing any previous entry.
    pub fn insert(&self, source: &str, bytes: Vec<u8>, latency: Duration) {
        self.sources
            .borrow_mut()
            .insert(AssetUUID::new_v5(source), StoredSource { bytes, latency });
    }

    /// Removes `source`. Returns whether it was registered.
    pub fn remove(&self, source: &str) -> bool {
        self.sources
            .borrow_mut()
            .remove(&AssetUUID::new_v5(source))
            .is_some()
    }

    /// Number of loads requested so far, failed ones included.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

#[async_trait(?Send)]
impl RawLoader for MemoryLoader {
    async fn load(&self, source: &str) -> anyhow::Result<Vec<u8>> {
        self.requests.set(self.requests.get() + 1);
        let stored = self
            .sources
            .borrow()
            .get(&AssetUUID::new_v5(source))
            .cloned()
            .ok_or_else(|| anyhow!("Source '{source}' not found"))?;

        if !stored.latency.is_zero() {
            tokio::time::sleep(stored.latency).await;
        }
        log::trace!("Served {} bytes for '{}'", stored.bytes.len(), source);
        Ok(stored.bytes)
    }
}
