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

//! Access to raw resource bytes.

use anyhow::Result;
use async_trait::async_trait;

/// A leaf capability that fetches the raw bytes of a single source.
///
/// This is the only place disk or network access would happen. The keeper never
/// calls it; concrete resource types do so from inside their build routine.
#[async_trait(?Send)]
pub trait RawLoader {
    /// Fetches the bytes stored under `source`.
    ///
    /// # Errors
    /// Returns an error if the source does not exist or could not be read.
    async fn load(&self, source: &str) -> Result<Vec<u8>>;
}
