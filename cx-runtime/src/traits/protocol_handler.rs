/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use async_trait::async_trait;

use crate::common::{RuntimeResult, Value};
use crate::protocol::{ProtocolRequest, ProtocolResponse};

/// Serves every request sent under a custom protocol name.
#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Produces the response for `request`.
    ///
    /// The dispatcher overwrites the response id with the request id and
    /// records timing, so handlers may build responses with any id.
    async fn handle(&self, request: ProtocolRequest) -> ProtocolResponse;
}

/// Serves one command name on the built-in transports.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Executes the command with the request's `data`.
    ///
    /// # Errors
    ///
    /// Any [`RuntimeError`](crate::common::RuntimeError); the dispatcher turns
    /// it into a failed response carrying the error's code.
    async fn call(&self, request: &ProtocolRequest) -> RuntimeResult<Value>;
}
