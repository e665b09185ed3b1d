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

use crate::actor::StateUpdate;
use crate::common::Value;
use crate::consciousness::{ConsciousnessEvent, ProcessorResult};

/// External scoring logic attached to actors that enable consciousness.
///
/// The runtime owns each actor's consciousness blob and passes the current
/// value in; methods that return `Some` replace the stored blob. Errors are
/// logged by the runtime and never fail the operation that triggered them.
#[async_trait]
pub trait ConsciousnessProcessor: Send + Sync + 'static {
    /// Creates the initial blob for a new actor from its configured seed.
    async fn initialize_actor_consciousness(&self, actor_id: &str, seed: &Value) -> ProcessorResult<Option<Value>>;

    /// Releases anything held for a destroyed actor.
    async fn cleanup_actor_consciousness(&self, actor_id: &str) -> ProcessorResult<()>;

    /// Reacts to a local state update flagged as consciousness-relevant.
    async fn process_state_update(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        update: &StateUpdate,
    ) -> ProcessorResult<Option<Value>>;

    /// Reacts to a scene change pushed from the Unity client.
    async fn process_unity_change(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        change: &Value,
    ) -> ProcessorResult<Option<Value>>;

    /// Applies a consciousness event.
    async fn apply_consciousness_update(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        event: &ConsciousnessEvent,
    ) -> ProcessorResult<Option<Value>>;

    /// Applies a response produced by the AI collaborator.
    async fn apply_ai_response(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        response: &Value,
    ) -> ProcessorResult<Option<Value>>;

    /// Scalar level in `[0, 1]` derived from a blob.
    fn consciousness_level(&self, current: Option<&Value>) -> f64;
}
