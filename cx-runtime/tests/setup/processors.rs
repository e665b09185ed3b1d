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
//! Consciousness processors shared by the integration tests.

use std::time::Duration;

use async_trait::async_trait;

use cx_runtime::actor::StateUpdate;
use cx_runtime::common::Value;
use cx_runtime::consciousness::{ConsciousnessEvent, NoopProcessor, ProcessorResult};
use cx_runtime::traits::ConsciousnessProcessor;

/// Behaves like [`NoopProcessor`] but takes `delay` to initialize each actor.
///
/// Lets a test hold a create, and the transaction around it, in flight.
pub struct SlowProcessor {
    pub delay: Duration,
}

impl SlowProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ConsciousnessProcessor for SlowProcessor {
    async fn initialize_actor_consciousness(&self, actor_id: &str, seed: &Value) -> ProcessorResult<Option<Value>> {
        tokio::time::sleep(self.delay).await;
        NoopProcessor.initialize_actor_consciousness(actor_id, seed).await
    }

    async fn cleanup_actor_consciousness(&self, actor_id: &str) -> ProcessorResult<()> {
        NoopProcessor.cleanup_actor_consciousness(actor_id).await
    }

    async fn process_state_update(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        update: &StateUpdate,
    ) -> ProcessorResult<Option<Value>> {
        NoopProcessor.process_state_update(actor_id, current, update).await
    }

    async fn process_unity_change(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        change: &Value,
    ) -> ProcessorResult<Option<Value>> {
        NoopProcessor.process_unity_change(actor_id, current, change).await
    }

    async fn apply_consciousness_update(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        event: &ConsciousnessEvent,
    ) -> ProcessorResult<Option<Value>> {
        NoopProcessor.apply_consciousness_update(actor_id, current, event).await
    }

    async fn apply_ai_response(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        response: &Value,
    ) -> ProcessorResult<Option<Value>> {
        NoopProcessor.apply_ai_response(actor_id, current, response).await
    }

    fn consciousness_level(&self, current: Option<&Value>) -> f64 {
        NoopProcessor.consciousness_level(current)
    }
}
