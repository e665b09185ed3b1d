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

use super::{ConsciousnessEvent, ProcessorResult};
use crate::actor::StateUpdate;
use crate::common::Value;
use crate::traits::ConsciousnessProcessor;

/// Processor that keeps no state and never changes a blob.
///
/// Installed by default; actors that enable consciousness simply keep their seed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

#[async_trait]
impl ConsciousnessProcessor for NoopProcessor {
    async fn initialize_actor_consciousness(&self, _actor_id: &str, seed: &Value) -> ProcessorResult<Option<Value>> {
        Ok((!seed.is_null()).then(|| seed.clone()))
    }

    async fn cleanup_actor_consciousness(&self, _actor_id: &str) -> ProcessorResult<()> {
        Ok(())
    }

    async fn process_state_update(
        &self,
        _actor_id: &str,
        _current: Option<&Value>,
        _update: &StateUpdate,
    ) -> ProcessorResult<Option<Value>> {
        Ok(None)
    }

    async fn process_unity_change(
        &self,
        _actor_id: &str,
        _current: Option<&Value>,
        _change: &Value,
    ) -> ProcessorResult<Option<Value>> {
        Ok(None)
    }

    async fn apply_consciousness_update(
        &self,
        _actor_id: &str,
        _current: Option<&Value>,
        _event: &ConsciousnessEvent,
    ) -> ProcessorResult<Option<Value>> {
        Ok(None)
    }

    async fn apply_ai_response(
        &self,
        _actor_id: &str,
        _current: Option<&Value>,
        _response: &Value,
    ) -> ProcessorResult<Option<Value>> {
        Ok(None)
    }

    fn consciousness_level(&self, _current: Option<&Value>) -> f64 {
        0.0
    }
}
