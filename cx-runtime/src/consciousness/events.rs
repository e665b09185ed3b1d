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

use serde::{Deserialize, Serialize};

use crate::common::{Value, ValueMap};

/// A batch of entity changes pushed from the Unity scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneUpdate {
    /// Scene frame or tick the batch belongs to.
    #[serde(default)]
    pub frame: u64,
    /// Per-entity changes, applied in order.
    #[serde(default)]
    pub entities: Vec<EntityChange>,
}

/// Change to one actor mirrored in the scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    /// Actor the entity is bound to.
    pub actor_id: String,
    /// Properties to merge into the actor.
    #[serde(default)]
    pub properties: ValueMap,
    /// New active flag, if the scene toggled the entity.
    #[serde(default)]
    pub active: Option<bool>,
    /// Raw change forwarded to the consciousness processor.
    #[serde(default)]
    pub change: Value,
}

/// A consciousness event targeting one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsciousnessEvent {
    /// Target actor.
    pub actor_id: String,
    /// Event kind, e.g. `stimulus`, `emotional`, `rest`, `fatigue`.
    pub kind: String,
    /// Signed strength of the event.
    #[serde(default)]
    pub intensity: f64,
    /// Additional data for the processor.
    #[serde(default)]
    pub data: Value,
}

impl ConsciousnessEvent {
    /// Creates an event without extra data.
    #[must_use]
    pub fn new(actor_id: impl Into<String>, kind: impl Into<String>, intensity: f64) -> Self {
        Self {
            actor_id: actor_id.into(),
            kind: kind.into(),
            intensity,
            data: Value::Null,
        }
    }
}
