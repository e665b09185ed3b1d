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

use crate::common::{now_millis, TimestampMs, Value, ValueMap};

/// The mutable state of one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorState {
    /// Actor id.
    pub id: String,
    /// Type tag the behavior was built from.
    pub actor_type: String,
    /// Owning namespace.
    pub namespace: String,
    /// Property bag.
    pub properties: ValueMap,
    /// Inactive actors are destroyed by the maintenance sweep.
    pub active: bool,
    /// Creation time.
    pub created_at: TimestampMs,
    /// Last message, update or script.
    pub last_activity: TimestampMs,
    /// Opaque blob owned by the consciousness processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consciousness: Option<Value>,
    /// Messages handled so far.
    pub message_count: u64,
}

/// Point-in-time copy of an actor's state.
pub type ActorSnapshot = ActorState;

impl ActorState {
    /// Fresh, active state.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        actor_type: impl Into<String>,
        namespace: impl Into<String>,
        properties: ValueMap,
    ) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            actor_type: actor_type.into(),
            namespace: namespace.into(),
            properties,
            active: true,
            created_at: now,
            last_activity: now,
            consciousness: None,
            message_count: 0,
        }
    }

    /// Marks the actor as just used.
    pub fn touch(&mut self) {
        self.last_activity = now_millis();
    }

    /// Summary for listings.
    #[must_use]
    pub fn info(&self) -> ActorInfo {
        ActorInfo {
            id: self.id.clone(),
            actor_type: self.actor_type.clone(),
            namespace: self.namespace.clone(),
            active: self.active,
            message_count: self.message_count,
            last_activity: self.last_activity,
        }
    }
}

/// Row returned by `list_actors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorInfo {
    /// Actor id.
    pub id: String,
    /// Type tag.
    pub actor_type: String,
    /// Owning namespace.
    pub namespace: String,
    /// Active flag.
    pub active: bool,
    /// Messages handled.
    pub message_count: u64,
    /// Last activity time.
    pub last_activity: TimestampMs,
}
