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

use crate::actor::ActorState;
use crate::common::{RuntimeError, RuntimeResult, Value, ValueMap};

/// Descriptor handed to [`create_actor`](crate::common::ActorRuntime::create_actor).
///
/// Every field is optional on the wire; an empty descriptor creates an actor
/// in the runtime's default namespace with no properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActorConfig {
    /// Owning namespace. `None` selects the runtime default.
    pub namespace: Option<String>,
    /// Initial properties.
    pub properties: ValueMap,
    /// Whether the consciousness processor tracks this actor.
    pub enable_consciousness: bool,
    /// Seed passed to the processor when consciousness is enabled.
    pub consciousness_seed: Value,
    /// Overrides the configured inbox capacity.
    pub inbox_capacity: Option<usize>,
}

impl ActorConfig {
    /// An empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the actor in `namespace`.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds an initial property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Enables consciousness tracking with `seed`.
    #[must_use]
    pub fn with_consciousness(mut self, seed: Value) -> Self {
        self.enable_consciousness = true;
        self.consciousness_seed = seed;
        self
    }

    /// Sets a custom inbox capacity for this actor.
    #[must_use]
    pub const fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = Some(capacity);
        self
    }

    /// Resolves the owning namespace against the runtime default.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidConfiguration`] when the result is blank.
    pub fn resolve_namespace(&self, default_namespace: &str) -> RuntimeResult<String> {
        let namespace = self.namespace.as_deref().unwrap_or(default_namespace).trim();
        if namespace.is_empty() {
            return Err(RuntimeError::InvalidConfiguration(
                "namespace must not be empty".to_string(),
            ));
        }
        Ok(namespace.to_string())
    }
}

/// A partial update of an actor's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateUpdate {
    /// Properties merged into the actor.
    pub properties: ValueMap,
    /// Property keys removed after the merge.
    pub remove: Vec<String>,
    /// New active flag, if any.
    pub active: Option<bool>,
    /// Whether the consciousness processor should see this update.
    pub consciousness_relevant: bool,
}

impl StateUpdate {
    /// An empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `key = value`.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Removes `key`.
    #[must_use]
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub const fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Forwards the update to the consciousness processor.
    #[must_use]
    pub const fn consciousness_relevant(mut self) -> Self {
        self.consciousness_relevant = true;
        self
    }

    /// Applies the update. Returns `true` if anything changed.
    pub fn apply_to(&self, state: &mut ActorState) -> bool {
        let mut changed = false;
        for (key, value) in &self.properties {
            if state.properties.get(key) != Some(value) {
                state.properties.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        for key in &self.remove {
            changed |= state.properties.remove(key).is_some();
        }
        if let Some(active) = self.active {
            changed |= state.active != active;
            state.active = active;
        }
        changed
    }
}
