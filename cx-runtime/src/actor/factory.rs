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

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::actor::builtin::{BasicActor, ScriptedActor};
use crate::actor::ActorConfig;
use crate::common::{RuntimeError, RuntimeResult};
use crate::traits::ActorBehavior;

/// Builds a behavior from a configuration descriptor.
pub type BehaviorConstructor =
    Arc<dyn Fn(&ActorConfig) -> RuntimeResult<Box<dyn ActorBehavior>> + Send + Sync>;

/// Registry of actor types.
pub struct ActorFactory {
    constructors: DashMap<String, BehaviorConstructor>,
}

impl std::fmt::Debug for ActorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorFactory")
            .field("types", &self.registered_types())
            .finish()
    }
}

impl Default for ActorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorFactory {
    /// A factory knowing the `basic` and `scripted` types.
    #[must_use]
    pub fn new() -> Self {
        let factory = Self {
            constructors: DashMap::new(),
        };
        factory.register_type(BasicActor::TYPE, BasicActor::build);
        factory.register_type(ScriptedActor::TYPE, ScriptedActor::build);
        factory
    }

    /// Registers `actor_type`. Returns `false` if the name is taken.
    pub fn register_type<F>(&self, actor_type: impl Into<String>, constructor: F) -> bool
    where
        F: Fn(&ActorConfig) -> RuntimeResult<Box<dyn ActorBehavior>> + Send + Sync + 'static,
    {
        let actor_type = actor_type.into();
        match self.constructors.entry(actor_type) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                debug!(actor_type = %entry.key(), "Registered actor type");
                entry.insert(Arc::new(constructor));
                true
            }
        }
    }

    /// Whether `actor_type` is registered.
    #[must_use]
    pub fn is_registered(&self, actor_type: &str) -> bool {
        self.constructors.contains_key(actor_type)
    }

    /// Sorted registered type names.
    #[must_use]
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    /// Builds a behavior for `actor_type`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidConfiguration`] for unknown types, or whatever
    /// the constructor rejects the descriptor with.
    pub fn create(&self, actor_type: &str, config: &ActorConfig) -> RuntimeResult<Box<dyn ActorBehavior>> {
        let constructor = self
            .constructors
            .get(actor_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuntimeError::InvalidConfiguration(format!("unknown actor type '{actor_type}'")))?;
        constructor(config)
    }
}
