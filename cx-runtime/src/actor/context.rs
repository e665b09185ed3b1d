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

use crate::actor::ActorState;
use crate::common::{RuntimeResult, Value};
use crate::interpreter::{CompiledScript, EmittedMessage, InterpreterManager, ScriptOutcome};

/// Exclusive view of an actor handed to its behavior for one hook call.
///
/// Messages sent through the context are enqueued on the runtime queue after
/// the hook returns, in the order they were sent.
pub struct ActorContext<'a> {
    state: &'a mut ActorState,
    interpreters: &'a InterpreterManager,
    outbox: Vec<EmittedMessage>,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(state: &'a mut ActorState, interpreters: &'a InterpreterManager) -> Self {
        Self {
            state,
            interpreters,
            outbox: Vec::new(),
        }
    }

    /// Id of the actor.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.state.id
    }

    /// Read access to the whole state.
    #[must_use]
    pub fn state(&self) -> &ActorState {
        self.state
    }

    /// Looks up a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.state.properties.get(key)
    }

    /// Sets a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.properties.insert(key.into(), value.into());
    }

    /// Removes a property.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.state.properties.remove(key)
    }

    /// Sets the active flag.
    pub fn set_active(&mut self, active: bool) {
        self.state.active = active;
    }

    /// Queues a message from this actor.
    pub fn send(&mut self, to: impl Into<String>, payload: impl Into<Value>) {
        self.outbox.push(EmittedMessage {
            to: to.into(),
            payload: payload.into(),
        });
    }

    /// Runs `script` against this actor's properties.
    ///
    /// Property changes are written back only when the script succeeds; its
    /// emitted messages join the outbox.
    ///
    /// # Errors
    ///
    /// Interpreter resolution or script failure.
    pub fn run_script(&mut self, script: &CompiledScript) -> RuntimeResult<ScriptOutcome> {
        let actor_id = self.state.id.clone();
        let outcome = self
            .interpreters
            .run_script(Some(actor_id), &mut self.state.properties, script)?;
        self.outbox.extend(outcome.emitted.iter().cloned());
        Ok(outcome)
    }

    pub(crate) fn into_outbox(self) -> Vec<EmittedMessage> {
        self.outbox
    }
}
