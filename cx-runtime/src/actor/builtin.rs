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

//! Actor types registered by every runtime.

use tracing::trace;

use crate::actor::{ActorConfig, ActorContext};
use crate::common::{RuntimeResult, Value};
use crate::interpreter::CompiledScript;
use crate::message::Message;
use crate::traits::ActorBehavior;

/// Counts messages, remembers the last payload and merges `set` maps.
///
/// A map payload with a `set` entry that is itself a map has that map merged
/// into the actor's properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicActor;

impl BasicActor {
    /// Type tag.
    pub const TYPE: &'static str = "basic";

    /// Constructor registered with the factory.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn build(_config: &ActorConfig) -> RuntimeResult<Box<dyn ActorBehavior>> {
        Ok(Box::new(Self))
    }
}

fn record_message(message: &Message, context: &mut ActorContext<'_>) {
    let received = context
        .property("messages_received")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    context.set_property("messages_received", received + 1);
    context.set_property("last_message", message.payload.clone());
}

impl ActorBehavior for BasicActor {
    fn actor_type(&self) -> &str {
        Self::TYPE
    }

    fn handle_message(&mut self, message: &Message, context: &mut ActorContext<'_>) -> RuntimeResult<()> {
        record_message(message, context);
        if let Some(set) = message.payload.get("set").and_then(Value::as_map) {
            for (key, value) in set {
                context.set_property(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

/// Runs compiled scripts carried in its messages.
///
/// A map payload with a `script` entry is decoded as a
/// [`CompiledScript`] and executed against the actor's own properties; the
/// script's return value is stored under `last_result`. Other payloads are
/// recorded like [`BasicActor`] does.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedActor;

impl ScriptedActor {
    /// Type tag.
    pub const TYPE: &'static str = "scripted";

    /// Constructor registered with the factory.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn build(_config: &ActorConfig) -> RuntimeResult<Box<dyn ActorBehavior>> {
        Ok(Box::new(Self))
    }
}

impl ActorBehavior for ScriptedActor {
    fn actor_type(&self) -> &str {
        Self::TYPE
    }

    fn handle_message(&mut self, message: &Message, context: &mut ActorContext<'_>) -> RuntimeResult<()> {
        record_message(message, context);
        let Some(script) = message.payload.get("script") else {
            return Ok(());
        };
        let script = CompiledScript::from_value(script)?;
        let outcome = context.run_script(&script)?;
        trace!(
            actor_id = context.actor_id(),
            interpreter = %outcome.interpreter,
            steps = outcome.instructions_executed,
            "Script message executed"
        );
        context.set_property("last_result", outcome.return_value);
        Ok(())
    }
}
