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
//! Actor behaviors shared by the integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cx_runtime::actor::{ActorConfig, ActorContext, ActorState};
use cx_runtime::common::{ActorRuntime, RuntimeError, RuntimeResult, Value};
use cx_runtime::message::Message;
use cx_runtime::traits::ActorBehavior;

/// Arrival log shared between a test and its recorder actors: `(actor id, payload)`.
pub type Journal = Arc<Mutex<Vec<(String, Value)>>>;

/// Records every payload it receives, in arrival order.
pub struct Recorder {
    journal: Journal,
}

impl Recorder {
    pub const TYPE: &'static str = "recorder";
}

impl ActorBehavior for Recorder {
    fn actor_type(&self) -> &str {
        Self::TYPE
    }

    fn handle_message(&mut self, message: &Message, context: &mut ActorContext<'_>) -> RuntimeResult<()> {
        self.journal
            .lock()
            .push((context.actor_id().to_string(), message.payload.clone()));
        let seen = context.property("seen").and_then(Value::as_i64).unwrap_or(0);
        context.set_property("seen", seen + 1);
        Ok(())
    }
}

/// Registers the `recorder` type on `runtime` and returns the journal its actors write to.
pub fn register_recorder(runtime: &ActorRuntime) -> Journal {
    let journal: Journal = Arc::default();
    let shared = Arc::clone(&journal);
    runtime.factory().register_type(Recorder::TYPE, move |_config: &ActorConfig| {
        Ok(Box::new(Recorder {
            journal: Arc::clone(&shared),
        }) as Box<dyn ActorBehavior>)
    });
    journal
}

/// Registers `picky`: a type whose constructor rejects configs without a `name` property.
pub fn register_picky(runtime: &ActorRuntime) {
    runtime.factory().register_type("picky", |config: &ActorConfig| {
        if config.properties.contains_key("name") {
            Ok(Box::new(cx_runtime::actor::BasicActor) as Box<dyn ActorBehavior>)
        } else {
            Err(RuntimeError::InvalidConfiguration("picky actors need a name".to_string()))
        }
    });
}

/// Ignores messages and blocks for `delay` in `on_stop`, so destroying one takes a while.
pub struct Sticky {
    delay: Duration,
}

impl ActorBehavior for Sticky {
    fn actor_type(&self) -> &str {
        "sticky"
    }

    fn handle_message(&mut self, _message: &Message, _context: &mut ActorContext<'_>) -> RuntimeResult<()> {
        Ok(())
    }

    fn on_stop(&mut self, _state: &ActorState) {
        std::thread::sleep(self.delay);
    }
}

/// Registers `sticky` with the given stop delay.
pub fn register_sticky(runtime: &ActorRuntime, delay: Duration) {
    runtime.factory().register_type("sticky", move |_config: &ActorConfig| {
        Ok(Box::new(Sticky { delay }) as Box<dyn ActorBehavior>)
    });
}

/// Payloads the journal recorded for `actor_id`, in order.
pub fn payloads_for(journal: &Journal, actor_id: &str) -> Vec<Value> {
    journal
        .lock()
        .iter()
        .filter(|(id, _)| id == actor_id)
        .map(|(_, payload)| payload.clone())
        .collect()
}
