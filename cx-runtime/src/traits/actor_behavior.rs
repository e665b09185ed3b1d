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

use crate::actor::{ActorContext, ActorState};
use crate::common::RuntimeResult;
use crate::message::Message;

/// Typed behavior attached to an actor by the [`ActorFactory`](crate::actor::ActorFactory).
///
/// Hooks run on the actor's own task, one message at a time, with exclusive
/// access to the actor's state through the [`ActorContext`]. They are
/// synchronous so no state lock is ever held across an await point.
pub trait ActorBehavior: Send + 'static {
    /// The type tag this behavior was registered under.
    fn actor_type(&self) -> &str;

    /// Called once after the actor's task starts.
    fn on_start(&mut self, _context: &mut ActorContext<'_>) {}

    /// Handles one delivered message.
    ///
    /// # Errors
    ///
    /// Errors are logged by the actor task; the actor keeps running.
    fn handle_message(&mut self, message: &Message, context: &mut ActorContext<'_>) -> RuntimeResult<()>;

    /// Called once when the actor is destroyed, after its inbox is closed.
    fn on_stop(&mut self, _state: &ActorState) {}

    /// Whether the maintenance sweep should destroy this actor.
    fn is_inactive(&self, state: &ActorState) -> bool {
        !state.active
    }
}
