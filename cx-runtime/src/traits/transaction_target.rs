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

use crate::actor::{ActorConfig, ActorSnapshot, StateUpdate};
use crate::common::{RuntimeResult, Value};
use crate::message::Message;

/// The actor store a [`TransactionManager`](crate::transaction::TransactionManager) applies operations to.
#[async_trait]
pub trait TransactionTarget: Send + Sync {
    /// Handle on an actor instance created through [`create`](Self::create).
    ///
    /// Rollback passes it back to [`discard`](Self::discard) so only the
    /// instance this transaction created is removed, never a later actor that
    /// reuses the id.
    type Created: Send + Sync;

    /// Whether `actor_id` is registered and not being destroyed.
    fn actor_exists(&self, actor_id: &str) -> bool;

    /// Whether the factory knows `actor_type`.
    fn is_type_registered(&self, actor_type: &str) -> bool;

    /// Current state of `actor_id`.
    fn snapshot(&self, actor_id: &str) -> Option<ActorSnapshot>;

    /// Creates and starts an actor.
    async fn create(&self, actor_type: &str, actor_id: &str, config: ActorConfig) -> RuntimeResult<Self::Created>;

    /// Destroys a created instance if it is still the one registered under its id.
    async fn discard(&self, created: Self::Created) -> bool;

    /// Applies `update`; `false` when the actor is gone.
    async fn update(&self, actor_id: &str, update: &StateUpdate) -> bool;

    /// Destroys an actor; `false` when it was not registered.
    async fn destroy(&self, actor_id: &str) -> bool;

    /// Puts an actor back into the state captured in `snapshot`, recreating it if needed.
    ///
    /// Waits for a destroy of the same id that is still in progress.
    async fn restore(&self, snapshot: ActorSnapshot) -> RuntimeResult<()>;

    /// Enqueues a message.
    fn send(&self, from: &str, to: &str, payload: Value) -> RuntimeResult<Message>;
}
