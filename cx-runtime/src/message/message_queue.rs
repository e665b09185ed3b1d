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

use tokio::sync::mpsc;
use tracing::trace;

use crate::common::metrics::{bump, RuntimeCounters};
use crate::common::{RuntimeError, RuntimeResult};
use crate::message::Message;

/// Sending side of the runtime's inbound queue.
///
/// Unbounded, so enqueue never waits. The single delivery loop holds the
/// receiving side and forwards messages in FIFO order.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    sender: mpsc::UnboundedSender<Message>,
    counters: Arc<RuntimeCounters>,
}

impl MessageQueue {
    /// Creates the queue and returns its receiving side.
    #[must_use]
    pub fn new(counters: Arc<RuntimeCounters>) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, counters }, receiver)
    }

    /// Enqueues `message`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Shutdown`] once the delivery loop has exited.
    pub fn enqueue(&self, message: Message) -> RuntimeResult<Message> {
        trace!(id = %message.id, from = %message.from, to = %message.to, "Enqueueing message");
        self.sender
            .send(message.clone())
            .map_err(|_| RuntimeError::Shutdown)?;
        bump(&self.counters.messages_sent);
        Ok(message)
    }

    /// Whether the delivery loop has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
