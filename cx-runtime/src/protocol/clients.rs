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

//! Registry of connected clients used for broadcast fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::types::{ProtocolType, PushNotification};

/// Unique identifier of a client connection, shared across transports.
pub type ConnectionId = usize;

/// Channel feeding push notifications to one connection's writer.
pub type PushSender = mpsc::Sender<PushNotification>;

/// Counters for push traffic.
#[derive(Debug, Default)]
pub struct PushStats {
    /// Pushes accepted by a connection's buffer.
    pub pushes_sent: AtomicUsize,
    /// Pushes dropped because a buffer was full or closed.
    pub pushes_dropped: AtomicUsize,
}

impl PushStats {
    /// Get the number of pushes sent.
    #[must_use]
    pub fn pushes_sent(&self) -> usize {
        self.pushes_sent.load(Ordering::Relaxed)
    }

    /// Get the number of pushes dropped.
    #[must_use]
    pub fn pushes_dropped(&self) -> usize {
        self.pushes_dropped.load(Ordering::Relaxed)
    }
}

struct ClientEntry {
    protocol: ProtocolType,
    push_sender: PushSender,
}

/// Tracks every live connection and its push channel.
///
/// Shared between listeners and the dispatcher through an `Arc`.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ConnectionId, ClientEntry>,
    next_id: AtomicUsize,
    stats: PushStats,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("client_count", &self.clients.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Push statistics.
    #[must_use]
    pub const fn stats(&self) -> &PushStats {
        &self.stats
    }

    /// Registers a connection with its push channel.
    pub fn register_connection(&self, conn_id: ConnectionId, protocol: ProtocolType, push_sender: PushSender) {
        trace!(conn_id, %protocol, "Registering client connection");
        self.clients.insert(conn_id, ClientEntry { protocol, push_sender });
    }

    /// Removes a connection.
    pub fn unregister_connection(&self, conn_id: ConnectionId) {
        if self.clients.remove(&conn_id).is_some() {
            debug!(conn_id, "Unregistered client connection");
        }
    }

    /// Number of connections on `protocol`.
    #[must_use]
    pub fn connection_count(&self, protocol: &ProtocolType) -> usize {
        self.clients.iter().filter(|entry| &entry.protocol == protocol).count()
    }

    /// Queues `push` for every client of `protocol`.
    ///
    /// Returns how many clients accepted it; full or closed buffers are skipped.
    pub fn broadcast(&self, protocol: &ProtocolType, push: &PushNotification) -> usize {
        let mut delivered = 0;
        for entry in self.clients.iter().filter(|entry| &entry.protocol == protocol) {
            if entry.push_sender.try_send(push.clone()).is_ok() {
                delivered += 1;
                self.stats.pushes_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                trace!(conn_id = *entry.key(), "Push buffer full or closed, dropping");
                self.stats.pushes_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        delivered
    }
}
