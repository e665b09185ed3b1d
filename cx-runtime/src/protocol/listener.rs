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

//! TCP listeners shared by the built-in transports.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use super::clients::ConnectionId;
use super::rate_limiter::RateLimiter;
use super::types::{ProtocolRequest, ProtocolResponse, ProtocolType, TransportError};
use super::{binary, grpc, websocket, ProtocolDispatcher};

/// Lifecycle of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ListenerState {
    /// Not accepting connections.
    Stopped = 0,
    /// Binding the socket.
    Starting = 1,
    /// Accepting connections.
    Listening = 2,
    /// Draining connections.
    Stopping = 3,
}

impl ListenerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Starting,
            2 => Self::Listening,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Statistics for one listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicUsize,
    /// Currently open connections.
    pub connections_active: AtomicUsize,
    /// Connections refused at the connection limit.
    pub connections_rejected: AtomicUsize,
    /// Requests read off the wire.
    pub requests_received: AtomicUsize,
    /// Requests refused by the rate limiter.
    pub requests_rate_limited: AtomicUsize,
    /// Framing, parse and I/O errors.
    pub errors: AtomicUsize,
}

impl ListenerStats {
    /// Get the number of connections accepted.
    #[must_use]
    pub fn connections_accepted(&self) -> usize {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    /// Get the number of open connections.
    #[must_use]
    pub fn connections_active(&self) -> usize {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Get the number of rejected connections.
    #[must_use]
    pub fn connections_rejected(&self) -> usize {
        self.connections_rejected.load(Ordering::Relaxed)
    }

    /// Get the number of requests received.
    #[must_use]
    pub fn requests_received(&self) -> usize {
        self.requests_received.load(Ordering::Relaxed)
    }

    /// Get the number of rate-limited requests.
    #[must_use]
    pub fn requests_rate_limited(&self) -> usize {
        self.requests_rate_limited.load(Ordering::Relaxed)
    }

    /// Get the number of errors.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Description of a running listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerInfo {
    /// Bound port; differs from the requested port when `0` was requested.
    pub port: u16,
    /// Transport served.
    pub protocol: ProtocolType,
    /// Bound socket address.
    pub local_addr: SocketAddr,
    /// State when the info was taken.
    pub state: ListenerState,
}

/// A bound listener, its accept loop and its connections.
pub(crate) struct ListenerHandle {
    port: u16,
    protocol: ProtocolType,
    local_addr: SocketAddr,
    state: Arc<AtomicU8>,
    stats: Arc<ListenerStats>,
    cancel_token: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("local_addr", &self.local_addr)
            .field("protocol", &self.protocol)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ListenerHandle {
    /// Binds `bind_address:port` for `protocol` and starts accepting.
    ///
    /// The socket is bound synchronously so callers can reserve a port while
    /// holding a registry entry. Must be called from within a Tokio runtime.
    pub(crate) fn bind(
        bind_address: &str,
        port: u16,
        protocol: ProtocolType,
        dispatcher: &ProtocolDispatcher,
        parent_token: &CancellationToken,
    ) -> Result<Self, TransportError> {
        if !protocol.is_built_in() {
            return Err(TransportError::Protocol(format!(
                "protocol '{protocol}' has no network transport"
            )));
        }

        let state = Arc::new(AtomicU8::new(ListenerState::Starting as u8));
        let std_listener = std::net::TcpListener::bind((bind_address, port))?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let handle = Self {
            port: local_addr.port(),
            protocol,
            local_addr,
            state,
            stats: Arc::new(ListenerStats::default()),
            cancel_token: parent_token.child_token(),
            tracker: TaskTracker::new(),
        };

        let semaphore = Arc::new(Semaphore::new(dispatcher.config().limits.max_connections.max(1)));
        handle.tracker.spawn(accept_loop(
            listener,
            handle.protocol.clone(),
            dispatcher.clone(),
            handle.cancel_token.clone(),
            semaphore,
            Arc::clone(&handle.stats),
            handle.tracker.clone(),
        ));
        handle.set_state(ListenerState::Listening);
        info!(protocol = %handle.protocol, addr = %local_addr, "Listener started");
        Ok(handle)
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) const fn port(&self) -> u16 {
        self.port
    }

    pub(crate) const fn protocol(&self) -> &ProtocolType {
        &self.protocol
    }

    pub(crate) fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    pub(crate) fn info(&self) -> ListenerInfo {
        ListenerInfo {
            port: self.port,
            protocol: self.protocol.clone(),
            local_addr: self.local_addr,
            state: self.state(),
        }
    }

    /// Stops accepting, cancels open connections and waits up to `drain` for them.
    pub(crate) async fn stop(&self, drain: Duration) {
        if self.state() == ListenerState::Stopped {
            return;
        }
        self.set_state(ListenerState::Stopping);
        self.cancel_token.cancel();
        self.tracker.close();
        if tokio::time::timeout(drain, self.tracker.wait()).await.is_err() {
            warn!(addr = %self.local_addr, "Listener connections did not drain in {} ms", drain.as_millis());
        }
        self.set_state(ListenerState::Stopped);
        info!(protocol = %self.protocol, addr = %self.local_addr, "Listener stopped");
    }
}

/// What a connection task needs from its listener.
pub(crate) struct ConnectionContext {
    pub(crate) conn_id: ConnectionId,
    pub(crate) protocol: ProtocolType,
    pub(crate) dispatcher: ProtocolDispatcher,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) stats: Arc<ListenerStats>,
    limiter: RateLimiter,
}

impl ConnectionContext {
    /// Decodes one request payload, applies the rate limit and dispatches it.
    ///
    /// The request's protocol type is stamped with this listener's transport.
    pub(crate) async fn respond(&mut self, payload: &[u8]) -> ProtocolResponse {
        self.stats.requests_received.fetch_add(1, Ordering::Relaxed);

        let request = match decode_request(payload, &self.protocol) {
            Ok(request) => request,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                debug!(conn_id = self.conn_id, error = %e, "Undecodable request");
                return ProtocolResponse::from_transport_error(request_id_hint(payload), &e);
            }
        };

        if let Err(e) = self.limiter.check() {
            self.stats.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
            trace!(conn_id = self.conn_id, request_id = %request.id, "Request rate limited");
            return ProtocolResponse::from_transport_error(request.id, &e);
        }

        let request = match &request.client_id {
            Some(_) => request,
            None => request.with_client_id(format!("{}-{}", self.protocol, self.conn_id)),
        };
        self.dispatcher.process_request(request).await
    }

    /// Registers the connection's push channel with the dispatcher.
    pub(crate) fn register_push(&self, sender: super::clients::PushSender) {
        self.dispatcher
            .clients()
            .register_connection(self.conn_id, self.protocol.clone(), sender);
    }

    /// Size of the push buffer for each connection.
    pub(crate) fn push_buffer_size(&self) -> usize {
        self.dispatcher.config().limits.push_buffer_size.max(1)
    }

    /// Largest accepted request payload.
    pub(crate) fn max_message_size(&self) -> usize {
        self.dispatcher.config().limits.max_message_size
    }

    /// Idle time after which a connection is closed.
    pub(crate) fn read_timeout(&self) -> Duration {
        self.dispatcher.config().read_timeout()
    }
}

impl Drop for ConnectionContext {
    fn drop(&mut self) {
        self.dispatcher.clients().unregister_connection(self.conn_id);
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        debug!(conn_id = self.conn_id, "Connection closed");
    }
}

fn request_id_hint(payload: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|json| json.get("id").and_then(serde_json::Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn decode_request(payload: &[u8], protocol: &ProtocolType) -> Result<ProtocolRequest, TransportError> {
    let mut json: serde_json::Value = serde_json::from_slice(payload)?;
    let Some(fields) = json.as_object_mut() else {
        return Err(TransportError::Serialization("request must be a JSON object".to_string()));
    };
    fields.insert(
        "protocolType".to_string(),
        serde_json::Value::String(protocol.name().to_string()),
    );
    serde_json::from_value(json).map_err(TransportError::from)
}

async fn accept_loop(
    listener: TcpListener,
    protocol: ProtocolType,
    dispatcher: ProtocolDispatcher,
    cancel_token: CancellationToken,
    semaphore: Arc<Semaphore>,
    stats: Arc<ListenerStats>,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                debug!(%protocol, "Listener received shutdown signal");
                break;
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                            warn!(%protocol, %peer, "Maximum concurrent connections reached, rejecting connection");
                            stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };

                        stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                        stats.connections_active.fetch_add(1, Ordering::Relaxed);
                        let context = ConnectionContext {
                            conn_id: dispatcher.clients().next_connection_id(),
                            protocol: protocol.clone(),
                            limiter: RateLimiter::new(&dispatcher.config().rate_limit),
                            dispatcher: dispatcher.clone(),
                            cancel_token: cancel_token.clone(),
                            stats: Arc::clone(&stats),
                        };
                        trace!(conn_id = context.conn_id, %peer, "Accepted connection");

                        tracker.spawn(async move {
                            serve(stream, context).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(%protocol, "Failed to accept connection: {}", e);
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

async fn serve(stream: TcpStream, context: ConnectionContext) {
    if let Err(e) = stream.set_nodelay(true) {
        trace!("Could not set TCP_NODELAY: {e}");
    }
    match context.protocol {
        ProtocolType::Binary => binary::serve_connection(stream, context).await,
        ProtocolType::Grpc => grpc::serve_connection(stream, context).await,
        ProtocolType::WebSocket => websocket::serve_connection(stream, context).await,
        ProtocolType::Custom(_) => {}
    }
}
