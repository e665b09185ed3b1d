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

//! Routes protocol requests to commands or custom handlers and owns the listeners.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::common::{now_millis, ActorRuntime, RuntimeError, TimestampMs, Value};
use crate::traits::{CommandHandler, ProtocolHandler};

use super::clients::ClientRegistry;
use super::commands::{register_builtins, CommandRegistry};
use super::contract::ClientContract;
use super::listener::{ListenerHandle, ListenerInfo, ListenerState};
use super::types::{ProtocolRequest, ProtocolResponse, ProtocolType, PushNotification, TransportError};
use super::ProtocolConfig;

/// Request statistics for one protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetrics {
    /// Protocol name.
    pub protocol: String,
    /// Requests dispatched.
    pub requests_total: u64,
    /// Requests answered with `success = false`.
    pub requests_failed: u64,
    /// Mean dispatch time.
    pub average_response_micros: u64,
    /// Connections open right now.
    pub active_connections: usize,
    /// Connections accepted by this protocol's listeners.
    pub connections_accepted: usize,
    /// Requests refused by per-connection rate limiting.
    pub requests_rate_limited: usize,
    /// When the last request finished.
    pub last_request_at: Option<TimestampMs>,
}

#[derive(Debug, Default)]
struct ProtocolCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
    last_request_at: AtomicU64,
}

impl ProtocolCounters {
    fn record(&self, success: bool, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.last_request_at.store(now_millis(), Ordering::Relaxed);
    }
}

struct DispatcherInner {
    config: ProtocolConfig,
    runtime: ActorRuntime,
    commands: CommandRegistry,
    handlers: DashMap<String, Arc<dyn ProtocolHandler>>,
    contracts: DashMap<String, ClientContract>,
    listeners: DashMap<(u16, ProtocolType), Arc<ListenerHandle>>,
    clients: ClientRegistry,
    metrics: DashMap<String, Arc<ProtocolCounters>>,
    cancel_token: CancellationToken,
}

/// Front door for every transport.
///
/// Requests on the built-in transports (WebSocket, gRPC, binary) are routed by
/// command name through the [`CommandRegistry`]; requests under any other
/// protocol name go to the custom [`ProtocolHandler`] registered for it.
/// [`process_request`](Self::process_request) never fails: routing errors,
/// handler errors, timeouts and panics all become `success = false`
/// responses carrying the request id.
///
/// Cloning is cheap. Listener connections are cancelled when the runtime
/// shuts down.
#[derive(Clone)]
pub struct ProtocolDispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for ProtocolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolDispatcher")
            .field("listeners", &self.inner.listeners.len())
            .field("handlers", &self.inner.handlers.len())
            .field("commands", &self.inner.commands.names().len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

impl ProtocolDispatcher {
    /// Creates a dispatcher over `runtime` with the built-in commands registered.
    #[must_use]
    pub fn new(runtime: ActorRuntime, config: ProtocolConfig) -> Self {
        let commands = CommandRegistry::new();
        register_builtins(&commands, &runtime, config.request_timeout());
        let cancel_token = runtime.0.cancellation_token().child_token();
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                runtime,
                commands,
                handlers: DashMap::new(),
                contracts: DashMap::new(),
                listeners: DashMap::new(),
                clients: ClientRegistry::new(),
                metrics: DashMap::new(),
                cancel_token,
            }),
        }
    }

    /// Dispatcher configuration.
    #[must_use]
    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    /// The runtime requests are executed against.
    #[must_use]
    pub fn runtime(&self) -> &ActorRuntime {
        &self.inner.runtime
    }

    /// Connected clients.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.clients
    }

    /// Command registry used by the built-in transports.
    #[must_use]
    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    /// Registers a handler for a custom protocol whose requests carry `T`.
    ///
    /// Returns `false` when `name` is blank, names a built-in transport, or
    /// already has a handler. On success a [`ClientContract`] is generated.
    pub fn register_protocol_handler<T: ?Sized>(&self, name: impl Into<String>, handler: Arc<dyn ProtocolHandler>) -> bool {
        let name = name.into();
        if name.trim().is_empty() || ProtocolType::from(name.as_str()).is_built_in() {
            warn!(protocol = %name, "Refusing to register handler for reserved protocol name");
            return false;
        }
        match self.inner.handlers.entry(name.clone()) {
            Entry::Occupied(_) => {
                debug!(protocol = %name, "Protocol handler already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
                self.inner
                    .contracts
                    .insert(name.clone(), ClientContract::generate::<T>(name.clone(), Vec::new()));
                info!(protocol = %name, "Registered protocol handler");
                true
            }
        }
    }

    /// Registers a command served on the built-in transports.
    pub fn register_command(&self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> bool {
        self.inner.commands.register(name, handler)
    }

    /// Contract for `protocol`: generated at registration for custom handlers,
    /// built on demand for the built-in transports.
    #[must_use]
    pub fn client_contract(&self, protocol: &str) -> Option<ClientContract> {
        if ProtocolType::from(protocol).is_built_in() {
            return Some(ClientContract::generate::<ProtocolRequest>(
                ProtocolType::from(protocol).name(),
                self.inner.commands.names(),
            ));
        }
        self.inner.contracts.get(protocol).map(|entry| entry.value().clone())
    }

    /// Handles one request and always produces a response with the request's id.
    #[instrument(skip(self, request), fields(request_id = %request.id, protocol = %request.protocol_type, command = %request.command))]
    pub async fn process_request(&self, request: ProtocolRequest) -> ProtocolResponse {
        let started = Instant::now();
        let id = request.id.clone();
        let protocol = request.protocol_type.name().to_string();

        let routed = AssertUnwindSafe(self.route(request)).catch_unwind();
        let mut response = match tokio::time::timeout(self.inner.config.request_timeout(), routed).await {
            Ok(Ok(response)) => response,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "Request handler panicked");
                ProtocolResponse::failure(id.as_str(), "HANDLER_PANIC", message)
            }
            Err(_) => {
                warn!("Request timed out");
                ProtocolResponse::from_transport_error(id.as_str(), &TransportError::Timeout)
            }
        };
        response.id = id;

        let elapsed = started.elapsed();
        self.counters(&protocol).record(response.success, elapsed);
        response.with_processing_time(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    async fn route(&self, request: ProtocolRequest) -> ProtocolResponse {
        if request.protocol_type.is_built_in() {
            return match self.inner.commands.dispatch(&request).await {
                Ok(data) => ProtocolResponse::success(request.id, data),
                Err(e) => {
                    debug!(error = %e, "Command failed");
                    ProtocolResponse::from_error(request.id, &e)
                }
            };
        }

        let handler = self
            .inner
            .handlers
            .get(request.protocol_type.name())
            .map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => handler.handle(request).await,
            None => {
                let err = RuntimeError::ProtocolRouting(format!(
                    "no handler registered for protocol '{}'",
                    request.protocol_type
                ));
                warn!(error = %err, "Unroutable request");
                ProtocolResponse::from_error(request.id, &err)
            }
        }
    }

    fn counters(&self, protocol: &str) -> Arc<ProtocolCounters> {
        if let Some(counters) = self.inner.metrics.get(protocol) {
            return Arc::clone(counters.value());
        }
        Arc::clone(self.inner.metrics.entry(protocol.to_string()).or_default().value())
    }

    /// Starts a listener for `protocol` on `port` (`0` picks a free port).
    ///
    /// # Errors
    ///
    /// [`TransportError::AddressInUse`] when this dispatcher already serves the
    /// pair or the OS refuses the bind; [`TransportError::Protocol`] for custom
    /// protocols, which have no network transport.
    pub fn start_listening(&self, port: u16, protocol: ProtocolType) -> Result<ListenerInfo, TransportError> {
        if self.inner.cancel_token.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let bind_address = self.inner.config.bind_address.as_str();

        if port == 0 {
            let handle = ListenerHandle::bind(bind_address, 0, protocol, self, &self.inner.cancel_token)?;
            let info = handle.info();
            self.inner
                .listeners
                .insert((handle.port(), handle.protocol().clone()), Arc::new(handle));
            return Ok(info);
        }

        match self.inner.listeners.entry((port, protocol.clone())) {
            Entry::Occupied(_) => Err(TransportError::AddressInUse(format!(
                "{protocol} listener already running on port {port}"
            ))),
            Entry::Vacant(slot) => {
                let handle = ListenerHandle::bind(bind_address, port, protocol, self, &self.inner.cancel_token)?;
                let info = handle.info();
                slot.insert(Arc::new(handle));
                Ok(info)
            }
        }
    }

    /// Stops the listener serving `protocol` on `port`. Returns `false` if none was running.
    pub async fn stop_listener(&self, port: u16, protocol: &ProtocolType) -> bool {
        let Some((_, handle)) = self.inner.listeners.remove(&(port, protocol.clone())) else {
            return false;
        };
        handle.stop(self.inner.config.drain_timeout()).await;
        true
    }

    /// Stops every listener and waits for their connections to drain.
    pub async fn stop_listening(&self) {
        let keys: Vec<(u16, ProtocolType)> = self.inner.listeners.iter().map(|entry| entry.key().clone()).collect();
        let handles: Vec<Arc<ListenerHandle>> = keys
            .iter()
            .filter_map(|key| self.inner.listeners.remove(key).map(|(_, handle)| handle))
            .collect();
        if handles.is_empty() {
            return;
        }
        let drain = self.inner.config.drain_timeout();
        join_all(handles.iter().map(|handle| handle.stop(drain))).await;
        info!(count = handles.len(), "All listeners stopped");
    }

    /// Running listeners, sorted by port.
    #[must_use]
    pub fn listeners(&self) -> Vec<ListenerInfo> {
        let mut listeners: Vec<ListenerInfo> = self.inner.listeners.iter().map(|entry| entry.value().info()).collect();
        listeners.sort_by(|a, b| a.port.cmp(&b.port).then_with(|| a.protocol.cmp(&b.protocol)));
        listeners
    }

    /// Pushes `data` to every connected client of `protocol`. Returns how many accepted it.
    pub fn broadcast_to_clients(&self, protocol: &ProtocolType, data: Value) -> usize {
        let push = PushNotification::new(protocol.clone(), data);
        let delivered = self.inner.clients.broadcast(protocol, &push);
        debug!(%protocol, delivered, "Broadcast sent");
        delivered
    }

    /// Protocols with a listening listener plus custom handler names, sorted.
    #[must_use]
    pub fn active_protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self
            .inner
            .listeners
            .iter()
            .filter(|entry| entry.value().state() == ListenerState::Listening)
            .map(|entry| entry.key().1.name().to_string())
            .chain(self.inner.handlers.iter().map(|entry| entry.key().clone()))
            .collect();
        protocols.sort();
        protocols.dedup();
        protocols
    }

    /// Request statistics for `protocol`, or `None` if it has neither served a
    /// request nor is currently active.
    #[must_use]
    pub fn protocol_metrics(&self, protocol: &str) -> Option<ProtocolMetrics> {
        let protocol_type = ProtocolType::from(protocol);
        let name = protocol_type.name().to_string();
        let counters = self.inner.metrics.get(&name).map(|entry| Arc::clone(entry.value()));
        if counters.is_none() && !self.active_protocols().contains(&name) {
            return None;
        }
        let counters = counters.unwrap_or_default();

        let (mut connections_accepted, mut requests_rate_limited) = (0, 0);
        for entry in self.inner.listeners.iter().filter(|entry| entry.key().1 == protocol_type) {
            connections_accepted += entry.value().stats().connections_accepted();
            requests_rate_limited += entry.value().stats().requests_rate_limited();
        }

        let requests_total = counters.requests.load(Ordering::Relaxed);
        let last_request_at = counters.last_request_at.load(Ordering::Relaxed);
        Some(ProtocolMetrics {
            protocol: name,
            requests_total,
            requests_failed: counters.failures.load(Ordering::Relaxed),
            average_response_micros: counters
                .total_micros
                .load(Ordering::Relaxed)
                .checked_div(requests_total)
                .unwrap_or(0),
            active_connections: self.inner.clients.connection_count(&protocol_type),
            connections_accepted,
            requests_rate_limited,
            last_request_at: (last_request_at > 0).then_some(last_request_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::common::{config::RuntimeConfig, CxApp};

    struct Upper;

    #[async_trait]
    impl ProtocolHandler for Upper {
        async fn handle(&self, request: ProtocolRequest) -> ProtocolResponse {
            let text = request.data.as_str().unwrap_or_default().to_uppercase();
            ProtocolResponse::success("ignored", Value::String(text))
        }
    }

    struct Panics;

    #[async_trait]
    impl ProtocolHandler for Panics {
        async fn handle(&self, _request: ProtocolRequest) -> ProtocolResponse {
            panic!("boom")
        }
    }

    struct Sleeps;

    #[async_trait]
    impl ProtocolHandler for Sleeps {
        async fn handle(&self, request: ProtocolRequest) -> ProtocolResponse {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ProtocolResponse::success(request.id, Value::Null)
        }
    }

    async fn dispatcher(config: ProtocolConfig) -> ProtocolDispatcher {
        let runtime = CxApp::launch_async(RuntimeConfig::default()).await.unwrap();
        ProtocolDispatcher::new(runtime, config)
    }

    #[tokio::test]
    async fn test_unknown_protocol_keeps_request_id() {
        let dispatcher = dispatcher(ProtocolConfig::default()).await;
        let request = ProtocolRequest::new("carrier-pigeon", "actor.list", Value::Null);
        let id = request.id.clone();

        let response = dispatcher.process_request(request).await;
        assert!(!response.success);
        assert_eq!(response.id, id);
        assert_eq!(response.error_code.as_deref(), Some("PROTOCOL_ROUTING"));
        assert!(response.error_message.is_some_and(|m| !m.is_empty()));
    }

    #[tokio::test]
    async fn test_custom_handler_routing_and_contract() {
        let dispatcher = dispatcher(ProtocolConfig::default()).await;
        assert!(dispatcher.register_protocol_handler::<String>("shout", Arc::new(Upper)));
        assert!(!dispatcher.register_protocol_handler::<String>("shout", Arc::new(Upper)));
        assert!(!dispatcher.register_protocol_handler::<String>("websocket", Arc::new(Upper)));

        let request = ProtocolRequest::new("shout", "say", Value::from("hi"));
        let id = request.id.clone();
        let response = dispatcher.process_request(request).await;
        assert!(response.success);
        assert_eq!(response.id, id);
        assert_eq!(response.data, Value::from("HI"));

        let contract = dispatcher.client_contract("shout").unwrap();
        assert_eq!(contract.request_type, "alloc::string::String");
        assert_eq!(dispatcher.active_protocols(), vec!["shout".to_string()]);
        assert_eq!(dispatcher.protocol_metrics("shout").unwrap().requests_total, 1);
    }

    #[tokio::test]
    async fn test_builtin_commands_over_dispatcher() {
        let dispatcher = dispatcher(ProtocolConfig::default()).await;
        let response = dispatcher
            .process_request(ProtocolRequest::new(ProtocolType::WebSocket, "system.ping", Value::Null))
            .await;
        assert!(response.success);
        assert_eq!(response.data.get("pong"), Some(&Value::Bool(true)));

        let response = dispatcher
            .process_request(ProtocolRequest::new(ProtocolType::Grpc, "actor.get_state", Value::from(serde_json::json!({"actorId": "ghost"}))))
            .await;
        assert_eq!(response.error_code.as_deref(), Some("NOT_FOUND"));

        let metrics = dispatcher.protocol_metrics("grpc").unwrap();
        assert_eq!(metrics.requests_failed, 1);
        assert!(dispatcher.protocol_metrics("binary").is_none());
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_failure() {
        let dispatcher = dispatcher(ProtocolConfig::default()).await;
        dispatcher.register_protocol_handler::<Value>("fragile", Arc::new(Panics));

        let request = ProtocolRequest::new("fragile", "anything", Value::Null);
        let id = request.id.clone();
        let response = dispatcher.process_request(request).await;
        assert!(!response.success);
        assert_eq!(response.id, id);
        assert_eq!(response.error_code.as_deref(), Some("HANDLER_PANIC"));
        assert_eq!(response.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mut config = ProtocolConfig::default();
        config.timeouts.request = 50;
        let dispatcher = dispatcher(config).await;
        dispatcher.register_protocol_handler::<Value>("slow", Arc::new(Sleeps));

        let response = dispatcher
            .process_request(ProtocolRequest::new("slow", "wait", Value::Null))
            .await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("TIMEOUT"));
    }

    #[tokio::test]
    async fn test_duplicate_listener_rejected() {
        let dispatcher = dispatcher(ProtocolConfig::default()).await;
        let info = dispatcher.start_listening(0, ProtocolType::Binary).unwrap();
        assert_eq!(info.state, ListenerState::Listening);

        let err = dispatcher.start_listening(info.port, ProtocolType::Binary).unwrap_err();
        assert_eq!(err.code(), "ADDRESS_IN_USE");
        assert!(dispatcher.start_listening(0, ProtocolType::Custom("mqtt".to_string())).is_err());
        assert_eq!(dispatcher.active_protocols(), vec!["binary".to_string()]);

        assert!(dispatcher.stop_listener(info.port, &ProtocolType::Binary).await);
        assert!(!dispatcher.stop_listener(info.port, &ProtocolType::Binary).await);
        assert!(dispatcher.listeners().is_empty());
    }
}
