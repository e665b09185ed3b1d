//! Protocol dispatcher and the WebSocket, gRPC and binary transports.
//!
//! # Key Re-exported Components:
//!
//! *   [`ProtocolDispatcher`]: routes requests to commands or custom handlers and owns listeners.
//! *   [`ProtocolRequest`] / [`ProtocolResponse`]: the JSON envelope shared by every transport.
//! *   [`CommandRegistry`]: command handlers served on the built-in transports.
//! *   [`ClientContract`]: generated description of a protocol's request envelope.
//!
//! The [`wire`] and [`grpc`] modules expose the framing helpers clients need
//! to talk to the binary and gRPC listeners.

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

// --- Public Re-exports ---
pub use clients::{ClientRegistry, ConnectionId, PushSender, PushStats};
pub use commands::{builtin_commands, CommandRegistry};
pub use config::{
    ListenerSpec, ProtocolConfig, ProtocolLimitsConfig, ProtocolTimeoutsConfig, RateLimitConfig, ShutdownConfig,
};
pub use contract::ClientContract;
pub use dispatcher::{ProtocolDispatcher, ProtocolMetrics};
pub use listener::{ListenerInfo, ListenerState, ListenerStats};
pub use rate_limiter::RateLimiter;
pub use types::{ProtocolRequest, ProtocolResponse, ProtocolType, PushNotification, TransportError};

// --- Submodules ---

/// Binary transport connection loop.
mod binary;
/// Connected-client registry for broadcasts.
mod clients;
/// Built-in command handlers.
mod commands;
/// Dispatcher and listener configuration.
mod config;
/// Client contract generation.
mod contract;
/// The protocol dispatcher.
mod dispatcher;
/// TCP listeners and per-connection context.
mod listener;
/// Token-bucket rate limiting.
mod rate_limiter;
/// Request, response and error types.
mod types;
/// WebSocket transport connection loop.
mod websocket;

/// gRPC length-prefixed message framing.
pub mod grpc;
/// Binary frame format.
pub mod wire;
