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

//! Request, response and error types shared by every transport.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{new_id, now_millis, RuntimeError, TimestampMs, Value};

/// Transport a request arrived on.
///
/// Serialized as a lowercase string (`"websocket"`, `"grpc"`, `"binary"`);
/// any other name is a custom protocol served by a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProtocolType {
    /// JSON over WebSocket text frames.
    WebSocket,
    /// gRPC length-prefixed messages over TCP.
    Grpc,
    /// Length-framed binary TCP.
    Binary,
    /// A protocol served by a custom handler.
    Custom(String),
}

impl ProtocolType {
    /// The transports built into the dispatcher.
    pub const BUILT_IN: [Self; 3] = [Self::WebSocket, Self::Grpc, Self::Binary];

    /// Returns `true` for WebSocket, gRPC and binary.
    #[must_use]
    pub const fn is_built_in(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Canonical name of the protocol.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::WebSocket => "websocket",
            Self::Grpc => "grpc",
            Self::Binary => "binary",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for ProtocolType {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Self::WebSocket,
            "grpc" => Self::Grpc,
            "binary" | "tcp" => Self::Binary,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for ProtocolType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<ProtocolType> for String {
    fn from(protocol: ProtocolType) -> Self {
        protocol.name().to_string()
    }
}

impl FromStr for ProtocolType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by listeners while framing, reading or writing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid frame, unsupported version or unexpected message type.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Socket or I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The connection exceeded its request budget.
    #[error("Rate limit exceeded, retry in {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before the next request.
        retry_after_ms: u64,
    },

    /// The port/protocol pair is already served.
    #[error("Address in use: {0}")]
    AddressInUse(String),

    /// A request or read did not finish in time.
    #[error("Timed out")]
    Timeout,
}

impl TransportError {
    /// Machine-readable error code carried in protocol responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::AddressInUse(_) => "ADDRESS_IN_USE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            std::io::ErrorKind::AddrInUse => Self::AddressInUse(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// A request decoded from any transport.
///
/// # Wire Format
///
/// ```json
/// {
///   "id": "req_01h9xz7n2e5p6q8r3t1u2v3w4x",
///   "protocolType": "websocket",
///   "command": "actor.get_state",
///   "data": { "actorId": "npc-1" },
///   "headers": {},
///   "timestamp": 1700000000000,
///   "clientId": "client-7"
/// }
/// ```
///
/// Only `protocolType` and `command` are required; a missing `id` is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRequest {
    /// Correlation id echoed in the response.
    #[serde(default = "new_request_id")]
    pub id: String,
    /// Transport the request arrived on, or a custom protocol name.
    pub protocol_type: ProtocolType,
    /// Command name, e.g. `actor.create`.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub data: Value,
    /// Free-form metadata.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Client-side send time in milliseconds.
    #[serde(default = "now_millis")]
    pub timestamp: TimestampMs,
    /// Identifier of the sending client, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

fn new_request_id() -> String {
    new_id("req")
}

impl ProtocolRequest {
    /// Creates a request with a generated `req_<uuidv7>` id.
    #[must_use]
    pub fn new(protocol_type: impl Into<ProtocolType>, command: impl Into<String>, data: Value) -> Self {
        Self {
            id: new_request_id(),
            protocol_type: protocol_type.into(),
            command: command.into(),
            data,
            headers: BTreeMap::new(),
            timestamp: now_millis(),
            client_id: None,
        }
    }

    /// Sets the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// The response to a [`ProtocolRequest`].
///
/// `id` always equals the request id. Successful responses carry `data`;
/// failures carry `errorMessage` and `errorCode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolResponse {
    /// Id of the request this answers.
    pub id: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Response metadata.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Server-side completion time in milliseconds.
    pub timestamp: TimestampMs,
    /// Time spent dispatching the request.
    #[serde(default)]
    pub processing_time_ms: u64,
}

impl ProtocolResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn success(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            data,
            error_message: None,
            error_code: None,
            headers: BTreeMap::new(),
            timestamp: now_millis(),
            processing_time_ms: 0,
        }
    }

    /// Creates a failed response with an explicit code.
    #[must_use]
    pub fn failure(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: Value::Null,
            error_message: Some(message.into()),
            error_code: Some(code.into()),
            headers: BTreeMap::new(),
            timestamp: now_millis(),
            processing_time_ms: 0,
        }
    }

    /// Creates a failed response from a [`RuntimeError`].
    #[must_use]
    pub fn from_error(id: impl Into<String>, err: &RuntimeError) -> Self {
        Self::failure(id, err.code(), err.to_string())
    }

    /// Creates a failed response from a [`TransportError`].
    #[must_use]
    pub fn from_transport_error(id: impl Into<String>, err: &TransportError) -> Self {
        Self::failure(id, err.code(), err.to_string())
    }

    /// Records how long the request took.
    #[must_use]
    pub const fn with_processing_time(mut self, processing_time_ms: u64) -> Self {
        self.processing_time_ms = processing_time_ms;
        self
    }
}

/// Server-initiated message fanned out by `broadcast_to_clients`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    /// Notification id (`push_<uuidv7>`).
    pub id: String,
    /// Transport the notification was broadcast on.
    pub protocol_type: ProtocolType,
    /// Broadcast payload.
    pub data: Value,
    /// Send time in milliseconds.
    pub timestamp: TimestampMs,
}

impl PushNotification {
    /// Creates a push notification with a generated id.
    #[must_use]
    pub fn new(protocol_type: ProtocolType, data: Value) -> Self {
        Self {
            id: new_id("push"),
            protocol_type,
            data,
            timestamp: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_type_names() {
        assert_eq!(ProtocolType::from("WebSocket"), ProtocolType::WebSocket);
        assert_eq!(ProtocolType::from("grpc"), ProtocolType::Grpc);
        assert_eq!(ProtocolType::from("mqtt"), ProtocolType::Custom("mqtt".to_string()));
        assert_eq!(ProtocolType::Binary.to_string(), "binary");
        assert!(!ProtocolType::from("mqtt").is_built_in());
    }

    #[test]
    fn test_request_defaults() {
        let request: ProtocolRequest =
            serde_json::from_str(r#"{"protocolType": "binary", "command": "system.ping"}"#).unwrap();
        assert!(request.id.starts_with("req_"));
        assert_eq!(request.protocol_type, ProtocolType::Binary);
        assert!(request.data.is_null());
        assert!(request.client_id.is_none());
    }

    #[test]
    fn test_response_camel_case() {
        let response = ProtocolResponse::failure("req_1", "NOT_FOUND", "Actor not found: a");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], "req_1");
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], "NOT_FOUND");
        assert_eq!(json["errorMessage"], "Actor not found: a");
        assert!(json.get("data").is_none());
        assert!(json.get("processingTimeMs").is_some());
    }

    #[test]
    fn test_response_from_runtime_error() {
        let err = RuntimeError::ProtocolRouting("mqtt".to_string());
        let response = ProtocolResponse::from_error("req_2", &err);
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("PROTOCOL_ROUTING"));
    }

    #[test]
    fn test_transport_error_codes() {
        let err = TransportError::RateLimited { retry_after_ms: 20 };
        assert_eq!(err.code(), "RATE_LIMITED");
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(TransportError::from(io), TransportError::ConnectionClosed);
    }
}
