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

//! Listener, limit and timeout settings for the protocol dispatcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolType;

/// Configuration for the protocol dispatcher and its listeners.
///
/// Lives under the `[protocol]` table of the runtime configuration file.
///
/// # Example Configuration
///
/// ```toml
/// [protocol]
/// bind_address = "127.0.0.1"
///
/// [protocol.limits]
/// max_connections = 100
/// max_message_size = 1048576  # 1 MiB
///
/// [protocol.rate_limit]
/// enabled = true
/// requests_per_second = 100
/// burst_size = 50
///
/// [protocol.timeouts]
/// request_timeout_ms = 30000
///
/// [[protocol.listeners]]
/// port = 9100
/// protocol = "websocket"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Address listeners bind to.
    pub bind_address: String,
    /// Connection and message limits.
    pub limits: ProtocolLimitsConfig,
    /// Per-connection rate limiting.
    pub rate_limit: RateLimitConfig,
    /// Request and connection timeouts.
    pub timeouts: ProtocolTimeoutsConfig,
    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
    /// Listeners started by the `cxd` binary at boot.
    pub listeners: Vec<ListenerSpec>,
}

/// One configured listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    /// TCP port. `0` asks the OS for a free port.
    pub port: u16,
    /// Transport served on the port.
    pub protocol: ProtocolType,
}

/// Limits for listener connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolLimitsConfig {
    /// Maximum concurrent connections per listener.
    pub max_connections: usize,

    /// Maximum frame payload size in bytes.
    pub max_message_size: usize,

    /// Buffer size for broadcast pushes per connection.
    ///
    /// Pushes to a client whose buffer is full are dropped.
    pub push_buffer_size: usize,
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimeoutsConfig {
    /// Upper bound on one dispatched request.
    #[serde(rename = "request_timeout_ms")]
    pub request: u64,

    /// Idle read timeout on a connection.
    #[serde(rename = "read_timeout_ms")]
    pub read: u64,
}

/// Token-bucket rate limiting per connection.
///
/// Tokens are replenished at `requests_per_second` up to `burst_size`.
/// Each request consumes one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled.
    pub enabled: bool,
    /// Sustained refill rate.
    pub requests_per_second: u32,
    /// Bucket capacity.
    pub burst_size: u32,
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long `stop_listening` waits for connection tasks to drain, in milliseconds.
    #[serde(rename = "drain_timeout_ms")]
    pub drain_timeout: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            limits: ProtocolLimitsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeouts: ProtocolTimeoutsConfig::default(),
            shutdown: ShutdownConfig::default(),
            listeners: Vec::new(),
        }
    }
}

impl Default for ProtocolLimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_message_size: 1_048_576, // 1 MiB
            push_buffer_size: 100,
        }
    }
}

impl Default for ProtocolTimeoutsConfig {
    fn default() -> Self {
        Self {
            request: 30_000,
            read: 300_000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100,
            burst_size: 50,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout: 5_000 }
    }
}

impl ProtocolConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request)
    }

    /// Idle read timeout as a `Duration`.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.read)
    }

    /// Drain timeout as a `Duration`.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.drain_timeout)
    }

    /// Check if rate limiting is enabled.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        self.rate_limit.enabled
    }
}
