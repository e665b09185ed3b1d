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

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::protocol::ProtocolConfig;

/// Configuration for the CX runtime.
///
/// Loaded from TOML in XDG-compliant directories (`$XDG_CONFIG_HOME/cx/config.toml`).
/// Every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Actor runtime behavior.
    pub runtime: RuntimeSection,
    /// Transaction gate and timeouts.
    pub transactions: TransactionConfig,
    /// Interpreter selection.
    pub interpreters: InterpreterConfig,
    /// Protocol listeners and dispatch.
    pub protocol: ProtocolConfig,
    /// Tracing and logging output.
    pub tracing: TracingConfig,
}

/// Actor runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Namespace used when an actor config does not name one.
    pub default_namespace: String,
    /// Interval between inactive-actor sweeps, in milliseconds.
    pub maintenance_interval_ms: u64,
    /// Bounded capacity of each actor's inbox.
    pub actor_inbox_capacity: usize,
    /// Upper bound on how long shutdown waits for background tasks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

/// Transaction manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Number of transactions allowed in their apply phase at once.
    pub max_concurrent: usize,
    /// Timeout applied to transactions that do not carry their own.
    pub default_timeout_ms: u64,
}

/// Interpreter manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Language version used when a requested version cannot be resolved.
    pub default_version: String,
}

/// Tracing and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
    /// Whether to also write logs to a file.
    pub log_to_file: bool,
    /// Directory for log files.
    pub log_directory: String,
    /// Log file name inside `log_directory`.
    pub file_name: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
            maintenance_interval_ms: 300_000,
            actor_inbox_capacity: 255,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            default_timeout_ms: 30_000,
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            default_version: "1.0".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_directory: "logs".to_string(),
            file_name: "cx-runtime.log".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Interval between maintenance sweeps.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.maintenance_interval_ms)
    }

    /// Upper bound on shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.shutdown_timeout_ms)
    }

    /// Default transaction timeout.
    #[must_use]
    pub const fn default_transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transactions.default_timeout_ms)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the text is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Loads configuration from an explicit file, falling back to defaults.
    ///
    /// A missing or malformed file is logged and yields the default configuration.
    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(config_str) => match Self::from_toml_str(&config_str) {
                Ok(config) => {
                    info!("Successfully loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load configuration from XDG-compliant locations.
    ///
    /// Looks for `cx/config.toml` under `$XDG_CONFIG_HOME` (then `~/.config`).
    /// If no configuration file is found, returns the default configuration.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("cx") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            info!("Loading configuration from: {}", path.display());
            Self::load_from(&path)
        } else {
            info!("No configuration file found, using defaults");
            Self::default()
        }
    }
}
