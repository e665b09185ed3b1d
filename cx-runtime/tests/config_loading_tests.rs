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

#![allow(dead_code)]

use std::fs;

use tempfile::TempDir;

use cx_runtime::prelude::*;
use cx_runtime::protocol::ListenerSpec;

use crate::setup::{initialize_tracing, launch_with};

mod setup;

/// A complete file overrides every section it names and keeps defaults elsewhere.
#[tokio::test]
async fn test_load_from_explicit_file() -> anyhow::Result<()> {
    initialize_tracing();
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("cx.toml");
    fs::write(
        &path,
        r#"
        [runtime]
        default_namespace = "world"
        actor_inbox_capacity = 16

        [transactions]
        max_concurrent = 2

        [protocol]
        bind_address = "127.0.0.1"

        [protocol.rate_limit]
        enabled = false

        [[protocol.listeners]]
        port = 9100
        protocol = "websocket"

        [[protocol.listeners]]
        port = 9101
        protocol = "binary"
        "#,
    )?;

    let config = RuntimeConfig::load_from(&path);
    assert_eq!(config.runtime.default_namespace, "world");
    assert_eq!(config.runtime.actor_inbox_capacity, 16);
    assert_eq!(config.runtime.maintenance_interval_ms, 300_000);
    assert_eq!(config.transactions.max_concurrent, 2);
    assert!(!config.protocol.rate_limit.enabled);
    assert_eq!(
        config.protocol.listeners,
        vec![
            ListenerSpec {
                port: 9100,
                protocol: ProtocolType::WebSocket
            },
            ListenerSpec {
                port: 9101,
                protocol: ProtocolType::Binary
            },
        ]
    );

    let runtime = launch_with(config).await?;
    runtime.create_actor("basic", "citizen", ActorConfig::new()).await?;
    assert_eq!(runtime.get_actor_state("citizen")?.namespace, "world");
    runtime.shutdown().await?;
    Ok(())
}

/// Malformed files are logged and replaced by defaults.
#[tokio::test]
async fn test_malformed_file_uses_defaults() -> anyhow::Result<()> {
    initialize_tracing();
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "[runtime\ndefault_namespace = ")?;

    let config = RuntimeConfig::load_from(&path);
    assert_eq!(config.runtime.default_namespace, "default");
    assert_eq!(config.interpreters.default_version, "1.0");
    Ok(())
}

/// Configuration is discovered under `$XDG_CONFIG_HOME/cx/config.toml`.
#[tokio::test]
async fn test_xdg_directory_resolution() -> anyhow::Result<()> {
    initialize_tracing();
    let temp_dir = TempDir::new()?;
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let config = RuntimeConfig::load();
    assert_eq!(config.runtime.default_namespace, "default");

    let config_dir = temp_dir.path().join("cx");
    fs::create_dir_all(&config_dir)?;
    fs::write(
        config_dir.join("config.toml"),
        "[interpreters]\ndefault_version = \"latest\"\n",
    )?;

    let config = RuntimeConfig::load();
    assert_eq!(config.interpreters.default_version, "latest");
    Ok(())
}
