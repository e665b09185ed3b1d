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

//! `cxd`: boots a CX runtime and serves the configured listeners until Ctrl-C.
//!
//! Usage: `cxd [CONFIG_PATH]`. Without a path, configuration is read from
//! `$XDG_CONFIG_HOME/cx/config.toml`.

use std::path::PathBuf;

use anyhow::Context;
use cx_runtime::common::config::RuntimeConfig;
use cx_runtime::common::logging::init_tracing;
use cx_runtime::common::CxApp;
use cx_runtime::protocol::ProtocolDispatcher;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => RuntimeConfig::load_from(&path),
        None => RuntimeConfig::load(),
    };
    let _guard = init_tracing(&config.tracing)?;

    let runtime = CxApp::launch_async(config.clone())
        .await
        .context("failed to launch runtime")?;
    let dispatcher = ProtocolDispatcher::new(runtime.clone(), config.protocol.clone());

    for spec in &config.protocol.listeners {
        match dispatcher.start_listening(spec.port, spec.protocol.clone()) {
            Ok(listener) => info!(protocol = %listener.protocol, addr = %listener.local_addr, "Serving"),
            Err(e) => error!(protocol = %spec.protocol, port = spec.port, "Failed to start listener: {e}"),
        }
    }
    if dispatcher.listeners().is_empty() {
        info!("No listeners running; the runtime is reachable in-process only");
    }

    tokio::signal::ctrl_c().await.context("failed to wait for Ctrl-C")?;
    info!("Shutdown requested");

    dispatcher.stop_listening().await;
    runtime.shutdown().await?;
    info!("cxd stopped");
    Ok(())
}
