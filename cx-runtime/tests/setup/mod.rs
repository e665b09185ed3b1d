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
use std::sync::{Arc, Once};
use std::time::Duration;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cx_runtime::common::config::RuntimeConfig;
use cx_runtime::common::{ActorRuntime, CxApp};
use cx_runtime::traits::ConsciousnessProcessor;

// Declare the submodules.
pub mod actors;
pub mod processors;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Output goes to `logs/runtime_tests.txt` so parallel tests do not interleave
/// on stdout. `RUST_LOG` overrides the default `trace` filter.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "runtime_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("trace")
                .add_directive("cx_runtime=trace".parse().unwrap())
                .add_directive("tokio=info".parse().unwrap())
                .add_directive("tungstenite=info".parse().unwrap())
        });

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

/// Launches a runtime with default configuration and tracing installed.
pub async fn launch() -> anyhow::Result<ActorRuntime> {
    launch_with(RuntimeConfig::default()).await
}

/// Launches a runtime with `config` and tracing installed.
pub async fn launch_with(config: RuntimeConfig) -> anyhow::Result<ActorRuntime> {
    initialize_tracing();
    Ok(CxApp::launch_async(config).await?)
}

/// Launches a runtime with `config` and a custom consciousness processor.
pub async fn launch_with_processor(
    config: RuntimeConfig,
    processor: Arc<dyn ConsciousnessProcessor>,
) -> anyhow::Result<ActorRuntime> {
    initialize_tracing();
    Ok(CxApp::launch_with_processor(config, processor).await?)
}

/// Polls `condition` every 10ms for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
