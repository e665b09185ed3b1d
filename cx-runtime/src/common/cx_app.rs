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

use std::sync::Arc;

use tracing::trace;

use crate::common::config::RuntimeConfig;
use crate::common::{ActorRuntime, RuntimeResult};
use crate::consciousness::NoopProcessor;
use crate::traits::ConsciousnessProcessor;

/// Entry point for launching a CX runtime.
///
/// ```rust,ignore
/// use cx_runtime::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let runtime = CxApp::launch_async(RuntimeConfig::load()).await?;
///     runtime.create_actor("basic", "npc-1", ActorConfig::new()).await?;
///     runtime.shutdown().await
/// }
/// ```
#[derive(Default, Debug, Clone)]
pub struct CxApp;

impl CxApp {
    /// Launches a runtime with the [`NoopProcessor`] and the core interpreters loaded.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when a core interpreter is rejected by the validator.
    pub async fn launch_async(config: RuntimeConfig) -> RuntimeResult<ActorRuntime> {
        Self::launch_with_processor(config, Arc::new(NoopProcessor)).await
    }

    /// Launches a runtime backed by `processor`.
    ///
    /// # Errors
    ///
    /// Fails when a core interpreter is rejected by the validator.
    pub async fn launch_with_processor(
        config: RuntimeConfig,
        processor: Arc<dyn ConsciousnessProcessor>,
    ) -> RuntimeResult<ActorRuntime> {
        trace!("Starting CX runtime initialization");
        trace!("Configuration: {:?}", config);

        let runtime = ActorRuntime::start(config, processor);
        runtime.interpreters().load_core_interpreters()?;

        trace!("CX runtime initialization complete");
        Ok(runtime)
    }
}
