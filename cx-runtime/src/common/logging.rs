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

//! Tracing subscriber setup for binaries embedding the runtime.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::common::config::TracingConfig;

/// Installs the global tracing subscriber described by `config`.
///
/// `RUST_LOG` overrides `config.level`. When `log_to_file` is set, output goes
/// through a non-blocking writer into `log_directory/file_name`; the returned
/// guard must be kept alive for buffered lines to be flushed.
///
/// # Errors
///
/// Fails when the log directory cannot be created, the filter does not parse,
/// or a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::NONE)
        .compact()
        .with_line_number(true)
        .with_target(true)
        .with_env_filter(filter);

    if config.log_to_file {
        std::fs::create_dir_all(&config.log_directory)?;
        let file_appender =
            RollingFileAppender::new(Rotation::NEVER, &config.log_directory, &config.file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        builder
            .with_ansi(false)
            .with_writer(non_blocking)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
        Ok(Some(guard))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
        Ok(None)
    }
}
