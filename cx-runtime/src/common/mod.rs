//! Shared types, configuration and the runtime handle.
//!
//! # Key Re-exported Components:
//!
//! *   [`CxApp`]: launches a runtime from a [`RuntimeConfig`](config::RuntimeConfig).
//! *   [`ActorRuntime`]: the cloneable handle for creating, messaging and destroying actors.
//! *   [`Value`]: the dynamic payload type carried by messages and protocol bodies.
//! *   [`RuntimeError`]: the error taxonomy with stable machine codes.

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
pub use actor_runtime::{ActorRuntime, SCRIPT_SENDER};
pub use cx_app::CxApp;
pub use error::{RuntimeError, RuntimeResult};
pub use metrics::RuntimeMetrics;
pub use types::*;
pub use value::{Value, ValueMap};

// --- Submodules ---

/// Defines the `ActorRuntime` handle and its background loops.
mod actor_runtime;
/// Defines the `CxApp` entry point.
mod cx_app;
/// Defines the error taxonomy.
mod error;
/// Defines identifiers and timestamps.
mod types;
/// Defines the `Value` payload type.
mod value;
/// Defines the shared state behind the runtime handle.
mod runtime_inner;

/// Configuration loaded from XDG-compliant locations.
pub mod config;
/// Tracing subscriber setup.
pub mod logging;
/// Runtime counters and metrics snapshots.
pub mod metrics;
