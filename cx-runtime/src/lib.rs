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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # CX Runtime
//!
//! An asynchronous actor runtime built on Tokio. It hosts stateful actors,
//! applies multi-operation transactions with compensating rollback, swaps
//! script interpreters while scripts keep running, and exposes everything to
//! external clients through a protocol dispatcher.
//!
//! ## Key Concepts
//!
//! - **Runtime (`ActorRuntime`)**: A cloneable handle over the actor map,
//!   namespaces, the FIFO delivery loop and the maintenance sweep.
//! - **Actors (`ManagedActor`)**: Per-actor tasks draining a bounded inbox into
//!   an `ActorBehavior` built by the `ActorFactory`.
//! - **Transactions**: Validated as a whole, applied under a concurrency gate,
//!   rolled back in reverse on failure or timeout.
//! - **Interpreters (`InterpreterManager`)**: Versioned slots swapped
//!   atomically; an outgoing interpreter is disposed when its last lease drops.
//! - **Dispatcher (`ProtocolDispatcher`)**: Routes JSON requests from
//!   WebSocket, gRPC-framed and binary listeners to commands, and custom
//!   protocol names to registered handlers.
//! - **Consciousness**: An optional processor scoring actors as their state,
//!   scene and AI responses change.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cx_runtime::prelude::*;
//!
//! let runtime = CxApp::launch_async(RuntimeConfig::default()).await?;
//! runtime.create_actor("basic", "npc-1", ActorConfig::new()).await?;
//! runtime.send_message("player", "npc-1", Value::from("hello"))?;
//! runtime.shutdown().await?;
//! ```

/// Runtime handle, configuration, errors and shared value types.
pub mod common;

/// Actor state, behaviors, the factory and per-actor tasks.
pub mod actor;

/// Consciousness processors and their events.
pub mod consciousness;

/// Compiled scripts, interpreters and the hot-swap manager.
pub mod interpreter;

/// Runtime messages and the delivery queue.
pub mod message;

/// Protocol dispatcher, listeners and wire formats.
pub mod protocol;

/// Extension traits implemented by behaviors, processors, interpreters and handlers.
pub mod traits;

/// Multi-operation transactions.
pub mod transaction;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html): The macro for implementing the async extension traits.
///
/// ## Core Types
/// *   [`crate::common::CxApp`]: Entry point for launching a runtime.
/// *   [`crate::common::ActorRuntime`]: Handle on a running runtime.
/// *   [`crate::common::config::RuntimeConfig`]: Runtime configuration.
/// *   [`crate::common::Value`]: Dynamic payload type.
/// *   [`crate::actor::ActorConfig`] / [`crate::actor::StateUpdate`]: Actor creation and mutation descriptors.
/// *   [`crate::transaction::Transaction`]: Multi-operation transactions.
/// *   [`crate::protocol::ProtocolDispatcher`]: Protocol front door.
pub mod prelude {
    // External crate re-exports
    pub use async_trait::async_trait;

    // Core types
    pub use crate::actor::{ActorConfig, ActorContext, ActorFactory, ActorInfo, ActorSnapshot, StateUpdate};
    pub use crate::common::config::RuntimeConfig;
    pub use crate::common::{ActorRuntime, CxApp, RuntimeError, RuntimeMetrics, RuntimeResult, Value, ValueMap};
    pub use crate::consciousness::{ConsciousnessEvent, SceneUpdate};
    pub use crate::interpreter::{CompiledScript, Instruction, InterpreterManager, JsonScriptCompiler};
    pub use crate::message::Message;
    pub use crate::protocol::{
        ProtocolConfig, ProtocolDispatcher, ProtocolRequest, ProtocolResponse, ProtocolType, TransportError,
    };
    pub use crate::traits::{
        ActorBehavior, CommandHandler, ConsciousnessProcessor, Interpreter, ProtocolHandler, ScriptCompiler,
    };
    pub use crate::transaction::{Transaction, TransactionOperation, TransactionReceipt};
}
