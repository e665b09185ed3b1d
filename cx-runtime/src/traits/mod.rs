//! Extension points of the runtime.
//!
//! *   [`ActorBehavior`]: per-type actor logic built by the actor factory.
//! *   [`ConsciousnessProcessor`]: external scoring attached to actors.
//! *   [`Interpreter`], [`InterpreterValidator`], [`ScriptCompiler`]: the
//!     scripting seam behind the hot-swap interpreter manager.
//! *   [`ProtocolHandler`], [`CommandHandler`]: dispatcher routing targets.
//! *   [`TransactionTarget`]: the actor store transactions are applied to.

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
pub use actor_behavior::ActorBehavior;
pub use consciousness_processor::ConsciousnessProcessor;
pub use interpreter::{Interpreter, InterpreterValidator, ScriptCompiler};
pub use protocol_handler::{CommandHandler, ProtocolHandler};
pub use transaction_target::TransactionTarget;

// --- Submodules ---

/// Defines the [`ActorBehavior`] trait.
mod actor_behavior;
/// Defines the [`ConsciousnessProcessor`] trait.
mod consciousness_processor;
/// Defines the interpreter traits.
mod interpreter;
/// Defines the dispatcher handler traits.
mod protocol_handler;
/// Defines the [`TransactionTarget`] trait.
mod transaction_target;
