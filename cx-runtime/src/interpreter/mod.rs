//! Hot-swappable script interpreters.
//!
//! An [`InterpreterManager`] owns named slots, each holding one
//! [`InterpreterContainer`]. Scripts are [`CompiledScript`]s tagged with a
//! language version; the manager maps versions onto slots and runs the script
//! through whichever instance is installed when the lease is taken.

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
pub use container::{InterpreterContainer, InterpreterLease, LiveInterpreter};
pub use standard::{DebugInterpreter, StandardInterpreter, DEBUG_INTERPRETER, MAX_SCRIPT_STEPS, STANDARD_INTERPRETER};
pub use manager::{InterpreterManager, InterpreterMetrics, SwapOutcome};
pub use script::{
    CompileContext, CompiledScript, EmittedMessage, Instruction, JsonScriptCompiler, ScriptContext, ScriptOutcome,
};
pub use validator::DefaultInterpreterValidator;

// --- Submodules ---

/// Slot containers and reference-counted leases.
mod container;
/// The `cx-standard` and `cx-debug` interpreters.
mod standard;
/// The slot registry and swap protocol.
mod manager;
/// Compiled script representation and the JSON compiler.
mod script;
/// Default swap validation.
mod validator;
