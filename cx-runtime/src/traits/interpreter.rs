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

use crate::common::{RuntimeResult, Value};
use crate::interpreter::{CompileContext, CompiledScript, ScriptContext};

/// A script interpreter that can be loaded into a hot-swap slot.
///
/// Implementations are shared between threads and may be executing several
/// scripts at once while a replacement is installed. `dispose` is invoked
/// exactly once, after the last lease on the instance is released.
pub trait Interpreter: Send + Sync + 'static {
    /// Name of the interpreter (e.g. `cx-standard`).
    fn name(&self) -> &str;

    /// Version tag of this build.
    fn version(&self) -> &str;

    /// Prepares the instance before it becomes visible to readers.
    ///
    /// # Errors
    ///
    /// A failure aborts the swap that is installing this instance.
    fn initialize(&self) -> RuntimeResult<()> {
        Ok(())
    }

    /// Runs `script` against `context`, returning the script result.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Script`](crate::common::RuntimeError::Script) on any
    /// execution failure. Changes to `context` are discarded by the caller then.
    fn execute(&self, script: &CompiledScript, context: &mut ScriptContext) -> RuntimeResult<Value>;

    /// Releases resources held by the instance.
    fn dispose(&self) {}
}

/// Decides whether a swap candidate may be installed.
pub trait InterpreterValidator: Send + Sync + 'static {
    /// Returns the rejection reason, if any.
    ///
    /// # Errors
    ///
    /// A human-readable reason when the candidate is unfit.
    fn validate(&self, interpreter: &dyn Interpreter) -> Result<(), String>;
}

/// Turns script source into a [`CompiledScript`].
pub trait ScriptCompiler: Send + Sync {
    /// Compiles `source`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Script`](crate::common::RuntimeError::Script) when the
    /// source does not compile.
    fn compile(&self, source: &str, context: &CompileContext) -> RuntimeResult<CompiledScript>;
}
