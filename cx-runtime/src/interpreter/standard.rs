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

//! The interpreters shipped with the runtime.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::common::{RuntimeError, RuntimeResult, Value};
use crate::interpreter::{CompiledScript, EmittedMessage, Instruction, ScriptContext};
use crate::traits::Interpreter;

/// Slot name of the production interpreter.
pub const STANDARD_INTERPRETER: &str = "cx-standard";

/// Slot name of the tracing interpreter.
pub const DEBUG_INTERPRETER: &str = "cx-debug";

/// Upper bound on instructions per script.
pub const MAX_SCRIPT_STEPS: usize = 10_000;

fn add(current: Option<&Value>, by: &Value, key: &str) -> RuntimeResult<Value> {
    let current = current.cloned().unwrap_or(Value::Int(0));
    match (&current, by) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::Script(format!("increment of '{key}' overflows"))),
        _ => match (current.as_f64(), by.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => Err(RuntimeError::Script(format!(
                "cannot increment '{key}' ({}) by {}",
                current.kind(),
                by.kind()
            ))),
        },
    }
}

/// Executes `script` against `context`, calling `observe` before each instruction.
pub(crate) fn run_instructions(
    script: &CompiledScript,
    context: &mut ScriptContext,
    mut observe: impl FnMut(usize, &Instruction),
) -> RuntimeResult<Value> {
    if script.instructions.len() > MAX_SCRIPT_STEPS {
        return Err(RuntimeError::Script(format!(
            "script has {} instructions, limit is {MAX_SCRIPT_STEPS}",
            script.instructions.len()
        )));
    }

    for (index, instruction) in script.instructions.iter().enumerate() {
        observe(index, instruction);
        context.steps += 1;
        match instruction {
            Instruction::Set { key, value } => {
                context.properties.insert(key.clone(), value.clone());
            }
            Instruction::Remove { key } => {
                context.properties.remove(key);
            }
            Instruction::Increment { key, by } => {
                let next = add(context.properties.get(key), by, key)?;
                context.properties.insert(key.clone(), next);
            }
            Instruction::Send { to, payload } => {
                if to.trim().is_empty() {
                    return Err(RuntimeError::Script(format!("instruction {index}: send target is empty")));
                }
                context.emitted.push(EmittedMessage {
                    to: to.clone(),
                    payload: payload.clone(),
                });
            }
            Instruction::Log { message } => context.log.push(message.clone()),
            Instruction::Return { value } => return Ok(value.clone()),
        }
    }
    Ok(Value::Null)
}

/// The production interpreter.
#[derive(Debug)]
pub struct StandardInterpreter {
    version: String,
    executions: AtomicU64,
}

impl StandardInterpreter {
    /// Creates an instance reporting `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            executions: AtomicU64::new(0),
        }
    }

    /// Scripts this instance has run.
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }
}

impl Interpreter for StandardInterpreter {
    fn name(&self) -> &str {
        STANDARD_INTERPRETER
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn execute(&self, script: &CompiledScript, context: &mut ScriptContext) -> RuntimeResult<Value> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        run_instructions(script, context, |_, _| {})
    }

    fn dispose(&self) {
        info!(version = %self.version, executions = self.executions(), "Disposed cx-standard interpreter");
    }
}

/// Interpreter that logs every instruction and records a trace line per step.
#[derive(Debug)]
pub struct DebugInterpreter {
    version: String,
    traced_steps: AtomicU64,
}

impl DebugInterpreter {
    /// Creates an instance reporting `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            traced_steps: AtomicU64::new(0),
        }
    }

    /// Instructions traced so far.
    #[must_use]
    pub fn traced_steps(&self) -> u64 {
        self.traced_steps.load(Ordering::Relaxed)
    }
}

impl Interpreter for DebugInterpreter {
    fn name(&self) -> &str {
        DEBUG_INTERPRETER
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn execute(&self, script: &CompiledScript, context: &mut ScriptContext) -> RuntimeResult<Value> {
        let mut trace = Vec::new();
        let result = run_instructions(script, context, |index, instruction| {
            debug!(index, ?instruction, "cx-debug step");
            trace.push(format!("[{index}] {instruction:?}"));
        });
        self.traced_steps.fetch_add(trace.len() as u64, Ordering::Relaxed);
        context.log.extend(trace);
        result
    }
}
