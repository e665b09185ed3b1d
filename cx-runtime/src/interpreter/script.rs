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

//! Compiled script representation and the JSON script compiler.
//!
//! The grammar of the CX language lives outside this crate; a compiler hands
//! the runtime a [`CompiledScript`]: an instruction list tagged with the
//! language version that selects the interpreter.

use serde::{Deserialize, Serialize};

use crate::common::{RuntimeError, RuntimeResult, Value, ValueMap};
use crate::traits::ScriptCompiler;

fn default_language_version() -> String {
    "1.0".to_string()
}

const fn one() -> Value {
    Value::Int(1)
}

/// A script ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledScript {
    /// Selects the interpreter through the version table.
    #[serde(default = "default_language_version")]
    pub language_version: String,
    /// Optional label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
}

impl CompiledScript {
    /// Creates a script for `language_version`.
    #[must_use]
    pub fn new(language_version: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            language_version: language_version.into(),
            name: None,
            instructions,
        }
    }

    /// Decodes a script carried inside a [`Value`].
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Script`] when the value is not a script.
    pub fn from_value(value: &Value) -> RuntimeResult<Self> {
        value
            .decode()
            .map_err(|e| RuntimeError::Script(format!("invalid compiled script: {e}")))
    }
}

/// One operation of the instruction set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Sets a property.
    Set {
        /// Property name.
        key: String,
        /// New value.
        value: Value,
    },
    /// Removes a property.
    Remove {
        /// Property name.
        key: String,
    },
    /// Adds `by` to a numeric property; a missing property counts as zero.
    Increment {
        /// Property name.
        key: String,
        /// Amount to add.
        #[serde(default = "one")]
        by: Value,
    },
    /// Emits a message to another actor once the script succeeds.
    Send {
        /// Target actor id.
        to: String,
        /// Message payload.
        #[serde(default)]
        payload: Value,
    },
    /// Appends a line to the script log.
    Log {
        /// Log line.
        message: String,
    },
    /// Stops execution with a result value.
    Return {
        /// Script result.
        #[serde(default)]
        value: Value,
    },
}

/// Options passed to a [`ScriptCompiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileContext {
    /// Version stamped on scripts that do not name one.
    pub language_version: String,
    /// Script label.
    pub source_name: Option<String>,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self {
            language_version: default_language_version(),
            source_name: None,
        }
    }
}

/// A message produced by a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedMessage {
    /// Target actor id.
    pub to: String,
    /// Payload.
    pub payload: Value,
}

/// Mutable environment a script runs against.
#[derive(Debug, Clone, Default)]
pub struct ScriptContext {
    /// Actor the script runs for, if any.
    pub actor_id: Option<String>,
    /// Working copy of the actor's properties.
    pub properties: ValueMap,
    /// Messages queued by `send` instructions.
    pub emitted: Vec<EmittedMessage>,
    /// Lines written by `log` instructions.
    pub log: Vec<String>,
    /// Number of instructions executed so far.
    pub steps: usize,
}

impl ScriptContext {
    /// Creates a context over a copy of `properties`.
    #[must_use]
    pub fn new(actor_id: Option<String>, properties: ValueMap) -> Self {
        Self {
            actor_id,
            properties,
            ..Self::default()
        }
    }
}

/// Result of running a script through the interpreter manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOutcome {
    /// Interpreter slot that ran the script.
    pub interpreter: String,
    /// Version of that interpreter.
    pub interpreter_version: String,
    /// Value of the `return` instruction, or null.
    pub return_value: Value,
    /// Properties whose value changed, sorted.
    pub changed_properties: Vec<String>,
    /// Messages the script emitted.
    pub emitted: Vec<EmittedMessage>,
    /// Script log lines.
    pub log: Vec<String>,
    /// Instructions executed.
    pub instructions_executed: usize,
}

/// Compiles scripts written as JSON.
///
/// Accepts either a bare instruction array or a full script object.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonScriptCompiler;

impl ScriptCompiler for JsonScriptCompiler {
    fn compile(&self, source: &str, context: &CompileContext) -> RuntimeResult<CompiledScript> {
        let parsed: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| RuntimeError::Script(format!("script is not valid JSON: {e}")))?;

        let mut script = if parsed.is_array() {
            let instructions = serde_json::from_value(parsed)
                .map_err(|e| RuntimeError::Script(format!("invalid instruction list: {e}")))?;
            CompiledScript::new(context.language_version.clone(), instructions)
        } else {
            let mut script: CompiledScript = serde_json::from_value(parsed.clone())
                .map_err(|e| RuntimeError::Script(format!("invalid script: {e}")))?;
            if parsed.get("languageVersion").is_none() {
                script.language_version.clone_from(&context.language_version);
            }
            script
        };

        if script.name.is_none() {
            script.name.clone_from(&context.source_name);
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_instruction_array() {
        let context = CompileContext {
            language_version: "debug".to_string(),
            source_name: Some("greet".to_string()),
        };
        let script = JsonScriptCompiler
            .compile(
                r#"[{"op": "set", "key": "mood", "value": "calm"}, {"op": "increment", "key": "visits"}]"#,
                &context,
            )
            .unwrap();

        assert_eq!(script.language_version, "debug");
        assert_eq!(script.name.as_deref(), Some("greet"));
        assert_eq!(
            script.instructions[1],
            Instruction::Increment {
                key: "visits".to_string(),
                by: Value::Int(1)
            }
        );
    }

    #[test]
    fn test_compile_object_keeps_version() {
        let script = JsonScriptCompiler
            .compile(
                r#"{"languageVersion": "latest", "instructions": [{"op": "return", "value": 3}]}"#,
                &CompileContext::default(),
            )
            .unwrap();
        assert_eq!(script.language_version, "latest");
    }

    #[test]
    fn test_compile_rejects_unknown_op() {
        let err = JsonScriptCompiler
            .compile(r#"[{"op": "jump"}]"#, &CompileContext::default())
            .unwrap_err();
        assert_eq!(err.code(), "SCRIPT_ERROR");
    }

    #[test]
    fn test_from_value_defaults_version() {
        let value = Value::from(serde_json::json!({ "instructions": [] }));
        let script = CompiledScript::from_value(&value).unwrap();
        assert_eq!(script.language_version, "1.0");
        assert!(script.instructions.is_empty());
    }
}
