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

use crate::interpreter::{CompiledScript, ScriptContext};
use crate::traits::{Interpreter, InterpreterValidator};

/// Accepts interpreters with a name and version that can run an empty script.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInterpreterValidator;

impl InterpreterValidator for DefaultInterpreterValidator {
    fn validate(&self, interpreter: &dyn Interpreter) -> Result<(), String> {
        if interpreter.name().trim().is_empty() {
            return Err("interpreter name is empty".to_string());
        }
        if interpreter.version().trim().is_empty() {
            return Err("interpreter version is empty".to_string());
        }
        let smoke = CompiledScript::new(interpreter.version(), Vec::new());
        interpreter
            .execute(&smoke, &mut ScriptContext::default())
            .map(|_| ())
            .map_err(|e| format!("dry run failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{RuntimeError, RuntimeResult, Value};
    use crate::interpreter::StandardInterpreter;

    struct Broken;

    impl Interpreter for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn version(&self) -> &str {
            "2.0"
        }

        fn execute(&self, _: &CompiledScript, _: &mut ScriptContext) -> RuntimeResult<Value> {
            Err(RuntimeError::Script("not ready".to_string()))
        }
    }

    #[test]
    fn test_accepts_standard() {
        assert!(DefaultInterpreterValidator
            .validate(&StandardInterpreter::new("1.1"))
            .is_ok());
    }

    #[test]
    fn test_rejects_failing_dry_run() {
        let reason = DefaultInterpreterValidator.validate(&Broken).unwrap_err();
        assert!(reason.contains("not ready"));
    }

    #[test]
    fn test_rejects_blank_version() {
        assert!(DefaultInterpreterValidator
            .validate(&StandardInterpreter::new(" "))
            .is_err());
    }
}
