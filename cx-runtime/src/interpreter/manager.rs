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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use crate::common::config::InterpreterConfig;
use crate::common::{now_millis, RuntimeError, RuntimeResult, TimestampMs, Value, ValueMap};
use crate::interpreter::container::LiveInterpreter;
use crate::interpreter::standard::{DEBUG_INTERPRETER, STANDARD_INTERPRETER};
use crate::interpreter::{
    CompiledScript, DebugInterpreter, DefaultInterpreterValidator, InterpreterContainer, InterpreterLease,
    ScriptContext, ScriptOutcome, StandardInterpreter,
};
use crate::traits::{Interpreter, InterpreterValidator};

type Slot = Arc<ArcSwap<InterpreterContainer>>;

#[derive(Debug, Default)]
struct SlotStats {
    usage_count: AtomicU64,
    swap_count: AtomicU64,
    executions: AtomicU64,
    failures: AtomicU64,
    execution_micros: AtomicU64,
    last_swap_at: AtomicU64,
}

/// Result of [`InterpreterManager::swap_interpreter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    /// Slot that was written.
    pub name: String,
    /// Version now installed.
    pub installed_version: String,
    /// Version that was replaced, if the slot already existed.
    pub replaced_version: Option<String>,
    /// `true` while leases on the replaced instance are still held.
    pub pending_disposal: bool,
}

/// Usage statistics for one interpreter slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterMetrics {
    /// Slot name.
    pub name: String,
    /// Version of the installed instance.
    pub version: String,
    /// When the installed instance was loaded.
    pub loaded_at: TimestampMs,
    /// Whether the installed container is active.
    pub active: bool,
    /// Times the slot was resolved through `get_interpreter`.
    pub usage_count: u64,
    /// Times the slot was replaced.
    pub swap_count: u64,
    /// Scripts executed through the manager.
    pub executions: u64,
    /// Executions that returned an error.
    pub failures: u64,
    /// Mean execution time in microseconds.
    pub average_execution_micros: u64,
    /// Time of the most recent swap.
    pub last_swap_at: Option<TimestampMs>,
}

/// Named, versioned interpreter slots that can be replaced while in use.
///
/// Readers resolve a language version to a slot name and take a lease on the
/// slot's current instance. A swap publishes a new container atomically, so a
/// reader sees either the old or the new interpreter. The old instance stays
/// alive until its last lease is dropped and is disposed exactly once.
pub struct InterpreterManager {
    slots: DashMap<String, Slot>,
    versions: DashMap<String, String>,
    stats: DashMap<String, Arc<SlotStats>>,
    validator: Arc<dyn InterpreterValidator>,
    default_version: String,
    retired: Mutex<Vec<Weak<LiveInterpreter>>>,
}

impl std::fmt::Debug for InterpreterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterManager")
            .field("interpreters", &self.available_interpreters())
            .field("default_version", &self.default_version)
            .finish_non_exhaustive()
    }
}

impl Default for InterpreterManager {
    fn default() -> Self {
        Self::new(&InterpreterConfig::default())
    }
}

impl InterpreterManager {
    /// Creates an empty manager using [`DefaultInterpreterValidator`].
    #[must_use]
    pub fn new(config: &InterpreterConfig) -> Self {
        Self {
            slots: DashMap::new(),
            versions: DashMap::new(),
            stats: DashMap::new(),
            validator: Arc::new(DefaultInterpreterValidator),
            default_version: config.default_version.clone(),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the validator consulted by [`swap_interpreter`](Self::swap_interpreter).
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn InterpreterValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Installs `cx-standard` and `cx-debug` and the default version table.
    ///
    /// # Errors
    ///
    /// Fails if either core interpreter is rejected by the validator.
    pub fn load_core_interpreters(&self) -> RuntimeResult<()> {
        self.swap_interpreter(STANDARD_INTERPRETER, Box::new(StandardInterpreter::new("1.0")))?;
        self.swap_interpreter(DEBUG_INTERPRETER, Box::new(DebugInterpreter::new("1.0")))?;
        self.register_version("1.0", STANDARD_INTERPRETER);
        self.register_version("latest", STANDARD_INTERPRETER);
        self.register_version("debug", DEBUG_INTERPRETER);
        info!("Loaded core interpreters");
        Ok(())
    }

    /// Maps a language version onto a slot name, replacing any previous mapping.
    pub fn register_version(&self, version: impl Into<String>, name: impl Into<String>) {
        let (version, name) = (version.into(), name.into());
        debug!(%version, %name, "Registered language version");
        self.versions.insert(version, name);
    }

    fn resolve(&self, language_version: &str) -> RuntimeResult<(String, InterpreterLease)> {
        let name = match self.versions.get(language_version) {
            Some(name) => name.value().clone(),
            None => {
                warn!(
                    requested = language_version,
                    fallback = %self.default_version,
                    "Unknown language version, using default"
                );
                self.versions
                    .get(&self.default_version)
                    .map(|name| name.value().clone())
                    .ok_or_else(|| RuntimeError::interpreter_not_found(language_version))?
            }
        };

        let slot = self
            .slots
            .get(&name)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| RuntimeError::interpreter_not_found(name.clone()))?;
        let lease = slot.load().lease();
        self.stats_for(&name).usage_count.fetch_add(1, Ordering::Relaxed);
        Ok((name, lease))
    }

    /// Leases the interpreter serving `language_version`.
    ///
    /// Unknown versions fall back to the configured default version.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] when neither the version nor the default resolves.
    pub fn get_interpreter(&self, language_version: &str) -> RuntimeResult<InterpreterLease> {
        self.resolve(language_version).map(|(_, lease)| lease)
    }

    /// Validates, initializes and installs `candidate` in slot `name`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InterpreterValidation`] when the validator rejects the
    /// candidate or its `initialize` fails; the slot is left untouched.
    #[instrument(skip(self, candidate), fields(version = candidate.version()))]
    pub fn swap_interpreter(&self, name: &str, candidate: Box<dyn Interpreter>) -> RuntimeResult<SwapOutcome> {
        let rejected = |reason: String| RuntimeError::InterpreterValidation {
            name: name.to_string(),
            reason,
        };
        self.validator.validate(&*candidate).map_err(rejected)?;
        candidate
            .initialize()
            .map_err(|e| rejected(format!("initialize failed: {e}")))?;

        let installed_version = candidate.version().to_string();
        let container = Arc::new(InterpreterContainer::new(name, candidate));
        let previous = match self.slots.entry(name.to_string()) {
            Entry::Occupied(slot) => Some(slot.get().swap(container)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(ArcSwap::new(container)));
                None
            }
        };

        let stats = self.stats_for(name);
        stats.swap_count.fetch_add(1, Ordering::Relaxed);
        stats.last_swap_at.store(now_millis(), Ordering::Relaxed);

        let Some(previous) = previous else {
            self.versions
                .entry(installed_version.clone())
                .or_insert_with(|| name.to_string());
            info!(name, version = %installed_version, "Registered interpreter");
            return Ok(SwapOutcome {
                name: name.to_string(),
                installed_version,
                replaced_version: None,
                pending_disposal: false,
            });
        };

        previous.deactivate();
        let replaced_version = previous.version().to_string();
        let weak = previous.downgrade();
        drop(previous);
        let pending_disposal = weak.strong_count() > 0;
        if pending_disposal {
            self.retired.lock().push(weak);
        }

        info!(name, from = %replaced_version, to = %installed_version, pending_disposal, "Swapped interpreter");
        Ok(SwapOutcome {
            name: name.to_string(),
            installed_version,
            replaced_version: Some(replaced_version),
            pending_disposal,
        })
    }

    /// Runs the configured validator against `interpreter`.
    #[must_use]
    pub fn validate_interpreter(&self, interpreter: &dyn Interpreter) -> bool {
        match self.validator.validate(interpreter) {
            Ok(()) => true,
            Err(reason) => {
                debug!(name = interpreter.name(), %reason, "Interpreter failed validation");
                false
            }
        }
    }

    /// Names of every installed slot, sorted.
    #[must_use]
    pub fn available_interpreters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        names.sort();
        names
    }

    /// Statistics for slot `name`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] when no slot has that name.
    pub fn interpreter_metrics(&self, name: &str) -> RuntimeResult<InterpreterMetrics> {
        let container = self
            .slots
            .get(name)
            .map(|slot| slot.load_full())
            .ok_or_else(|| RuntimeError::interpreter_not_found(name))?;
        let stats = self.stats_for(name);
        let executions = stats.executions.load(Ordering::Relaxed);
        let last_swap_at = stats.last_swap_at.load(Ordering::Relaxed);

        Ok(InterpreterMetrics {
            name: name.to_string(),
            version: container.version().to_string(),
            loaded_at: container.loaded_at(),
            active: container.is_active(),
            usage_count: stats.usage_count.load(Ordering::Relaxed),
            swap_count: stats.swap_count.load(Ordering::Relaxed),
            executions,
            failures: stats.failures.load(Ordering::Relaxed),
            average_execution_micros: stats
                .execution_micros
                .load(Ordering::Relaxed)
                .checked_div(executions)
                .unwrap_or(0),
            last_swap_at: (last_swap_at > 0).then_some(last_swap_at),
        })
    }

    /// Retired instances still held alive by outstanding leases.
    #[must_use]
    pub fn pending_disposals(&self) -> usize {
        let mut retired = self.retired.lock();
        retired.retain(|weak| weak.strong_count() > 0);
        retired.len()
    }

    /// Runs `script` through the interpreter for its language version.
    ///
    /// # Errors
    ///
    /// Resolution failures and script errors.
    pub fn execute(&self, script: &CompiledScript, context: &mut ScriptContext) -> RuntimeResult<Value> {
        let (name, lease) = self.resolve(&script.language_version)?;
        self.execute_leased(&name, &lease, script, context)
    }

    fn execute_leased(
        &self,
        name: &str,
        lease: &InterpreterLease,
        script: &CompiledScript,
        context: &mut ScriptContext,
    ) -> RuntimeResult<Value> {
        let stats = self.stats_for(name);
        let started = Instant::now();
        let result = lease.execute(script, context);
        let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        stats.executions.fetch_add(1, Ordering::Relaxed);
        stats.execution_micros.fetch_add(elapsed, Ordering::Relaxed);
        if result.is_err() {
            stats.failures.fetch_add(1, Ordering::Relaxed);
        }
        trace!(interpreter = name, elapsed_us = elapsed, ok = result.is_ok(), "Executed script");
        result
    }

    /// Runs `script` against a copy of `properties`, writing the copy back only on success.
    ///
    /// # Errors
    ///
    /// Resolution failures and script errors; `properties` is unchanged then.
    pub fn run_script(
        &self,
        actor_id: Option<String>,
        properties: &mut ValueMap,
        script: &CompiledScript,
    ) -> RuntimeResult<ScriptOutcome> {
        let (name, lease) = self.resolve(&script.language_version)?;
        let mut context = ScriptContext::new(actor_id, properties.clone());
        let return_value = self.execute_leased(&name, &lease, script, &mut context)?;

        let mut changed_properties: Vec<String> = context
            .properties
            .iter()
            .filter(|(key, value)| properties.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .chain(
                properties
                    .keys()
                    .filter(|key| !context.properties.contains_key(*key))
                    .cloned(),
            )
            .collect();
        changed_properties.sort();
        *properties = context.properties;

        Ok(ScriptOutcome {
            interpreter: name,
            interpreter_version: lease.version().to_string(),
            return_value,
            changed_properties,
            emitted: context.emitted,
            log: context.log,
            instructions_executed: context.steps,
        })
    }

    fn stats_for(&self, name: &str) -> Arc<SlotStats> {
        if let Some(stats) = self.stats.get(name) {
            return Arc::clone(stats.value());
        }
        Arc::clone(self.stats.entry(name.to_string()).or_default().value())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::interpreter::Instruction;

    struct Tracked {
        version: &'static str,
        disposed: Arc<AtomicUsize>,
    }

    impl Interpreter for Tracked {
        fn name(&self) -> &str {
            "tracked"
        }

        fn version(&self) -> &str {
            self.version
        }

        fn execute(&self, _: &CompiledScript, _: &mut ScriptContext) -> RuntimeResult<Value> {
            Ok(Value::from(self.version))
        }

        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager() -> InterpreterManager {
        let manager = InterpreterManager::default();
        manager.load_core_interpreters().unwrap();
        manager
    }

    #[test]
    fn test_core_interpreters() {
        let manager = manager();
        assert_eq!(manager.available_interpreters(), vec!["cx-debug", "cx-standard"]);
        assert_eq!(manager.get_interpreter("latest").unwrap().name(), "cx-standard");
        assert_eq!(manager.get_interpreter("debug").unwrap().name(), "cx-debug");
    }

    #[test]
    fn test_unknown_version_falls_back() {
        let manager = manager();
        let lease = manager.get_interpreter("9.9").unwrap();
        assert_eq!(lease.name(), "cx-standard");
        assert_eq!(manager.interpreter_metrics("cx-standard").unwrap().usage_count, 1);
    }

    #[test]
    fn test_no_default_is_not_found() {
        let manager = InterpreterManager::default();
        let err = manager.get_interpreter("1.0").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_swap_unregistered_name() {
        let manager = manager();
        let disposed = Arc::new(AtomicUsize::new(0));
        let outcome = manager
            .swap_interpreter(
                "custom",
                Box::new(Tracked {
                    version: "2.0",
                    disposed: Arc::clone(&disposed),
                }),
            )
            .unwrap();
        assert_eq!(outcome.replaced_version, None);
        assert!(!outcome.pending_disposal);
        assert!(manager.available_interpreters().contains(&"custom".to_string()));
        assert_eq!(manager.get_interpreter("2.0").unwrap().version(), "2.0");
    }

    #[test]
    fn test_swap_disposes_after_last_lease() {
        let manager = manager();
        let disposed = Arc::new(AtomicUsize::new(0));
        manager
            .swap_interpreter(
                "tracked",
                Box::new(Tracked {
                    version: "a",
                    disposed: Arc::clone(&disposed),
                }),
            )
            .unwrap();
        let held = manager.get_interpreter("a").unwrap();

        let outcome = manager
            .swap_interpreter(
                "tracked",
                Box::new(Tracked {
                    version: "b",
                    disposed: Arc::clone(&disposed),
                }),
            )
            .unwrap();
        assert_eq!(outcome.replaced_version.as_deref(), Some("a"));
        assert!(outcome.pending_disposal);
        assert_eq!(manager.pending_disposals(), 1);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        drop(held);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending_disposals(), 0);
        assert_eq!(manager.interpreter_metrics("tracked").unwrap().swap_count, 2);
    }

    #[test]
    fn test_rejected_swap_leaves_slot() {
        let manager = manager();
        let err = manager
            .swap_interpreter("cx-standard", Box::new(StandardInterpreter::new("")))
            .unwrap_err();
        assert_eq!(err.code(), "INTERPRETER_VALIDATION");
        assert_eq!(manager.interpreter_metrics("cx-standard").unwrap().version, "1.0");
        assert!(!manager.validate_interpreter(&StandardInterpreter::new("")));
    }

    #[test]
    fn test_run_script_reports_changes() {
        let manager = manager();
        let mut properties = ValueMap::new();
        properties.insert("old".to_string(), Value::Int(1));
        properties.insert("same".to_string(), Value::Int(2));
        let script = CompiledScript::new(
            "1.0",
            vec![
                Instruction::Remove { key: "old".to_string() },
                Instruction::Set {
                    key: "same".to_string(),
                    value: Value::Int(2),
                },
                Instruction::Set {
                    key: "new".to_string(),
                    value: Value::Bool(true),
                },
            ],
        );

        let outcome = manager.run_script(None, &mut properties, &script).unwrap();
        assert_eq!(outcome.changed_properties, vec!["new", "old"]);
        assert_eq!(outcome.interpreter, "cx-standard");
        assert!(!properties.contains_key("old"));
        assert_eq!(manager.interpreter_metrics("cx-standard").unwrap().executions, 1);
    }

    #[test]
    fn test_failed_script_keeps_properties() {
        let manager = manager();
        let mut properties = ValueMap::new();
        properties.insert("name".to_string(), Value::from("x"));
        let script = CompiledScript::new(
            "1.0",
            vec![
                Instruction::Set {
                    key: "a".to_string(),
                    value: Value::Int(1),
                },
                Instruction::Increment {
                    key: "name".to_string(),
                    by: Value::Int(1),
                },
            ],
        );

        assert!(manager.run_script(None, &mut properties, &script).is_err());
        assert!(!properties.contains_key("a"));
        assert_eq!(manager.interpreter_metrics("cx-standard").unwrap().failures, 1);
    }
}
