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

//! Command routing for requests on the built-in transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::actor::{ActorConfig, StateUpdate};
use crate::common::{now_millis, ActorRuntime, RuntimeError, RuntimeResult, Value, ValueMap, SCRIPT_SENDER};
use crate::interpreter::{CompileContext, CompiledScript, JsonScriptCompiler};
use crate::protocol::ProtocolRequest;
use crate::traits::{CommandHandler, ScriptCompiler};
use crate::transaction::Transaction;

/// Command handlers keyed by command name.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: DashMap<String, Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`. Returns `false` if the name is taken.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> bool {
        match self.handlers.entry(name.into()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handler);
                true
            }
        }
    }

    /// Whether a handler serves `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Runs the handler registered for the request's command.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ProtocolRouting`] for an unknown command, otherwise
    /// whatever the handler returns.
    pub async fn dispatch(&self, request: &ProtocolRequest) -> RuntimeResult<Value> {
        let handler = self
            .handlers
            .get(&request.command)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuntimeError::ProtocolRouting(format!("unknown command '{}'", request.command)))?;
        trace!(command = %request.command, request_id = %request.id, "Dispatching command");
        handler.call(request).await
    }
}

/// The commands every dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Ping,
    CreateActor,
    DestroyActor,
    GetState,
    UpdateState,
    SendMessage,
    ListActors,
    ExecuteTransaction,
    ExecuteScript,
    ListInterpreters,
    InterpreterMetrics,
    RuntimeMetrics,
}

impl Builtin {
    const ALL: [(&'static str, Self); 12] = [
        ("system.ping", Self::Ping),
        ("actor.create", Self::CreateActor),
        ("actor.destroy", Self::DestroyActor),
        ("actor.get_state", Self::GetState),
        ("actor.update_state", Self::UpdateState),
        ("actor.send_message", Self::SendMessage),
        ("actor.list", Self::ListActors),
        ("transaction.execute", Self::ExecuteTransaction),
        ("script.execute", Self::ExecuteScript),
        ("interpreter.list", Self::ListInterpreters),
        ("interpreter.metrics", Self::InterpreterMetrics),
        ("runtime.metrics", Self::RuntimeMetrics),
    ];
}

/// Names of the built-in commands.
#[must_use]
pub fn builtin_commands() -> Vec<&'static str> {
    Builtin::ALL.iter().map(|(name, _)| *name).collect()
}

/// Registers the built-in commands against `runtime`.
///
/// Transactions submitted through `transaction.execute` never get a deadline
/// longer than `request_timeout`, so a caller that gave up on the response
/// does not leave one applying in the background.
pub fn register_builtins(registry: &CommandRegistry, runtime: &ActorRuntime, request_timeout: Duration) {
    for (name, kind) in Builtin::ALL {
        registry.register(
            name,
            Arc::new(BuiltinCommand {
                runtime: runtime.clone(),
                kind,
                request_timeout,
            }),
        );
    }
}

struct BuiltinCommand {
    runtime: ActorRuntime,
    kind: Builtin,
    request_timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    actor_type: String,
    actor_id: String,
    #[serde(default)]
    config: ActorConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorParams {
    actor_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    actor_id: String,
    update: StateUpdate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendParams {
    from: Option<String>,
    to: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ListParams {
    namespace: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptParams {
    actor_id: Option<String>,
    script: Option<CompiledScript>,
    source: Option<String>,
    language_version: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pong {
    pong: bool,
    server_time: u64,
}

fn params<T: DeserializeOwned>(request: &ProtocolRequest) -> RuntimeResult<T> {
    request.data.decode().map_err(|e| {
        RuntimeError::InvalidConfiguration(format!("invalid parameters for '{}': {e}", request.command))
    })
}

fn encode<T: Serialize>(value: &T) -> RuntimeResult<Value> {
    Value::encode(value).map_err(|e| RuntimeError::Script(format!("unencodable result: {e}")))
}

impl ScriptParams {
    fn into_script(self) -> RuntimeResult<CompiledScript> {
        if let Some(script) = self.script {
            return Ok(script);
        }
        let Some(source) = self.source else {
            return Err(RuntimeError::InvalidConfiguration(
                "script.execute needs either 'script' or 'source'".to_string(),
            ));
        };
        let mut context = CompileContext {
            source_name: self.name,
            ..CompileContext::default()
        };
        if let Some(version) = self.language_version {
            context.language_version = version;
        }
        JsonScriptCompiler.compile(&source, &context)
    }
}

#[async_trait]
impl CommandHandler for BuiltinCommand {
    async fn call(&self, request: &ProtocolRequest) -> RuntimeResult<Value> {
        let runtime = &self.runtime;
        match self.kind {
            Builtin::Ping => encode(&Pong {
                pong: true,
                server_time: now_millis(),
            }),
            Builtin::CreateActor => {
                let p: CreateParams = params(request)?;
                let id = runtime.create_actor(&p.actor_type, &p.actor_id, p.config).await?;
                let mut body = ValueMap::new();
                body.insert("actorId".to_string(), Value::String(id));
                Ok(Value::Map(body))
            }
            Builtin::DestroyActor => {
                let p: ActorParams = params(request)?;
                if runtime.destroy_actor(&p.actor_id).await {
                    Ok(Value::Bool(true))
                } else {
                    Err(RuntimeError::actor_not_found(p.actor_id))
                }
            }
            Builtin::GetState => {
                let p: ActorParams = params(request)?;
                encode(&runtime.get_actor_state(&p.actor_id)?)
            }
            Builtin::UpdateState => {
                let p: UpdateParams = params(request)?;
                if runtime.update_actor_state(&p.actor_id, &p.update).await {
                    encode(&runtime.get_actor_state(&p.actor_id)?)
                } else {
                    Err(RuntimeError::actor_not_found(p.actor_id))
                }
            }
            Builtin::SendMessage => {
                let p: SendParams = params(request)?;
                let from = p
                    .from
                    .or_else(|| request.client_id.clone())
                    .unwrap_or_else(|| request.protocol_type.to_string());
                encode(&runtime.send_message(&from, &p.to, p.payload)?)
            }
            Builtin::ListActors => {
                let p: ListParams = if request.data.is_null() {
                    ListParams::default()
                } else {
                    params(request)?
                };
                encode(&runtime.list_actors(p.namespace.as_deref()))
            }
            Builtin::ExecuteTransaction => {
                let tx: Transaction = params(request)?;
                let timeout = tx
                    .timeout_ms
                    .map_or(runtime.config().default_transaction_timeout(), Duration::from_millis)
                    .min(self.request_timeout);
                encode(&runtime.execute_transaction(tx.with_timeout(timeout)).await?)
            }
            Builtin::ExecuteScript => {
                let p: ScriptParams = params(request)?;
                let actor_id = p.actor_id.clone();
                let script = p.into_script()?;
                trace!(sender = actor_id.as_deref().unwrap_or(SCRIPT_SENDER), "Running script command");
                encode(&runtime.execute_script(actor_id.as_deref(), &script)?)
            }
            Builtin::ListInterpreters => encode(&runtime.interpreters().available_interpreters()),
            Builtin::InterpreterMetrics => {
                let p: NameParams = params(request)?;
                encode(&runtime.interpreters().interpreter_metrics(&p.name)?)
            }
            Builtin::RuntimeMetrics => encode(&runtime.metrics()),
        }
    }
}
