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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

use crate::actor::{ActorConfig, ActorFactory, ActorInfo, ActorSnapshot, ActorState, ManagedActor, StateUpdate};
use crate::common::config::RuntimeConfig;
use crate::common::metrics::{bump, RuntimeMetrics};
use crate::common::runtime_inner::RuntimeInner;
use crate::common::{RuntimeError, RuntimeResult, Value};
use crate::consciousness::{ConsciousnessEvent, ProcessorResult, SceneUpdate};
use crate::interpreter::{CompiledScript, InterpreterManager, ScriptOutcome};
use crate::message::Message;
use crate::traits::{ConsciousnessProcessor, TransactionTarget};
use crate::transaction::{Transaction, TransactionReceipt};

/// Sender id stamped on messages emitted by scripts that run without an actor.
pub const SCRIPT_SENDER: &str = "script";

/// Handle on a running actor system.
///
/// Obtained from [`CxApp::launch_async`](crate::common::CxApp::launch_async).
/// Cloning is cheap; every clone drives the same actors, queue and
/// interpreters. Two background loops run on the runtime's task tracker: the
/// delivery loop forwarding queued messages to actor inboxes in FIFO order and
/// the maintenance loop sweeping inactive actors.
#[derive(Clone)]
pub struct ActorRuntime(pub(crate) Arc<RuntimeInner>);

impl std::fmt::Debug for ActorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRuntime")
            .field("actors", &self.0.actors.len())
            .field("shut_down", &self.0.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl ActorRuntime {
    /// Builds the runtime and starts its background loops.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(config: RuntimeConfig, processor: Arc<dyn ConsciousnessProcessor>) -> Self {
        let (inner, receiver) = RuntimeInner::new(config, processor);
        let runtime = Self(Arc::new(inner));

        runtime.0.tracker().spawn(runtime.clone().run_delivery(receiver));
        runtime.0.tracker().spawn(runtime.clone().run_maintenance());
        debug!("Runtime loops started");
        runtime
    }

    async fn run_delivery(self, mut receiver: mpsc::UnboundedReceiver<Message>) {
        let token = self.0.cancellation_token().clone();
        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    trace!("Delivery loop received stop signal");
                    break;
                }

                next = receiver.recv() => {
                    let Some(message) = next else { break; };
                    self.deliver(message).await;
                }
            }
        }
        receiver.close();
        debug!("Delivery loop stopped");
    }

    async fn deliver(&self, message: Message) {
        let target = self
            .0
            .actor(&message.to)
            .filter(|actor| !actor.is_stopping())
            .map(|actor| actor.inbox());

        let Some(inbox) = target else {
            warn!(message_id = %message.id, to = %message.to, "Dropping message for unknown or stopping actor");
            bump(&self.0.counters.messages_dropped);
            return;
        };

        let (message_id, to) = (message.id.clone(), message.to.clone());
        match inbox.send(message).await {
            Ok(()) => {
                trace!(%message_id, %to, "Delivered message");
                bump(&self.0.counters.messages_delivered);
            }
            Err(_) => {
                warn!(%message_id, %to, "Dropping message, actor inbox closed");
                bump(&self.0.counters.messages_dropped);
            }
        }
    }

    async fn run_maintenance(self) {
        let token = self.0.cancellation_token().clone();
        let period = self.0.config.maintenance_interval().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => break,

                _ = interval.tick() => {
                    let swept = self.sweep_inactive().await;
                    if swept > 0 {
                        info!(swept, "Maintenance destroyed inactive actors");
                    }
                }
            }
        }
        debug!("Maintenance loop stopped");
    }

    /// Destroys every actor whose behavior reports it inactive.
    ///
    /// Runs on the maintenance interval; exposed for callers that want an
    /// immediate sweep. Returns the number of actors destroyed.
    pub async fn sweep_inactive(&self) -> usize {
        let inactive: Vec<String> = self
            .0
            .actors
            .iter()
            .filter(|entry| !entry.is_stopping() && entry.is_inactive())
            .map(|entry| entry.key().clone())
            .collect();

        let mut destroyed = 0;
        for actor_id in inactive {
            if self.destroy_actor(&actor_id).await {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Creates and starts an actor of a registered type.
    ///
    /// # Errors
    ///
    /// * [`RuntimeError::DuplicateActor`] when `actor_id` is taken, including by an actor still being destroyed.
    /// * [`RuntimeError::InvalidConfiguration`] for a blank id or namespace, an unknown type, or a config the
    ///   behavior rejects.
    /// * [`RuntimeError::Shutdown`] after [`shutdown`](Self::shutdown).
    #[instrument(skip(self, config))]
    pub async fn create_actor(&self, actor_type: &str, actor_id: &str, config: ActorConfig) -> RuntimeResult<String> {
        self.spawn_actor(actor_type, actor_id, config)
            .await
            .map(|actor| actor.id().to_string())
    }

    async fn spawn_actor(
        &self,
        actor_type: &str,
        actor_id: &str,
        config: ActorConfig,
    ) -> RuntimeResult<Arc<ManagedActor>> {
        if self.0.is_shut_down() {
            return Err(RuntimeError::Shutdown);
        }
        if actor_id.trim().is_empty() {
            return Err(RuntimeError::InvalidConfiguration("actor id must not be empty".to_string()));
        }
        let namespace = config.resolve_namespace(&self.0.config.runtime.default_namespace)?;
        if self.0.actors.contains_key(actor_id) {
            return Err(RuntimeError::DuplicateActor(actor_id.to_string()));
        }
        let behavior = self.0.factory.create(actor_type, &config)?;

        let state = ActorState::new(actor_id, actor_type, namespace.clone(), config.properties.clone());
        let capacity = config
            .inbox_capacity
            .unwrap_or(self.0.config.runtime.actor_inbox_capacity);
        let actor = match self.0.actors.entry(actor_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RuntimeError::DuplicateActor(actor_id.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let actor = ManagedActor::spawn(state, behavior, capacity, &self.0.environment);
                slot.insert(Arc::clone(&actor));
                actor
            }
        };
        self.0.namespaces.add(&namespace, actor_id);

        if config.enable_consciousness {
            let initialized = self
                .0
                .processor
                .initialize_actor_consciousness(actor_id, &config.consciousness_seed)
                .await;
            self.store_consciousness(&actor, "initialize", initialized);
        }

        bump(&self.0.counters.actors_created);
        info!(%namespace, "Actor created");
        Ok(actor)
    }

    /// Stops and removes an actor.
    ///
    /// Returns `false` for unknown ids and for a destroy already in progress.
    /// The teardown runs on the runtime's task tracker, so it completes even
    /// when the caller stops waiting for it.
    #[instrument(skip(self))]
    pub async fn destroy_actor(&self, actor_id: &str) -> bool {
        let Some(actor) = self.0.actor(actor_id) else {
            debug!("Destroy of unknown actor");
            return false;
        };
        self.retire(actor).await
    }

    /// Destroys `actor` if it is still the instance registered under its id.
    async fn retire(&self, actor: Arc<ManagedActor>) -> bool {
        let registered = self
            .0
            .actor(actor.id())
            .is_some_and(|current| Arc::ptr_eq(&current, &actor));
        if !registered {
            debug!(actor_id = actor.id(), "Instance is no longer registered");
            return false;
        }
        if !actor.mark_stopping() {
            debug!(actor_id = actor.id(), "Destroy already in progress");
            return false;
        }

        let actor_id = actor.id().to_string();
        let teardown = self
            .0
            .tracker()
            .spawn(self.clone().teardown(actor).in_current_span());
        if let Err(e) = teardown.await {
            error!(%actor_id, "Actor teardown failed: {e}");
        }
        true
    }

    async fn teardown(self, actor: Arc<ManagedActor>) {
        actor.stop().await;
        let actor_id = actor.id();
        if let Err(e) = self.0.processor.cleanup_actor_consciousness(actor_id).await {
            warn!(actor_id, error = %e, "Consciousness cleanup failed");
        }
        self.0.namespaces.remove(&actor.namespace(), actor_id);
        self.0
            .actors
            .remove_if(actor_id, |_, registered| Arc::ptr_eq(registered, &actor));
        actor.mark_removed();

        bump(&self.0.counters.actors_destroyed);
        info!(actor_id, "Actor destroyed");
    }

    /// Current state of an actor.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] for unknown ids.
    pub fn get_actor_state(&self, actor_id: &str) -> RuntimeResult<ActorSnapshot> {
        self.0
            .actor(actor_id)
            .map(|actor| actor.snapshot())
            .ok_or_else(|| RuntimeError::actor_not_found(actor_id))
    }

    /// Applies a partial state update. Returns `false` for unknown or stopping actors.
    ///
    /// Consciousness-relevant updates are forwarded to the processor after the
    /// local apply.
    pub async fn update_actor_state(&self, actor_id: &str, update: &StateUpdate) -> bool {
        let Some(actor) = self.0.actor(actor_id).filter(|actor| !actor.is_stopping()) else {
            return false;
        };

        let changed = actor.update(|state| {
            let changed = update.apply_to(state);
            if changed {
                state.touch();
            }
            changed
        });
        trace!(actor_id, changed, "Applied state update");

        if update.consciousness_relevant {
            let current = actor.consciousness();
            let processed = self
                .0
                .processor
                .process_state_update(actor_id, current.as_ref(), update)
                .await;
            self.store_consciousness(&actor, "state update", processed);
        }
        true
    }

    /// Enqueues a fire-and-forget message. Never waits.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Shutdown`] after [`shutdown`](Self::shutdown).
    pub fn send_message(&self, from: &str, to: &str, payload: Value) -> RuntimeResult<Message> {
        if self.0.is_shut_down() {
            return Err(RuntimeError::Shutdown);
        }
        self.0.environment.queue.enqueue(Message::new(from, to, payload))
    }

    /// Listing of actors, optionally restricted to one namespace, sorted by id.
    #[must_use]
    pub fn list_actors(&self, namespace: Option<&str>) -> Vec<ActorInfo> {
        let mut actors: Vec<ActorInfo> = match namespace {
            Some(namespace) => self
                .0
                .namespaces
                .members(namespace)
                .iter()
                .filter_map(|id| self.0.actor(id))
                .map(|actor| actor.info())
                .collect(),
            None => self.0.actors.iter().map(|entry| entry.info()).collect(),
        };
        actors.sort_by(|a, b| a.id.cmp(&b.id));
        actors
    }

    /// Namespaces that have held at least one actor, sorted.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        self.0.namespaces.namespaces()
    }

    /// Validates and applies a transaction with compensating rollback.
    ///
    /// The transaction runs as its own task on the runtime's tracker. Dropping
    /// the returned future does not interrupt it: the transaction still either
    /// commits or rolls back completely.
    ///
    /// # Errors
    ///
    /// See [`TransactionManager::execute`](crate::transaction::TransactionManager::execute).
    pub async fn execute_transaction(&self, tx: Transaction) -> RuntimeResult<TransactionReceipt> {
        let transaction_id = tx.id.clone();
        let runtime = self.clone();
        let run = self.0.tracker().spawn(
            async move { runtime.0.transactions.execute(&runtime, tx).await }.in_current_span(),
        );
        run.await.unwrap_or_else(|e| {
            Err(RuntimeError::TransactionApply {
                transaction_id,
                index: 0,
                reason: format!("transaction task failed: {e}"),
            })
        })
    }

    /// Point-in-time metrics.
    #[must_use]
    pub fn metrics(&self) -> RuntimeMetrics {
        self.0.counters.snapshot(self.0.actors.len())
    }

    /// Applies a batch of scene changes. Returns how many actors were updated.
    pub async fn apply_unity_update(&self, update: SceneUpdate) -> usize {
        let mut applied = 0;
        for entity in update.entities {
            let Some(actor) = self.0.actor(&entity.actor_id).filter(|actor| !actor.is_stopping()) else {
                debug!(actor_id = %entity.actor_id, frame = update.frame, "Scene change for unknown actor");
                continue;
            };

            let local = StateUpdate {
                properties: entity.properties,
                active: entity.active,
                ..StateUpdate::default()
            };
            actor.update(|state| {
                local.apply_to(state);
                state.touch();
            });

            if !entity.change.is_null() {
                let current = actor.consciousness();
                let processed = self
                    .0
                    .processor
                    .process_unity_change(&entity.actor_id, current.as_ref(), &entity.change)
                    .await;
                self.store_consciousness(&actor, "unity change", processed);
            }
            applied += 1;
        }
        trace!(frame = update.frame, applied, "Applied scene update");
        applied
    }

    /// Applies a consciousness event and an optional AI response to one actor.
    ///
    /// Returns `false` when the actor is unknown.
    pub async fn update_consciousness_state(&self, event: ConsciousnessEvent, ai_response: Value) -> bool {
        let Some(actor) = self.0.actor(&event.actor_id).filter(|actor| !actor.is_stopping()) else {
            return false;
        };

        let current = actor.consciousness();
        let processed = self
            .0
            .processor
            .apply_consciousness_update(&event.actor_id, current.as_ref(), &event)
            .await;
        self.store_consciousness(&actor, "consciousness event", processed);

        if !ai_response.is_null() {
            let current = actor.consciousness();
            let processed = self
                .0
                .processor
                .apply_ai_response(&event.actor_id, current.as_ref(), &ai_response)
                .await;
            self.store_consciousness(&actor, "ai response", processed);
        }
        actor.update(ActorState::touch);
        true
    }

    /// Consciousness level of an actor as scored by the processor.
    #[must_use]
    pub fn consciousness_level(&self, actor_id: &str) -> Option<f64> {
        let actor = self.0.actor(actor_id)?;
        let current = actor.consciousness();
        Some(self.0.processor.consciousness_level(current.as_ref()))
    }

    /// Runs a script against an actor's properties, or against an empty bag when `actor_id` is `None`.
    ///
    /// Changed properties are written back only when the script succeeds.
    /// Messages the script emitted are enqueued afterwards.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] for unknown actors or interpreters and
    /// [`RuntimeError::Script`] for execution failures.
    #[instrument(skip(self, script), fields(language_version = %script.language_version))]
    pub fn execute_script(&self, actor_id: Option<&str>, script: &CompiledScript) -> RuntimeResult<ScriptOutcome> {
        let interpreters = &self.0.environment.interpreters;
        let outcome = match actor_id {
            Some(actor_id) => {
                let actor = self
                    .0
                    .actor(actor_id)
                    .filter(|actor| !actor.is_stopping())
                    .ok_or_else(|| RuntimeError::actor_not_found(actor_id))?;
                actor.update(|state| {
                    let outcome = interpreters.run_script(Some(actor_id.to_string()), &mut state.properties, script)?;
                    state.touch();
                    Ok::<_, RuntimeError>(outcome)
                })?
            }
            None => interpreters.run_script(None, &mut Default::default(), script)?,
        };
        bump(&self.0.counters.scripts_executed);

        let sender = actor_id.unwrap_or(SCRIPT_SENDER);
        for emitted in &outcome.emitted {
            self.send_message(sender, &emitted.to, emitted.payload.clone())?;
        }
        Ok(outcome)
    }

    /// The interpreter manager shared by every actor.
    #[must_use]
    pub fn interpreters(&self) -> &Arc<InterpreterManager> {
        &self.0.environment.interpreters
    }

    /// The actor factory, for registering custom types.
    #[must_use]
    pub fn factory(&self) -> &ActorFactory {
        &self.0.factory
    }

    /// Configuration the runtime was launched with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    /// Number of live actors.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.0.actors.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.0.is_shut_down()
    }

    /// Stops every actor, then the background loops, and waits for all of them.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Fails when the tasks do not finish within `shutdown_timeout_ms`.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if self.0.is_shut_down() {
            return Ok(());
        }
        self.0.transactions.close();
        let timeout = self.0.config.shutdown_timeout();
        let ids: Vec<String> = self.0.actors.iter().map(|entry| entry.key().clone()).collect();
        trace!(actors = ids.len(), "Stopping all actors");

        let stops = join_all(ids.iter().map(|id| self.destroy_actor(id)));
        if tokio::time::timeout(timeout, stops).await.is_err() {
            error!("Timed out stopping actors after {} ms, cancelling", timeout.as_millis());
        }

        self.0.cancellation_token().cancel();
        self.0.tracker().close();
        if tokio::time::timeout(timeout, self.0.tracker().wait()).await.is_err() {
            error!("Runtime tasks did not stop within {} ms", timeout.as_millis());
            return Err(anyhow::anyhow!(
                "runtime tasks did not stop within {} ms",
                timeout.as_millis()
            ));
        }
        info!("Runtime shut down");
        Ok(())
    }

    fn store_consciousness(&self, actor: &ManagedActor, stage: &str, result: ProcessorResult<Option<Value>>) {
        match result {
            Ok(Some(blob)) => actor.set_consciousness(blob),
            Ok(None) => {}
            Err(e) => warn!(actor_id = actor.id(), stage, error = %e, "Consciousness processor failed"),
        }
    }
}

#[async_trait]
impl TransactionTarget for ActorRuntime {
    type Created = Arc<ManagedActor>;

    fn actor_exists(&self, actor_id: &str) -> bool {
        self.0.actor(actor_id).is_some_and(|actor| !actor.is_stopping())
    }

    fn is_type_registered(&self, actor_type: &str) -> bool {
        self.0.factory.is_registered(actor_type)
    }

    fn snapshot(&self, actor_id: &str) -> Option<ActorSnapshot> {
        self.0.actor(actor_id).map(|actor| actor.snapshot())
    }

    async fn create(&self, actor_type: &str, actor_id: &str, config: ActorConfig) -> RuntimeResult<Arc<ManagedActor>> {
        self.spawn_actor(actor_type, actor_id, config).await
    }

    async fn discard(&self, created: Arc<ManagedActor>) -> bool {
        self.retire(created).await
    }

    async fn update(&self, actor_id: &str, update: &StateUpdate) -> bool {
        self.update_actor_state(actor_id, update).await
    }

    async fn destroy(&self, actor_id: &str) -> bool {
        self.destroy_actor(actor_id).await
    }

    async fn restore(&self, snapshot: ActorSnapshot) -> RuntimeResult<()> {
        if let Some(leaving) = self.0.actor(&snapshot.id).filter(|actor| actor.is_stopping()) {
            leaving.removed().await;
        }
        if !self.actor_exists(&snapshot.id) {
            let config = ActorConfig {
                namespace: Some(snapshot.namespace.clone()),
                properties: snapshot.properties.clone(),
                ..ActorConfig::default()
            };
            self.create_actor(&snapshot.actor_type, &snapshot.id, config).await?;
        }
        let actor = self
            .0
            .actor(&snapshot.id)
            .ok_or_else(|| RuntimeError::actor_not_found(snapshot.id.clone()))?;
        actor.update(|state| {
            state.properties = snapshot.properties;
            state.active = snapshot.active;
            state.consciousness = snapshot.consciousness;
            state.touch();
        });
        Ok(())
    }

    fn send(&self, from: &str, to: &str, payload: Value) -> RuntimeResult<Message> {
        self.send_message(from, to, payload)
    }
}
