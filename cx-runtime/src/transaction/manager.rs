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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::actor::ActorSnapshot;
use crate::common::config::TransactionConfig;
use crate::common::metrics::{bump, RuntimeCounters};
use crate::common::{RuntimeError, RuntimeResult};
use crate::traits::TransactionTarget;
use crate::transaction::{Transaction, TransactionOperation, TransactionReceipt};

fn resolves<T: TransactionTarget + ?Sized>(
    target: &T,
    id: &str,
    created: &HashSet<&str>,
    deleted: &HashSet<&str>,
) -> bool {
    created.contains(id) || (!deleted.contains(id) && target.actor_exists(id))
}

enum Undo<C> {
    Discard(C),
    Restore(ActorSnapshot),
}

fn timed_out(tx: &Transaction, timeout: Duration) -> RuntimeError {
    RuntimeError::TransactionTimeout {
        transaction_id: tx.id.clone(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Validates and applies [`Transaction`]s with compensating rollback.
///
/// At most `max_concurrent` transactions are in their apply phase at once.
/// The timeout covers the wait for the gate and the apply itself. Operations
/// are never abandoned halfway: the deadline is checked between operations,
/// so an operation running when it passes completes and is then rolled back
/// with the others.
#[derive(Debug)]
pub struct TransactionManager {
    gate: Arc<Semaphore>,
    max_concurrent: usize,
    default_timeout: Duration,
    counters: Arc<RuntimeCounters>,
}

impl TransactionManager {
    /// Creates a manager recording into `counters`.
    #[must_use]
    pub fn new(config: &TransactionConfig, counters: Arc<RuntimeCounters>) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            gate: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            default_timeout: Duration::from_millis(config.default_timeout_ms),
            counters,
        }
    }

    /// Transactions currently holding the gate.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_concurrent.saturating_sub(self.gate.available_permits())
    }

    /// Closes the gate. Transactions waiting for it, and any started later, fail with
    /// [`RuntimeError::Shutdown`]; those already applying finish normally.
    pub fn close(&self) {
        self.gate.close();
    }

    /// Checks the whole transaction against `target` without touching it.
    ///
    /// Actors created earlier in the transaction count as existing; deleted
    /// ones stop counting.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::TransactionValidation`] naming the first problem.
    pub fn validate<T: TransactionTarget + ?Sized>(&self, target: &T, tx: &Transaction) -> RuntimeResult<()> {
        let invalid = |reason: String| RuntimeError::TransactionValidation {
            transaction_id: tx.id.clone(),
            reason,
        };
        let mut created: HashSet<&str> = HashSet::new();
        let mut deleted: HashSet<&str> = HashSet::new();

        for (index, operation) in tx.operations.iter().enumerate() {
            match operation {
                TransactionOperation::Create {
                    actor_type, actor_id, ..
                } => {
                    if actor_id.trim().is_empty() {
                        return Err(invalid(format!("operation {index}: actor id is empty")));
                    }
                    if !target.is_type_registered(actor_type) {
                        return Err(invalid(format!("operation {index}: unknown actor type '{actor_type}'")));
                    }
                    if resolves(target, actor_id, &created, &deleted) {
                        return Err(invalid(format!("operation {index}: actor '{actor_id}' already exists")));
                    }
                    deleted.remove(actor_id.as_str());
                    created.insert(actor_id.as_str());
                }
                TransactionOperation::Update { actor_id, .. } => {
                    if !resolves(target, actor_id, &created, &deleted) {
                        return Err(invalid(format!("operation {index}: actor '{actor_id}' not found")));
                    }
                }
                TransactionOperation::Delete { actor_id } => {
                    if !resolves(target, actor_id, &created, &deleted) {
                        return Err(invalid(format!("operation {index}: actor '{actor_id}' not found")));
                    }
                    created.remove(actor_id.as_str());
                    deleted.insert(actor_id.as_str());
                }
                TransactionOperation::Message { to, .. } => {
                    if !resolves(target, to, &created, &deleted) {
                        return Err(invalid(format!("operation {index}: message target '{to}' not found")));
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates and applies `tx`.
    ///
    /// Message operations are enqueued after every other operation succeeded.
    /// On failure or timeout the applied operations are compensated in
    /// reverse order before the error is returned.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::TransactionValidation`] with no side effects,
    /// [`RuntimeError::TransactionApply`] or [`RuntimeError::TransactionTimeout`]
    /// after rollback, [`RuntimeError::Shutdown`] once [`close`](Self::close) was called.
    #[instrument(skip(self, target, tx), fields(transaction_id = %tx.id, operations = tx.operations.len()))]
    pub async fn execute<T: TransactionTarget + ?Sized>(
        &self,
        target: &T,
        tx: Transaction,
    ) -> RuntimeResult<TransactionReceipt> {
        let started = Instant::now();
        if let Err(e) = self.validate(target, &tx) {
            bump(&self.counters.transactions_failed);
            warn!(error = %e, "Transaction rejected");
            return Err(e);
        }

        let timeout = tx.timeout_ms.map_or(self.default_timeout, Duration::from_millis);
        let deadline = tokio::time::Instant::now() + timeout;
        let _permit = match tokio::time::timeout_at(deadline, self.gate.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(self.fail(RuntimeError::Shutdown)),
            Err(_) => return Err(self.fail(timed_out(&tx, timeout))),
        };

        let mut undo = Vec::new();
        let error = match self.apply(target, &tx, deadline, timeout, &mut undo).await {
            Ok(message_ids) => {
                bump(&self.counters.transactions_committed);
                let receipt = TransactionReceipt {
                    transaction_id: tx.id.clone(),
                    operations_applied: tx.operations.len(),
                    message_ids,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                };
                info!(duration_ms = receipt.duration_ms, "Transaction committed");
                return Ok(receipt);
            }
            Err(e) => e,
        };

        if !undo.is_empty() {
            Self::rollback(target, undo).await;
            bump(&self.counters.transactions_rolled_back);
        }
        Err(self.fail(error))
    }

    fn fail(&self, error: RuntimeError) -> RuntimeError {
        bump(&self.counters.transactions_failed);
        error!(error = %error, "Transaction failed");
        error
    }

    async fn apply<T: TransactionTarget + ?Sized>(
        &self,
        target: &T,
        tx: &Transaction,
        deadline: tokio::time::Instant,
        timeout: Duration,
        undo: &mut Vec<Undo<T::Created>>,
    ) -> RuntimeResult<Vec<String>> {
        let failed = |index: usize, reason: String| RuntimeError::TransactionApply {
            transaction_id: tx.id.clone(),
            index,
            reason,
        };

        for (index, operation) in tx.operations.iter().enumerate() {
            match operation {
                TransactionOperation::Create {
                    actor_type,
                    actor_id,
                    config,
                } => {
                    let created = target
                        .create(actor_type, actor_id, config.clone())
                        .await
                        .map_err(|e| failed(index, e.to_string()))?;
                    undo.push(Undo::Discard(created));
                }
                TransactionOperation::Update { actor_id, update } => {
                    let snapshot = target
                        .snapshot(actor_id)
                        .ok_or_else(|| failed(index, format!("actor '{actor_id}' not found")))?;
                    undo.push(Undo::Restore(snapshot));
                    if !target.update(actor_id, update).await {
                        return Err(failed(index, format!("actor '{actor_id}' not found")));
                    }
                }
                TransactionOperation::Delete { actor_id } => {
                    let snapshot = target
                        .snapshot(actor_id)
                        .ok_or_else(|| failed(index, format!("actor '{actor_id}' not found")))?;
                    undo.push(Undo::Restore(snapshot));
                    if !target.destroy(actor_id).await {
                        return Err(failed(index, format!("actor '{actor_id}' not found")));
                    }
                }
                TransactionOperation::Message { .. } => continue,
            }
            debug!(index, target = operation.target(), "Applied operation");
            if tokio::time::Instant::now() >= deadline {
                return Err(timed_out(tx, timeout));
            }
        }

        let mut message_ids = Vec::new();
        for (index, operation) in tx.operations.iter().enumerate() {
            if let TransactionOperation::Message { from, to, payload } = operation {
                let message = target
                    .send(from, to, payload.clone())
                    .map_err(|e| failed(index, e.to_string()))?;
                message_ids.push(message.id);
            }
        }
        Ok(message_ids)
    }

    async fn rollback<T: TransactionTarget + ?Sized>(target: &T, undo: Vec<Undo<T::Created>>) {
        for record in undo.into_iter().rev() {
            match record {
                Undo::Discard(created) => {
                    if target.discard(created).await {
                        debug!("Rolled back create");
                    }
                }
                Undo::Restore(snapshot) => {
                    let actor_id = snapshot.id.clone();
                    match target.restore(snapshot).await {
                        Ok(()) => debug!(%actor_id, "Restored actor"),
                        Err(e) => error!(%actor_id, error = %e, "Failed to restore actor during rollback"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::actor::{ActorConfig, ActorState, StateUpdate};
    use crate::common::Value;
    use crate::message::Message;

    #[derive(Default)]
    struct MemoryStore {
        actors: Mutex<HashMap<String, ActorState>>,
        sent: Mutex<Vec<Message>>,
    }

    impl MemoryStore {
        fn with(ids: &[&str]) -> Self {
            let store = Self::default();
            for id in ids {
                store
                    .actors
                    .lock()
                    .insert((*id).to_string(), ActorState::new(*id, "basic", "default", Default::default()));
            }
            store
        }

        fn property(&self, id: &str, key: &str) -> Option<Value> {
            self.actors.lock().get(id).and_then(|s| s.properties.get(key).cloned())
        }
    }

    #[async_trait]
    impl TransactionTarget for MemoryStore {
        type Created = String;

        fn actor_exists(&self, actor_id: &str) -> bool {
            self.actors.lock().contains_key(actor_id)
        }

        fn is_type_registered(&self, actor_type: &str) -> bool {
            matches!(actor_type, "basic" | "explode" | "slow")
        }

        fn snapshot(&self, actor_id: &str) -> Option<ActorSnapshot> {
            self.actors.lock().get(actor_id).cloned()
        }

        async fn create(&self, actor_type: &str, actor_id: &str, config: ActorConfig) -> RuntimeResult<String> {
            match actor_type {
                "explode" => return Err(RuntimeError::InvalidConfiguration("boom".to_string())),
                "slow" => tokio::time::sleep(Duration::from_millis(200)).await,
                _ => {}
            }
            self.actors.lock().insert(
                actor_id.to_string(),
                ActorState::new(actor_id, actor_type, "default", config.properties),
            );
            Ok(actor_id.to_string())
        }

        async fn discard(&self, created: String) -> bool {
            self.actors.lock().remove(&created).is_some()
        }

        async fn update(&self, actor_id: &str, update: &StateUpdate) -> bool {
            self.actors
                .lock()
                .get_mut(actor_id)
                .map(|state| update.apply_to(state))
                .is_some()
        }

        async fn destroy(&self, actor_id: &str) -> bool {
            self.actors.lock().remove(actor_id).is_some()
        }

        async fn restore(&self, snapshot: ActorSnapshot) -> RuntimeResult<()> {
            self.actors.lock().insert(snapshot.id.clone(), snapshot);
            Ok(())
        }

        fn send(&self, from: &str, to: &str, payload: Value) -> RuntimeResult<Message> {
            let message = Message::new(from, to, payload);
            self.sent.lock().push(message.clone());
            Ok(message)
        }
    }

    fn manager() -> TransactionManager {
        TransactionManager::new(&TransactionConfig::default(), Arc::new(RuntimeCounters::default()))
    }

    fn gated(max_concurrent: usize) -> Arc<TransactionManager> {
        let config = TransactionConfig {
            max_concurrent,
            ..TransactionConfig::default()
        };
        Arc::new(TransactionManager::new(&config, Arc::new(RuntimeCounters::default())))
    }

    fn spawn_create(
        manager: &Arc<TransactionManager>,
        store: &Arc<MemoryStore>,
        actor_type: &str,
        actor_id: &str,
    ) -> tokio::task::JoinHandle<RuntimeResult<TransactionReceipt>> {
        let (manager, store) = (Arc::clone(manager), Arc::clone(store));
        let tx = Transaction::new(vec![create(actor_type, actor_id)]);
        tokio::spawn(async move { manager.execute(&*store, tx).await })
    }

    fn create(actor_type: &str, actor_id: &str) -> TransactionOperation {
        TransactionOperation::Create {
            actor_type: actor_type.to_string(),
            actor_id: actor_id.to_string(),
            config: ActorConfig::new(),
        }
    }

    fn update(actor_id: &str, key: &str, value: i64) -> TransactionOperation {
        TransactionOperation::Update {
            actor_id: actor_id.to_string(),
            update: StateUpdate::new().set(key, value),
        }
    }

    #[tokio::test]
    async fn test_commit_defers_messages() {
        let store = MemoryStore::with(&["a"]);
        let manager = manager();
        let tx = Transaction::new(vec![
            TransactionOperation::Message {
                from: "a".to_string(),
                to: "b".to_string(),
                payload: Value::from("hi"),
            },
            create("basic", "b"),
            update("a", "hp", 5),
        ]);

        let receipt = manager.execute(&store, tx).await.unwrap();
        assert_eq!(receipt.operations_applied, 3);
        assert_eq!(receipt.message_ids.len(), 1);
        assert_eq!(store.property("a", "hp"), Some(Value::Int(5)));
        assert_eq!(store.sent.lock().len(), 1);
        assert_eq!(manager.counters.transactions_committed.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_actor_rejected_without_effects() {
        let store = MemoryStore::with(&["a"]);
        let manager = manager();
        let tx = Transaction::new(vec![update("a", "hp", 1), create("basic", "c"), update("ghost", "hp", 2)]);

        let err = manager.execute(&store, tx).await.unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_VALIDATION");
        assert_eq!(store.property("a", "hp"), None);
        assert!(!store.actor_exists("c"));
    }

    #[test]
    fn test_validation_tracks_creates_and_deletes() {
        let store = MemoryStore::with(&["a"]);
        let manager = manager();

        let ok = Transaction::new(vec![
            create("basic", "b"),
            update("b", "x", 1),
            TransactionOperation::Delete {
                actor_id: "a".to_string(),
            },
            create("basic", "a"),
        ]);
        assert!(manager.validate(&store, &ok).is_ok());

        let deleted_then_updated = Transaction::new(vec![
            TransactionOperation::Delete {
                actor_id: "a".to_string(),
            },
            update("a", "x", 1),
        ]);
        assert!(manager.validate(&store, &deleted_then_updated).is_err());

        let duplicate = Transaction::new(vec![create("basic", "a")]);
        assert!(manager.validate(&store, &duplicate).is_err());

        let unknown_type = Transaction::new(vec![create("dragon", "d")]);
        assert!(manager.validate(&store, &unknown_type).is_err());
    }

    #[tokio::test]
    async fn test_apply_failure_rolls_back() {
        let store = MemoryStore::with(&["a", "z"]);
        let manager = manager();
        let tx = Transaction::new(vec![
            create("basic", "b"),
            update("a", "hp", 9),
            TransactionOperation::Delete {
                actor_id: "z".to_string(),
            },
            TransactionOperation::Message {
                from: "a".to_string(),
                to: "a".to_string(),
                payload: Value::Null,
            },
            create("explode", "c"),
        ]);

        let err = manager.execute(&store, tx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::TransactionApply { index: 4, .. }));
        assert!(!store.actor_exists("b"));
        assert!(store.actor_exists("z"));
        assert_eq!(store.property("a", "hp"), None);
        assert!(store.sent.lock().is_empty());
        assert_eq!(manager.counters.transactions_rolled_back.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let store = MemoryStore::with(&["a"]);
        let manager = manager();
        let tx = Transaction::new(vec![update("a", "hp", 1), create("slow", "s")])
            .with_timeout(Duration::from_millis(20));

        let err = manager.execute(&store, tx).await.unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_TIMEOUT");
        assert_eq!(store.property("a", "hp"), None);
        assert!(!store.actor_exists("s"));
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_bounds_concurrent_applies() {
        let store = Arc::new(MemoryStore::default());
        let manager = gated(2);
        let runs: Vec<_> = ["s1", "s2", "s3"]
            .into_iter()
            .map(|id| spawn_create(&manager, &store, "slow", id))
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.in_flight(), 2);
        assert!(store.actors.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.actors.lock().len(), 2);
        assert_eq!(manager.in_flight(), 1);

        for run in runs {
            run.await.unwrap().unwrap();
        }
        assert_eq!(store.actors.lock().len(), 3);
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_wait_counts_against_timeout() {
        let store = Arc::new(MemoryStore::default());
        let manager = gated(1);
        let holder = spawn_create(&manager, &store, "slow", "s1");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.in_flight(), 1);

        let tx = Transaction::new(vec![create("basic", "b")]).with_timeout(Duration::from_millis(50));
        let err = manager.execute(&*store, tx).await.unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_TIMEOUT");
        assert!(!store.actor_exists("b"));
        assert_eq!(manager.counters.transactions_rolled_back.load(std::sync::atomic::Ordering::Relaxed), 0);

        holder.await.unwrap().unwrap();
        assert!(store.actor_exists("s1"));
    }

    #[tokio::test]
    async fn test_closed_gate_fails_with_shutdown() {
        let store = MemoryStore::default();
        let manager = manager();
        manager.close();

        let err = manager
            .execute(&store, Transaction::new(vec![create("basic", "late")]))
            .await
            .unwrap_err();
        assert_eq!(err, RuntimeError::Shutdown);
        assert!(!store.actor_exists("late"));
    }
}
