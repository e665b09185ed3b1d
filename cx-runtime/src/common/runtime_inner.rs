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

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::actor::{ActorEnvironment, ActorFactory, ManagedActor, NamespaceRegistry};
use crate::common::config::RuntimeConfig;
use crate::common::metrics::RuntimeCounters;
use crate::interpreter::InterpreterManager;
use crate::message::{Message, MessageQueue};
use crate::traits::ConsciousnessProcessor;
use crate::transaction::TransactionManager;

/// Shared state behind every [`ActorRuntime`](crate::common::ActorRuntime) handle.
pub(crate) struct RuntimeInner {
    /// Configuration the runtime was launched with.
    pub(crate) config: RuntimeConfig,

    /// Live actors keyed by id. Entries stay, flagged as stopping, until destroy completes.
    pub(crate) actors: DashMap<String, Arc<ManagedActor>>,

    pub(crate) namespaces: NamespaceRegistry,

    pub(crate) factory: ActorFactory,

    pub(crate) transactions: TransactionManager,

    pub(crate) processor: Arc<dyn ConsciousnessProcessor>,

    pub(crate) counters: Arc<RuntimeCounters>,

    /// Interpreters, queue, task tracker and root token handed to each actor.
    pub(crate) environment: ActorEnvironment,
}

impl RuntimeInner {
    /// Builds the inner state and returns the receiving side of the message queue.
    pub(crate) fn new(
        config: RuntimeConfig,
        processor: Arc<dyn ConsciousnessProcessor>,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let counters = Arc::new(RuntimeCounters::default());
        let (queue, receiver) = MessageQueue::new(Arc::clone(&counters));
        let inner = Self {
            actors: DashMap::new(),
            namespaces: NamespaceRegistry::new(),
            factory: ActorFactory::new(),
            transactions: TransactionManager::new(&config.transactions, Arc::clone(&counters)),
            processor,
            counters,
            environment: ActorEnvironment {
                interpreters: Arc::new(InterpreterManager::new(&config.interpreters)),
                queue,
                tracker: TaskTracker::new(),
                parent_token: CancellationToken::new(),
            },
            config,
        };
        (inner, receiver)
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.environment.parent_token
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.environment.tracker
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.environment.parent_token.is_cancelled()
    }

    /// Live actor by id, cloned out of the map so no guard is held.
    pub(crate) fn actor(&self, actor_id: &str) -> Option<Arc<ManagedActor>> {
        self.actors.get(actor_id).map(|entry| Arc::clone(entry.value()))
    }
}
