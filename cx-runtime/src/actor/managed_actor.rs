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

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, trace, warn};

use crate::actor::{ActorContext, ActorInfo, ActorSnapshot, ActorState};
use crate::common::Value;
use crate::interpreter::{EmittedMessage, InterpreterManager};
use crate::message::{Message, MessageQueue};
use crate::traits::ActorBehavior;

/// A live actor: its state, its behavior and the task draining its inbox.
///
/// The runtime keeps one `Arc<ManagedActor>` per id in its actor map; the
/// actor's task holds another until it exits. State is guarded by a
/// `parking_lot` lock that is never held across an await point.
pub struct ManagedActor {
    id: String,
    state: RwLock<ActorState>,
    behavior: Mutex<Box<dyn ActorBehavior>>,
    inbox: mpsc::Sender<Message>,
    cancellation_token: CancellationToken,
    stopping: AtomicBool,
    removed: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ManagedActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedActor")
            .field("id", &self.id)
            .field("stopping", &self.is_stopping())
            .finish_non_exhaustive()
    }
}

/// Everything an actor task needs from the runtime.
pub(crate) struct ActorEnvironment {
    pub(crate) interpreters: Arc<InterpreterManager>,
    pub(crate) queue: MessageQueue,
    pub(crate) tracker: TaskTracker,
    pub(crate) parent_token: CancellationToken,
}

impl ManagedActor {
    /// Spawns the actor's task and returns the shared handle.
    pub(crate) fn spawn(
        state: ActorState,
        behavior: Box<dyn ActorBehavior>,
        inbox_capacity: usize,
        environment: &ActorEnvironment,
    ) -> Arc<Self> {
        let (inbox, receiver) = mpsc::channel(inbox_capacity.max(1));
        let actor = Arc::new(Self {
            id: state.id.clone(),
            state: RwLock::new(state),
            behavior: Mutex::new(behavior),
            inbox,
            cancellation_token: environment.parent_token.child_token(),
            stopping: AtomicBool::new(false),
            removed: CancellationToken::new(),
            task: Mutex::new(None),
        });

        let handle = environment.tracker.spawn(Arc::clone(&actor).wake(
            receiver,
            Arc::clone(&environment.interpreters),
            environment.queue.clone(),
        ));
        *actor.task.lock() = Some(handle);
        actor
    }

    #[instrument(skip_all, fields(actor_id = %self.id))]
    async fn wake(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<Message>,
        interpreters: Arc<InterpreterManager>,
        queue: MessageQueue,
    ) {
        let ((), outbox) = self.with_context(&interpreters, |behavior, context| behavior.on_start(context));
        self.flush(outbox, &queue);
        debug!("Actor started");

        loop {
            tokio::select! {
                biased;

                () = self.cancellation_token.cancelled() => {
                    trace!("Actor received stop signal");
                    break;
                }

                incoming = receiver.recv() => {
                    let Some(message) = incoming else { break; };
                    self.handle_message(&message, &interpreters, &queue);
                }
            }
        }

        receiver.close();
        let mut discarded = 0usize;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "Dropped queued messages for stopped actor");
        }

        let final_state = self.state.read().clone();
        self.behavior.lock().on_stop(&final_state);
        debug!("Actor stopped");
    }

    fn handle_message(&self, message: &Message, interpreters: &InterpreterManager, queue: &MessageQueue) {
        trace!(message_id = %message.id, from = %message.from, "Handling message");
        {
            let mut state = self.state.write();
            state.message_count += 1;
            state.touch();
        }

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.with_context(interpreters, |behavior, context| behavior.handle_message(message, context))
        }));

        match outcome {
            Ok((Ok(()), outbox)) => self.flush(outbox, queue),
            Ok((Err(e), _)) => {
                warn!(message_id = %message.id, error = %e, "Message handler failed");
            }
            Err(_) => {
                error!(message_id = %message.id, "Message handler panicked");
            }
        }
    }

    fn with_context<R>(
        &self,
        interpreters: &InterpreterManager,
        f: impl FnOnce(&mut dyn ActorBehavior, &mut ActorContext<'_>) -> R,
    ) -> (R, Vec<EmittedMessage>) {
        let mut behavior = self.behavior.lock();
        let mut state = self.state.write();
        let mut context = ActorContext::new(&mut *state, interpreters);
        let result = f(&mut **behavior, &mut context);
        (result, context.into_outbox())
    }

    fn flush(&self, outbox: Vec<EmittedMessage>, queue: &MessageQueue) {
        for emitted in outbox {
            if let Err(e) = queue.enqueue(Message::new(self.id.clone(), emitted.to, emitted.payload)) {
                debug!(error = %e, "Could not enqueue message from actor");
            }
        }
    }

    /// Requests the task to stop and waits for it to exit.
    pub(crate) async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.cancellation_token.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(actor_id = %self.id, "Actor task failed: {e}");
            }
        }
    }

    /// Claims the right to destroy this actor. Only the first caller wins.
    pub(crate) fn mark_stopping(&self) -> bool {
        self.stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Signals that the runtime no longer holds this instance under its id.
    pub(crate) fn mark_removed(&self) {
        self.removed.cancel();
    }

    /// Resolves once a destroy of this instance has fully completed.
    pub(crate) async fn removed(&self) {
        self.removed.cancelled().await;
    }

    /// Id of the actor.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a destroy is in progress.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ActorSnapshot {
        self.state.read().clone()
    }

    /// Listing row.
    #[must_use]
    pub fn info(&self) -> ActorInfo {
        self.state.read().info()
    }

    /// Owning namespace.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.state.read().namespace.clone()
    }

    /// Runs `f` with exclusive access to the state.
    pub fn update<R>(&self, f: impl FnOnce(&mut ActorState) -> R) -> R {
        f(&mut *self.state.write())
    }

    /// Current consciousness blob.
    #[must_use]
    pub fn consciousness(&self) -> Option<Value> {
        self.state.read().consciousness.clone()
    }

    /// Replaces the consciousness blob.
    pub fn set_consciousness(&self, blob: Value) {
        self.state.write().consciousness = Some(blob);
    }

    /// Asks the behavior whether the actor should be swept.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        let behavior = self.behavior.lock();
        let state = self.state.read();
        behavior.is_inactive(&state)
    }

    /// Sender into the actor's inbox.
    pub(crate) fn inbox(&self) -> mpsc::Sender<Message> {
        self.inbox.clone()
    }
}
