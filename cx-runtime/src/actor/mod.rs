//! Actors: configuration, state, behaviors and the live actor wrapper.
//!
//! # Key Components
//!
//! *   [`ActorConfig`]: the descriptor passed to `create_actor`.
//! *   [`ActorState`] / [`ActorSnapshot`]: an actor's mutable state and copies of it.
//! *   [`ActorFactory`]: builds behaviors from registered type tags.
//! *   [`ManagedActor`]: the running actor, its inbox and its task.
//! *   [`NamespaceRegistry`]: named partitions of actor ids.
//! *   [`BasicActor`] and [`ScriptedActor`]: the built-in types.

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

// --- Public Re-exports ---
pub use actor_config::{ActorConfig, StateUpdate};
pub use actor_state::{ActorInfo, ActorSnapshot, ActorState};
pub use builtin::{BasicActor, ScriptedActor};
pub use context::ActorContext;
pub use factory::{ActorFactory, BehaviorConstructor};
pub use managed_actor::ManagedActor;
pub(crate) use managed_actor::ActorEnvironment;
pub use namespace::NamespaceRegistry;

// --- Submodules ---

/// Defines [`ActorConfig`] and [`StateUpdate`].
mod actor_config;
mod actor_state;
/// Built-in actor types.
mod builtin;
/// Defines [`ActorContext`].
mod context;
mod factory;
/// Defines [`ManagedActor`].
mod managed_actor;
mod namespace;
