//! Consciousness integration: event types and the shipped processors.
//!
//! The scoring logic itself is external; the runtime only stores an opaque
//! blob per actor and forwards state changes to a
//! [`ConsciousnessProcessor`](crate::traits::ConsciousnessProcessor).

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
pub use affective::AffectiveProcessor;
pub use events::{ConsciousnessEvent, EntityChange, SceneUpdate};
pub use noop::NoopProcessor;

use thiserror::Error;

/// Failure reported by a consciousness processor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("consciousness processor failed: {0}")]
pub struct ProcessorError(pub String);

/// Result alias for processor calls.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

// --- Submodules ---

mod affective;
/// Unity-facing event types.
mod events;
mod noop;
