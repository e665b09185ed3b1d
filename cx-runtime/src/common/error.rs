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

//! Error taxonomy for runtime, interpreter, transaction and dispatch operations.

use thiserror::Error;

/// Result alias used across the runtime.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by the public runtime API.
///
/// Validation-phase variants (`InvalidConfiguration`, `TransactionValidation`,
/// `InterpreterValidation`) are returned before any state is touched and are
/// safe to retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// An actor with this id is already registered (or still being destroyed).
    #[error("Actor already exists: {0}")]
    DuplicateActor(String),

    /// The referenced actor, namespace, interpreter or command does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of resource was looked up.
        kind: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// An actor configuration descriptor was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A swap candidate failed validation.
    #[error("Interpreter '{name}' failed validation: {reason}")]
    InterpreterValidation {
        /// Slot the candidate was meant for.
        name: String,
        /// Why the validator rejected it.
        reason: String,
    },

    /// A transaction failed its structural check; nothing was applied.
    #[error("Transaction {transaction_id} rejected: {reason}")]
    TransactionValidation {
        /// The rejected transaction.
        transaction_id: String,
        /// The first problem found.
        reason: String,
    },

    /// A transaction did not finish inside its timeout; applied operations were rolled back.
    #[error("Transaction {transaction_id} timed out after {timeout_ms}ms")]
    TransactionTimeout {
        /// The timed out transaction.
        transaction_id: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// An operation failed during apply; applied operations were rolled back.
    #[error("Transaction {transaction_id} failed at operation {index}: {reason}")]
    TransactionApply {
        /// The failed transaction.
        transaction_id: String,
        /// Position of the failing operation.
        index: usize,
        /// The underlying failure.
        reason: String,
    },

    /// No handler is registered for a protocol or command.
    #[error("No route: {0}")]
    ProtocolRouting(String),

    /// Script execution failed inside an interpreter.
    #[error("Script error: {0}")]
    Script(String),

    /// The runtime has been shut down.
    #[error("Runtime is shut down")]
    Shutdown,
}

impl RuntimeError {
    /// Convenience constructor for [`RuntimeError::NotFound`] on actors.
    pub fn actor_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Actor",
            id: id.into(),
        }
    }

    /// Convenience constructor for [`RuntimeError::NotFound`] on interpreters.
    pub fn interpreter_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Interpreter",
            id: id.into(),
        }
    }

    /// Machine-readable error code carried in protocol responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateActor(_) => "DUPLICATE_ACTOR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::InterpreterValidation { .. } => "INTERPRETER_VALIDATION",
            Self::TransactionValidation { .. } => "TRANSACTION_VALIDATION",
            Self::TransactionTimeout { .. } => "TRANSACTION_TIMEOUT",
            Self::TransactionApply { .. } => "TRANSACTION_APPLY",
            Self::ProtocolRouting(_) => "PROTOCOL_ROUTING",
            Self::Script(_) => "SCRIPT_ERROR",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}
