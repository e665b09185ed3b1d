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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actor::{ActorConfig, StateUpdate};
use crate::common::{new_id, now_millis, TimestampMs, Value};

fn transaction_id() -> String {
    new_id("tx")
}

/// An ordered batch of actor operations applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction id, `tx_<uuidv7>` unless supplied.
    #[serde(default = "transaction_id")]
    pub id: String,
    /// Operations in apply order.
    pub operations: Vec<TransactionOperation>,
    /// Creation time.
    #[serde(default = "now_millis")]
    pub created_at: TimestampMs,
    /// Deadline for gate wait plus apply; the manager default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Transaction {
    /// A transaction with a fresh id.
    #[must_use]
    pub fn new(operations: Vec<TransactionOperation>) -> Self {
        Self {
            id: transaction_id(),
            operations,
            created_at: now_millis(),
            timeout_ms: None,
        }
    }

    /// Overrides the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets a per-transaction timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// One step of a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionOperation {
    /// Creates an actor.
    Create {
        /// Registered actor type.
        #[serde(rename = "actorType")]
        actor_type: String,
        /// Id for the new actor.
        #[serde(rename = "actorId")]
        actor_id: String,
        /// Creation descriptor.
        #[serde(default)]
        config: ActorConfig,
    },
    /// Applies a state update.
    Update {
        /// Target actor.
        #[serde(rename = "actorId")]
        actor_id: String,
        /// The update.
        update: StateUpdate,
    },
    /// Destroys an actor.
    Delete {
        /// Target actor.
        #[serde(rename = "actorId")]
        actor_id: String,
    },
    /// Sends a message once every other operation has succeeded.
    Message {
        /// Sender id.
        from: String,
        /// Recipient id.
        to: String,
        /// Message body.
        #[serde(default)]
        payload: Value,
    },
}

impl TransactionOperation {
    /// Actor the operation acts on.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Create { actor_id, .. } | Self::Update { actor_id, .. } | Self::Delete { actor_id } => actor_id,
            Self::Message { to, .. } => to,
        }
    }
}

/// Summary of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// The committed transaction.
    pub transaction_id: String,
    /// Operations applied, messages included.
    pub operations_applied: usize,
    /// Ids of the messages enqueued at commit.
    pub message_ids: Vec<String>,
    /// Wall time from validation to commit.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_shape() {
        let json = serde_json::json!({
            "operations": [
                { "type": "create", "actorType": "basic", "actorId": "a" },
                { "type": "update", "actorId": "a", "update": { "properties": { "hp": 3 } } },
                { "type": "message", "from": "a", "to": "b" },
                { "type": "delete", "actorId": "a" }
            ],
            "timeoutMs": 50
        });
        let tx: Transaction = serde_json::from_value(json).unwrap();

        assert!(tx.id.starts_with("tx_"));
        assert_eq!(tx.timeout_ms, Some(50));
        assert_eq!(tx.operations.len(), 4);
        assert_eq!(tx.operations[2].target(), "b");
        assert!(matches!(
            &tx.operations[0],
            TransactionOperation::Create { config, .. } if config.namespace.is_none()
        ));
    }

    #[test]
    fn test_builder() {
        let tx = Transaction::new(Vec::new())
            .with_id("tx_custom")
            .with_timeout(Duration::from_secs(2));
        assert_eq!(tx.id, "tx_custom");
        assert_eq!(tx.timeout_ms, Some(2000));
    }
}
