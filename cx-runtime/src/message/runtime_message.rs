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

use serde::{Deserialize, Serialize};

use crate::common::{new_id, now_millis, TimestampMs, Value};

/// A fire-and-forget message between actors.
///
/// The runtime queue owns a message from enqueue until delivery; afterwards
/// the receiving actor's behavior sees it by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Time-ordered id (`msg_<uuidv7>`).
    pub id: String,
    /// Sender id; not required to be a live actor.
    pub from: String,
    /// Target actor id.
    pub to: String,
    /// Payload.
    pub payload: Value,
    /// Enqueue time.
    pub timestamp: TimestampMs,
}

impl Message {
    /// Creates a message with a fresh id and the current time.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, payload: Value) -> Self {
        Self {
            id: new_id("msg"),
            from: from.into(),
            to: to.into(),
            payload,
            timestamp: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let first = Message::new("a", "b", Value::Null);
        let second = Message::new("a", "b", Value::Null);
        assert!(first.id.starts_with("msg_"));
        assert_ne!(first.id, second.id);
        assert!(first.timestamp <= second.timestamp);
    }
}
