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

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::common::{now_millis, TimestampMs};

/// Describes how a client talks to one protocol.
///
/// Generated when a custom handler is registered, and on demand for the
/// built-in transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContract {
    /// Protocol name.
    pub protocol: String,
    /// Rust type name of the request body the handler expects.
    pub request_type: String,
    /// Commands reachable over the protocol, sorted.
    pub commands: Vec<String>,
    /// When the contract was generated.
    pub generated_at: TimestampMs,
}

impl ClientContract {
    /// Builds a contract for `protocol` whose requests carry `T`.
    #[must_use]
    pub fn generate<T: ?Sized>(protocol: impl Into<String>, mut commands: Vec<String>) -> Self {
        commands.sort();
        commands.dedup();
        Self {
            protocol: protocol.into(),
            request_type: std::any::type_name::<T>().to_string(),
            commands,
            generated_at: now_millis(),
        }
    }

    /// Renders a plain-text client stub describing the request envelope.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Client contract: {}", self.protocol);
        let _ = writeln!(out, "# request type: {}", self.request_type);
        let _ = writeln!(out, "# generated at: {}", self.generated_at);
        out.push('\n');
        out.push_str("request {\n");
        out.push_str("  id: string            # echoed in the response\n");
        let _ = writeln!(out, "  protocolType: \"{}\"", self.protocol);
        out.push_str("  command: string\n");
        let _ = writeln!(out, "  data: {}", self.request_type);
        out.push_str("  headers: map<string, string>\n");
        out.push_str("  timestamp: u64         # ms since epoch\n");
        out.push_str("  clientId: string?\n");
        out.push_str("}\n\n");
        out.push_str("response {\n");
        out.push_str("  id: string\n  success: bool\n  data: any\n");
        out.push_str("  errorMessage: string?\n  errorCode: string?\n");
        out.push_str("  headers: map<string, string>\n  timestamp: u64\n  processingTimeMs: u64\n");
        out.push_str("}\n");
        if !self.commands.is_empty() {
            out.push_str("\ncommands:\n");
            for command in &self.commands {
                let _ = writeln!(out, "  - {command}");
            }
        }
        out
    }
}
