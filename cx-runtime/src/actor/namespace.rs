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

use dashmap::DashMap;
use tracing::trace;

/// Named partitions of actor ids.
///
/// Namespaces are created on first use and never removed, even when empty.
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    namespaces: DashMap<String, HashSet<String>>,
}

impl NamespaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `actor_id` to `namespace`, creating the namespace if needed.
    pub fn add(&self, namespace: &str, actor_id: &str) {
        trace!(namespace, actor_id, "Adding actor to namespace");
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(actor_id.to_string());
    }

    /// Removes `actor_id` from `namespace`. Returns `false` if it was not a member.
    pub fn remove(&self, namespace: &str, actor_id: &str) -> bool {
        self.namespaces
            .get_mut(namespace)
            .is_some_and(|mut members| members.remove(actor_id))
    }

    /// Whether `actor_id` is a member of `namespace`.
    #[must_use]
    pub fn contains(&self, namespace: &str, actor_id: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|members| members.contains(actor_id))
    }

    /// Sorted members of `namespace`; empty for unknown namespaces.
    #[must_use]
    pub fn members(&self, namespace: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .namespaces
            .get(namespace)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Sorted namespace names.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}
