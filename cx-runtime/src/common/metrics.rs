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

//! Runtime counters and the metrics snapshot built from them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Monotonic counters shared by the runtime's loops and handles.
#[derive(Debug)]
pub struct RuntimeCounters {
    started: Instant,
    pub(crate) actors_created: AtomicU64,
    pub(crate) actors_destroyed: AtomicU64,
    pub(crate) messages_sent: AtomicU64,
    pub(crate) messages_delivered: AtomicU64,
    pub(crate) messages_dropped: AtomicU64,
    pub(crate) transactions_committed: AtomicU64,
    pub(crate) transactions_failed: AtomicU64,
    pub(crate) transactions_rolled_back: AtomicU64,
    pub(crate) scripts_executed: AtomicU64,
}

impl Default for RuntimeCounters {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            actors_created: AtomicU64::new(0),
            actors_destroyed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            transactions_committed: AtomicU64::new(0),
            transactions_failed: AtomicU64::new(0),
            transactions_rolled_back: AtomicU64::new(0),
            scripts_executed: AtomicU64::new(0),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RuntimeCounters {
    /// Builds a snapshot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, active_actors: usize) -> RuntimeMetrics {
        let uptime = self.started.elapsed();
        let seconds = uptime.as_secs_f64().max(f64::EPSILON);
        let messages_sent = self.messages_sent.load(Ordering::Relaxed);
        let transactions_committed = self.transactions_committed.load(Ordering::Relaxed);
        let transactions_failed = self.transactions_failed.load(Ordering::Relaxed);

        RuntimeMetrics {
            active_actors,
            actors_created: self.actors_created.load(Ordering::Relaxed),
            actors_destroyed: self.actors_destroyed.load(Ordering::Relaxed),
            messages_sent,
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            transactions_committed,
            transactions_failed,
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            scripts_executed: self.scripts_executed.load(Ordering::Relaxed),
            messages_per_second: messages_sent as f64 / seconds,
            transactions_per_second: (transactions_committed + transactions_failed) as f64 / seconds,
            uptime_ms: u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
            resident_memory_bytes: resident_memory_bytes(),
        }
    }
}

/// Point-in-time runtime metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMetrics {
    /// Actors currently registered.
    pub active_actors: usize,
    /// Actors created since launch.
    pub actors_created: u64,
    /// Actors destroyed since launch.
    pub actors_destroyed: u64,
    /// Messages accepted by `send_message` (including script and transaction sends).
    pub messages_sent: u64,
    /// Messages handed to an actor inbox.
    pub messages_delivered: u64,
    /// Messages dropped for unknown or stopping targets.
    pub messages_dropped: u64,
    /// Transactions applied.
    pub transactions_committed: u64,
    /// Transactions that failed validation, apply or timeout.
    pub transactions_failed: u64,
    /// Transactions whose applied operations were compensated.
    pub transactions_rolled_back: u64,
    /// Scripts run through `execute_script`.
    pub scripts_executed: u64,
    /// Average send rate since launch.
    pub messages_per_second: f64,
    /// Average transaction rate since launch.
    pub transactions_per_second: f64,
    /// Time since launch.
    pub uptime_ms: u64,
    /// Resident set size, where the platform exposes it.
    pub resident_memory_bytes: Option<u64>,
}

/// Reads the resident set size from `/proc/self/statm`.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}

#[cfg(not(target_os = "linux"))]
const fn resident_memory_bytes() -> Option<u64> {
    None
}
