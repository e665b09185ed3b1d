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

//! Per-connection token bucket.

use std::time::{Duration, Instant};

use super::config::RateLimitConfig;
use super::types::TransportError;

/// Token bucket guarding one connection.
///
/// The bucket starts full at `burst_size` tokens and refills continuously at
/// `requests_per_second`. A disabled limiter admits everything.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
    enabled: bool,
}

impl RateLimiter {
    /// Create a limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            tokens: f64::from(config.burst_size),
            capacity: f64::from(config.burst_size),
            refill_rate: f64::from(config.requests_per_second),
            last_refill: Instant::now(),
            enabled: config.enabled && config.requests_per_second > 0,
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take one token or report how long the caller should back off.
    ///
    /// # Errors
    ///
    /// [`TransportError::RateLimited`] when the bucket is empty.
    pub fn check(&mut self) -> Result<(), TransportError> {
        if self.try_acquire() {
            return Ok(());
        }
        let wait = self.time_until_available();
        Err(TransportError::RateLimited {
            retry_after_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX).max(1),
        })
    }

    /// Time until the next token; zero when one is ready or limiting is off.
    #[must_use]
    pub fn time_until_available(&mut self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    /// Whether limiting is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
    }
}
