// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Token-bucket rate limiting for the Upstream API Client (spec §4.4,
//! §5: "a minimum inter-request interval... enforced per process").
//!
//! This is the one deliberate process-wide singleton in the design
//! (spec §9, "Global mutable state"): every call site that talks to
//! the upstream hosting API shares one `RateLimiter` instance so that
//! `rate_limit_delay` bounds spacing across the whole process, not
//! just within one repository's requests.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{Quota, RateLimiter as GovernorLimiter};

type Limiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Serializes upstream API calls so that consecutive requests are
/// spaced at least `delay` apart.
pub struct RateLimiter {
    inner: Limiter,
}

impl RateLimiter {
    /// `delay` is the minimum inter-request interval; `settings.rate_limit_delay`
    /// in the configuration table (spec §6).
    pub fn new(delay: Duration) -> Self {
        let delay = delay.max(Duration::from_millis(1));
        // One token refilled every `delay`, burst capacity of one: this
        // is exactly "at most one request per `delay`", not a bucket
        // that lets a backlog of skipped sleeps fire back-to-back.
        let quota = Quota::with_period(delay)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).unwrap()));
        Self {
            inner: GovernorLimiter::direct(quota),
        }
    }

    /// Blocks until a request is allowed to proceed.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn second_acquire_is_delayed_by_roughly_the_configured_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
