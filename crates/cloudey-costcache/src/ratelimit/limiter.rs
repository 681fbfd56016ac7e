//! Per-tenant sliding-window rate limiter
//!
//! Each tenant has its own call history; a call is admitted when fewer than
//! `calls_per_second` calls happened in the last second and fewer than
//! `calls_per_minute` in the last minute. Callers over budget are delayed,
//! never rejected.
//!
//! Waiters for the same tenant are not served in arrival order: every waiter
//! re-checks after its own sleep, and whichever re-checks first after a slot
//! frees up takes it.

use cloudey_common::TenantId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

/// Floor for computed waits so a retry never spins
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Rate limits applied to every tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls in any one-second window
    pub calls_per_second: u32,
    /// Maximum calls in any sixty-second window
    pub calls_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Provider limit is 20/s and 150/min; keep some headroom
        Self {
            calls_per_second: 18,
            calls_per_minute: 140,
        }
    }
}

/// Delay-only rate limiter keyed by tenant
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Admitted call instants per tenant, oldest first
    calls: DashMap<TenantId, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            calls: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether `tenant` could call right now, without recording anything
    ///
    /// Returns `(allowed, wait)`; `wait` is zero when allowed.
    pub fn can_make_request(&self, tenant: TenantId) -> (bool, Duration) {
        let Some(calls) = self.calls.get(&tenant) else {
            return (true, Duration::ZERO);
        };
        match self.blocking_wait(&calls, Instant::now()) {
            Some(wait) => (false, wait),
            None => (true, Duration::ZERO),
        }
    }

    /// Wait until `tenant` may call, then record the call
    ///
    /// Returns the total time spent waiting. Dropping the future while it
    /// sleeps records nothing.
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn wait_if_needed(&self, tenant: TenantId) -> Duration {
        let started = Instant::now();

        loop {
            match self.try_acquire(tenant) {
                Ok(()) => break,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let waited = started.elapsed();
        if !waited.is_zero() {
            debug!(waited_ms = waited.as_millis() as u64, "Rate limit slot acquired");
        }
        waited
    }

    /// Number of calls currently inside the minute window for `tenant`
    pub fn recent_calls(&self, tenant: TenantId) -> usize {
        let now = Instant::now();
        self.calls
            .get(&tenant)
            .map(|calls| {
                calls
                    .iter()
                    .filter(|ts| now.duration_since(**ts) < MINUTE)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Check and record under the tenant's entry lock
    fn try_acquire(&self, tenant: TenantId) -> Result<(), Duration> {
        let mut calls = self.calls.entry(tenant).or_default();
        let now = Instant::now();

        while calls
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= MINUTE)
        {
            calls.pop_front();
        }

        if let Some(wait) = self.blocking_wait(&calls, now) {
            return Err(wait);
        }

        calls.push_back(now);
        Ok(())
    }

    /// Time until the oldest blocking call leaves its window, if blocked
    fn blocking_wait(&self, calls: &VecDeque<Instant>, now: Instant) -> Option<Duration> {
        let per_second = self.config.calls_per_second as usize;
        let per_minute = self.config.calls_per_minute as usize;

        let mut in_second = 0usize;
        let mut oldest_in_second = None;
        for ts in calls.iter().rev() {
            if now.duration_since(*ts) >= SECOND {
                break;
            }
            in_second += 1;
            oldest_in_second = Some(*ts);
        }

        if in_second >= per_second {
            let wait = oldest_in_second
                .map(|oldest| (oldest + SECOND).saturating_duration_since(now))
                .unwrap_or(MIN_WAIT);
            return Some(wait.max(MIN_WAIT));
        }

        let mut in_minute = calls
            .iter()
            .filter(|ts| now.duration_since(**ts) < MINUTE)
            .peekable();
        let oldest_in_minute = in_minute.peek().copied().copied();
        let count = in_minute.count();

        if count >= per_minute {
            let wait = oldest_in_minute
                .map(|oldest| (oldest + MINUTE).saturating_duration_since(now))
                .unwrap_or(SECOND);
            return Some(wait.max(MIN_WAIT));
        }

        None
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
