//! Storage backends for the two cache tiers
//!
//! - [`VolatileStore`]: TTL key/value store holding the current period
//!   (Redis in production)
//! - [`DurableStore`]: relational store holding closed periods
//!   (PostgreSQL in production)
//!
//! In-memory implementations of both back the tests and local runs.

pub mod memory;
pub mod postgres;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudey_common::{CostRecord, Period, StoreError, TenantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use self::memory::{InMemoryDurableStore, InMemoryVolatileStore};
pub use self::postgres::PostgresDurableStore;
pub use self::redis::RedisVolatileStore;

/// Key/value store with per-key expiry
#[async_trait]
pub trait VolatileStore: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &'static str;

    /// Read a value; expired keys read as `None`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Relational store of final cost rows
///
/// Rows are unique per `(tenant, resource_id, period)`. Writing an existing
/// triple replaces its cost, service, completeness flag, and timestamp.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &'static str;

    /// Insert or replace rows for one tenant and period; all or nothing
    async fn upsert(
        &self,
        tenant: TenantId,
        period: Period,
        records: &[CostRecord],
    ) -> Result<usize, StoreError>;

    /// All rows for one tenant and period, highest cost first
    async fn fetch_period(
        &self,
        tenant: TenantId,
        period: Period,
    ) -> Result<Vec<CostRecord>, StoreError>;

    /// Per-period summary of what is stored for a tenant
    async fn stats(&self, tenant: TenantId) -> Result<DurableStats, StoreError>;
}

/// Stored rows for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub period: Period,
    pub records: u64,
    /// True when every row of the period is final
    pub is_complete: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Durable tier contents for one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableStats {
    pub total_periods: u64,
    pub complete_periods: u64,
    pub total_records: u64,
    /// Newest period first
    pub periods: Vec<PeriodStats>,
}

impl DurableStats {
    /// Summarize per-period rows
    pub fn from_periods(mut periods: Vec<PeriodStats>) -> Self {
        periods.sort_by(|a, b| b.period.cmp(&a.period));
        Self {
            total_periods: periods.len() as u64,
            complete_periods: periods.iter().filter(|p| p.is_complete).count() as u64,
            total_records: periods.iter().map(|p| p.records).sum(),
            periods,
        }
    }
}

/// Order rows the way readers expect them: highest cost first
pub(crate) fn sort_by_cost_desc(records: &mut [CostRecord]) {
    records.sort_by(|a, b| b.cost.cmp(&a.cost));
}
