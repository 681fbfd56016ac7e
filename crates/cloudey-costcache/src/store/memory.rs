//! In-memory store implementations
//!
//! DashMap-backed versions of both tiers. Nothing survives a restart; used in
//! tests and when no Redis/PostgreSQL is configured.

use async_trait::async_trait;
use cloudey_common::{CostRecord, Period, StoreError, TenantId};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{sort_by_cost_desc, DurableStats, DurableStore, PeriodStats, VolatileStore};

/// Volatile value with its expiry
#[derive(Debug, Clone)]
struct VolatileEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory volatile tier
#[derive(Debug, Default)]
pub struct InMemoryVolatileStore {
    entries: DashMap<String, VolatileEntry>,
}

impl InMemoryVolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a key, if present and unexpired
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VolatileStore for InMemoryVolatileStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            VolatileEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// In-memory durable tier
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    /// Rows per tenant and period, in first-write order
    rows: DashMap<(TenantId, Period), Vec<CostRecord>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(
        &self,
        tenant: TenantId,
        period: Period,
        records: &[CostRecord],
    ) -> Result<usize, StoreError> {
        let mut rows = self.rows.entry((tenant, period)).or_default();
        for record in records {
            match rows
                .iter()
                .position(|row| row.resource_id == record.resource_id)
            {
                Some(i) => rows[i] = record.clone(),
                None => rows.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn fetch_period(
        &self,
        tenant: TenantId,
        period: Period,
    ) -> Result<Vec<CostRecord>, StoreError> {
        let mut records = self
            .rows
            .get(&(tenant, period))
            .map(|rows| rows.value().clone())
            .unwrap_or_default();
        sort_by_cost_desc(&mut records);
        Ok(records)
    }

    async fn stats(&self, tenant: TenantId) -> Result<DurableStats, StoreError> {
        let periods = self
            .rows
            .iter()
            .filter(|entry| entry.key().0 == tenant && !entry.value().is_empty())
            .map(|entry| {
                let rows = entry.value();
                PeriodStats {
                    period: entry.key().1,
                    records: rows.len() as u64,
                    is_complete: rows.iter().all(|row| row.is_complete),
                    last_updated: rows.iter().map(|row| row.last_updated).max(),
                }
            })
            .collect();
        Ok(DurableStats::from_periods(periods))
    }
}
