//! Two-tier cost cache
//!
//! The current period lives in the volatile tier under a TTL that outlasts
//! the month. Closed periods live in the durable tier and are final. A period
//! moves from the first to the second exactly once, via
//! [`HybridCostCache::rollover_month`].

use chrono::{TimeZone, Utc};
use cloudey_common::{
    Clock, CloudeyError, CostRecord, Period, PeriodStatus, Result, StoreError, TenantId,
    SECONDS_PER_DAY,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::store::{DurableStats, DurableStore, VolatileStore};

/// Current-period contents of the volatile tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileTierStats {
    pub available: bool,
    pub has_data: bool,
    pub records: u64,
}

/// What both tiers hold for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCacheStats {
    pub tenant: TenantId,
    pub current_period: Period,
    pub volatile: VolatileTierStats,
    pub durable: DurableStats,
}

/// Hybrid volatile/durable cost cache
pub struct HybridCostCache {
    volatile: Arc<dyn VolatileStore>,
    durable: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl HybridCostCache {
    /// Create a new hybrid cache
    pub fn new(
        volatile: Arc<dyn VolatileStore>,
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            volatile,
            durable,
            clock,
            key_prefix: "cloudey".to_string(),
        }
    }

    /// Create cache with custom key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Volatile key for one tenant's period
    pub fn volatile_key(&self, period: Period, tenant: TenantId) -> String {
        format!(
            "{}:cost:month:{}:tenant:{}",
            self.key_prefix, period, tenant
        )
    }

    /// TTL for current-period entries
    ///
    /// Whole days until the next month starts, plus one, so the entry is
    /// still there when rollover runs.
    pub fn volatile_ttl(&self) -> Duration {
        let now = self.clock.now();
        let next_month = Period::containing(now.date_naive()).next().first_day();
        let next_start = Utc.from_utc_datetime(&next_month.and_time(chrono::NaiveTime::MIN));
        let days = (next_start - now).num_days().max(0) as u64 + 1;
        Duration::from_secs(days * SECONDS_PER_DAY)
    }

    /// Read cached costs for a period
    ///
    /// `Ok(None)` means neither tier has the period. A volatile tier outage
    /// falls back to the durable tier. A durable tier outage reads as a miss
    /// for the current period and is an error for closed ones. Exhaustion of
    /// either tier is always an error.
    #[instrument(skip_all, fields(period = %period, tenant = %tenant))]
    pub async fn get_costs(
        &self,
        period: Period,
        tenant: TenantId,
    ) -> Result<Option<Vec<CostRecord>>> {
        let status = period.status_on(self.clock.today());
        match status {
            PeriodStatus::Future => {
                debug!("Future period, nothing cached");
                return Ok(None);
            }
            PeriodStatus::Current => match self.read_volatile(period, tenant).await {
                Ok(Some(records)) => {
                    debug!(records = records.len(), "Volatile tier hit");
                    return Ok(Some(records));
                }
                Ok(None) => debug!("Volatile tier miss"),
                Err(e @ StoreError::Exhausted { .. }) => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "Volatile tier read failed, falling back to durable tier");
                }
            },
            PeriodStatus::Closed => {}
        }

        let records = match self.durable.fetch_period(tenant, period).await {
            Ok(records) => records,
            Err(e @ StoreError::Exhausted { .. }) => return Err(e.into()),
            Err(e) if status == PeriodStatus::Current => {
                warn!(error = %e, "Durable tier read failed, reporting no cached data");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if records.is_empty() {
            debug!("Durable tier miss");
            Ok(None)
        } else {
            debug!(records = records.len(), "Durable tier hit");
            Ok(Some(records))
        }
    }

    /// Write costs for a period to the tier its status selects
    ///
    /// Records are validated, deduplicated by resource (last one wins), and
    /// stamped with completeness and time. Returns the number written.
    #[instrument(skip_all, fields(period = %period, tenant = %tenant, count = records.len()))]
    pub async fn save_costs(
        &self,
        period: Period,
        tenant: TenantId,
        records: Vec<CostRecord>,
    ) -> Result<usize> {
        let status = period.status_on(self.clock.today());
        if status == PeriodStatus::Future {
            return Err(CloudeyError::PeriodNotAllowed {
                period: period.to_string(),
                reason: "costs cannot be saved for a future period".to_string(),
            });
        }

        for record in &records {
            record.validate_for(period)?;
        }

        let complete = status == PeriodStatus::Closed;
        let now = self.clock.now();
        let records: Vec<CostRecord> = dedupe_by_resource(records)
            .into_iter()
            .map(|r| r.with_complete(complete).with_last_updated(now))
            .collect();

        if complete {
            let written = self.durable.upsert(tenant, period, &records).await?;
            info!(written, "Saved closed period to durable tier");
            Ok(written)
        } else {
            let key = self.volatile_key(period, tenant);
            let json = serde_json::to_string(&records)?;
            let ttl = self.volatile_ttl();
            self.volatile.set(&key, &json, ttl).await?;
            info!(written = records.len(), ttl_secs = ttl.as_secs(), "Saved current period to volatile tier");
            Ok(records.len())
        }
    }

    /// Move a closed period from the volatile to the durable tier
    ///
    /// Returns `Ok(false)` when the volatile tier holds nothing for the
    /// period. Resources the durable tier already holds keep their durable
    /// rows; every other volatile record is upserted as complete.
    #[instrument(skip_all, fields(period = %period, tenant = %tenant))]
    pub async fn rollover_month(&self, period: Period, tenant: TenantId) -> Result<bool> {
        if period.status_on(self.clock.today()) != PeriodStatus::Closed {
            return Err(CloudeyError::PeriodNotAllowed {
                period: period.to_string(),
                reason: "only closed periods can be rolled over".to_string(),
            });
        }

        let key = self.volatile_key(period, tenant);
        let Some(raw) = self.volatile.get(&key).await? else {
            debug!("No volatile data to roll over");
            return Ok(false);
        };
        let records: Vec<CostRecord> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Serialization(format!("volatile entry {key}: {e}")))?;

        let existing: HashSet<String> = self
            .durable
            .fetch_period(tenant, period)
            .await?
            .into_iter()
            .map(|r| r.resource_id)
            .collect();

        let now = self.clock.now();
        let pending: Vec<CostRecord> = records
            .into_iter()
            .filter(|r| !existing.contains(&r.resource_id))
            .map(|r| r.with_complete(true).with_last_updated(now))
            .collect();

        if pending.is_empty() {
            info!(existing = existing.len(), "Durable tier already holds every resource");
        } else {
            let written = self.durable.upsert(tenant, period, &pending).await?;
            info!(written, kept = existing.len(), "Rolled period over to durable tier");
        }

        if let Err(e) = self.volatile.delete(&key).await {
            // Durable copy is authoritative now; the entry will expire on its own
            warn!(error = %e, "Failed to delete rolled-over volatile entry");
        }
        Ok(true)
    }

    /// Summarize both tiers for a tenant
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn stats(&self, tenant: TenantId) -> Result<CostCacheStats> {
        let current_period = self.clock.current_period();

        let volatile = match self.read_volatile(current_period, tenant).await {
            Ok(Some(records)) => VolatileTierStats {
                available: true,
                has_data: true,
                records: records.len() as u64,
            },
            Ok(None) => VolatileTierStats {
                available: true,
                ..Default::default()
            },
            Err(e) => {
                warn!(error = %e, "Volatile tier unavailable for stats");
                VolatileTierStats::default()
            }
        };

        let durable = self.durable.stats(tenant).await?;
        Ok(CostCacheStats {
            tenant,
            current_period,
            volatile,
            durable,
        })
    }

    async fn read_volatile(
        &self,
        period: Period,
        tenant: TenantId,
    ) -> std::result::Result<Option<Vec<CostRecord>>, StoreError> {
        let key = self.volatile_key(period, tenant);
        let Some(raw) = self.volatile.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("volatile entry {key}: {e}")))
    }
}

/// Keep one record per resource, the last written, in first-seen order
fn dedupe_by_resource(records: Vec<CostRecord>) -> Vec<CostRecord> {
    let mut out: Vec<CostRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        match index.get(&record.resource_id) {
            Some(&i) => out[i] = record,
            None => {
                index.insert(record.resource_id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}
