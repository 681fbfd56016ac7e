//! Monthly cost read path
//!
//! Cache first; on a miss, fetch the period's costs per resource, store them
//! in the tier the period belongs to, and return them.

use cloudey_common::{Clock, CloudeyError, CostRecord, Period, PeriodStatus, Result, TenantId};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::billing::{GroupBy, Scope, UsageRequest};
use crate::cache::HybridCostCache;
use crate::metering::{period_to_date, CostAggregator};

/// Per-resource monthly costs backed by the hybrid cache
pub struct CostService {
    cache: Arc<HybridCostCache>,
    aggregator: Arc<CostAggregator>,
    clock: Arc<dyn Clock>,
}

impl CostService {
    pub fn new(
        cache: Arc<HybridCostCache>,
        aggregator: Arc<CostAggregator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            aggregator,
            clock,
        }
    }

    /// Costs per resource for one month, highest first
    ///
    /// Closed months already in the durable tier never reach the billing
    /// API. Nothing is cached when the API is unreachable.
    #[instrument(skip_all, fields(tenant = %tenant, period = %period))]
    pub async fn monthly_costs(&self, tenant: TenantId, period: Period) -> Result<Vec<CostRecord>> {
        let today = self.clock.today();
        let status = period.status_on(today);
        if status == PeriodStatus::Future {
            return Err(CloudeyError::PeriodNotAllowed {
                period: period.to_string(),
                reason: "no costs exist for a future period".to_string(),
            });
        }

        if let Some(records) = self.cache.get_costs(period, tenant).await? {
            debug!(records = records.len(), "Serving monthly costs from cache");
            return Ok(records);
        }

        let (start, end) = period_to_date(period, today);
        let request = UsageRequest::new(Scope::Tenancy, start, end).with_group_by(GroupBy::Resource);
        let summary = self.aggregator.fetch_costs(tenant, &request).await;
        if let Some(error) = summary.error {
            return Err(CloudeyError::UpstreamUnavailable(error));
        }

        let now = self.clock.now();
        let records: Vec<CostRecord> = summary
            .to_cost_records(period)
            .into_iter()
            .map(|r| {
                r.with_complete(status == PeriodStatus::Closed)
                    .with_last_updated(now)
            })
            .collect();

        let saved = self.cache.save_costs(period, tenant, records.clone()).await?;
        info!(saved, "Fetched and cached monthly costs");
        Ok(records)
    }
}
