//! Response cache warming
//!
//! Pre-fetches the queries a dashboard opens with so the first page load is
//! served from cache.

use cloudey_common::{Clock, TenantId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::billing::{Scope, UsageRequest};
use crate::metering::{period_to_date, CostAggregator};

/// Which warm-up queries succeeded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmingReport {
    pub last_month: bool,
    pub current_month: bool,
}

/// Best-effort response cache warmer
pub struct CacheWarmer {
    aggregator: Arc<CostAggregator>,
    clock: Arc<dyn Clock>,
}

impl CacheWarmer {
    pub fn new(aggregator: Arc<CostAggregator>, clock: Arc<dyn Clock>) -> Self {
        Self { aggregator, clock }
    }

    /// Fetch last month in full and the current month to date
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn warm_tenant(&self, tenant: TenantId) -> WarmingReport {
        let today = self.clock.today();
        let current = self.clock.current_period();

        let mut report = WarmingReport::default();
        for (period, done) in [
            (current.previous(), &mut report.last_month),
            (current, &mut report.current_month),
        ] {
            let (start, end) = period_to_date(period, today);
            let summary = self
                .aggregator
                .fetch_costs(tenant, &UsageRequest::new(Scope::Tenancy, start, end))
                .await;
            match summary.error {
                None => *done = true,
                Some(e) => warn!(period = %period, error = %e, "Cache warming query failed"),
            }
        }

        info!(
            last_month = report.last_month,
            current_month = report.current_month,
            "Cache warming finished"
        );
        report
    }

    /// Warm in the background
    pub fn spawn_warm_tenant(
        self: Arc<Self>,
        tenant: TenantId,
    ) -> tokio::task::JoinHandle<WarmingReport> {
        tokio::spawn(async move { self.warm_tenant(tenant).await })
    }
}
