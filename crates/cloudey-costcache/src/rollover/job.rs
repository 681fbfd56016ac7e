//! Month-end rollover
//!
//! Once a month closes, its volatile data is moved to the durable tier for
//! every tenant. Tenants are processed independently; one failing tenant
//! never stops the others.

use async_trait::async_trait;
use cloudey_common::{Clock, Period, Result, TenantId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::cache::HybridCostCache;

/// Rollover scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverConfig {
    /// How often the scheduler checks for a new period (seconds)
    pub check_interval_secs: u64,
    /// Roll over the previous period as soon as the scheduler starts
    pub run_on_startup: bool,
    /// Tenants to roll over
    pub tenants: Vec<u64>,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3600,
            run_on_startup: true,
            tenants: Vec::new(),
        }
    }
}

impl RolloverConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Source of the tenants to roll over
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<TenantId>>;
}

/// Fixed tenant list
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    tenants: Vec<TenantId>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            tenants: tenants.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        Ok(self.tenants.clone())
    }
}

/// Outcome of one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverStats {
    pub period: Period,
    pub total: usize,
    pub successful: usize,
    /// No volatile data for the period; expected, not an error
    pub skipped: usize,
    pub failed: usize,
}

/// Rolls the previous period over for every tenant
pub struct RolloverJob {
    cache: Arc<HybridCostCache>,
    tenants: Arc<dyn TenantDirectory>,
    clock: Arc<dyn Clock>,
}

impl RolloverJob {
    /// Create a new rollover job
    pub fn new(
        cache: Arc<HybridCostCache>,
        tenants: Arc<dyn TenantDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            tenants,
            clock,
        }
    }

    /// The period immediately before the current one
    pub fn target_period(&self) -> Period {
        self.clock.current_period().previous()
    }

    /// Roll over the previous period for one tenant
    ///
    /// `Ok(false)` means there was nothing to roll over.
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn run_for_tenant(&self, tenant: TenantId) -> Result<bool> {
        self.cache
            .rollover_month(self.target_period(), tenant)
            .await
    }

    /// Roll over the previous period for every tenant
    ///
    /// Fails only when the tenant list itself cannot be read.
    #[instrument(skip(self))]
    pub async fn run_for_all_tenants(&self) -> Result<RolloverStats> {
        let period = self.target_period();
        let tenants = self.tenants.list_tenants().await?;
        info!(period = %period, tenants = tenants.len(), "Starting rollover");

        let mut stats = RolloverStats {
            period,
            total: tenants.len(),
            successful: 0,
            skipped: 0,
            failed: 0,
        };

        for tenant in tenants {
            match self.cache.rollover_month(period, tenant).await {
                Ok(true) => stats.successful += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    error!(tenant = %tenant, period = %period, error = %e, "Rollover failed");
                    stats.failed += 1;
                }
            }
        }

        info!(
            period = %period,
            successful = stats.successful,
            skipped = stats.skipped,
            failed = stats.failed,
            "Rollover complete"
        );
        Ok(stats)
    }

    /// Start background rollover
    ///
    /// Checks every `check_interval` and runs once per newly observed
    /// current period. A run that cannot list tenants, or that fails for any
    /// tenant, is repeated on the next tick; tenants already rolled over are
    /// skipped then.
    pub fn spawn_scheduler(
        self: Arc<Self>,
        check_interval: Duration,
        run_on_startup: bool,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            let mut last_period = if run_on_startup {
                None
            } else {
                Some(self.clock.current_period())
            };

            loop {
                interval.tick().await;
                let current = self.clock.current_period();
                if last_period == Some(current) {
                    continue;
                }

                match self.run_for_all_tenants().await {
                    Ok(stats) if stats.failed > 0 => {
                        warn!(failed = stats.failed, "Rollover finished with failures, retrying next tick");
                    }
                    Ok(_) => last_period = Some(current),
                    Err(e) => error!(error = %e, "Rollover could not start"),
                }
            }
        })
    }
}
