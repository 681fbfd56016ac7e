//! # Cloudey Cost Cache
//!
//! Rate-limited cost aggregation and a two-tier cost cache for cloud billing
//! data.
//!
//! ## Read path
//!
//! ```text
//! caller -> HybridCostCache.get_costs -> hit? return
//!        -> ResponseCache -> RateLimiter.wait -> BillingApi
//!        -> aggregate -> HybridCostCache.save_costs
//! ```
//!
//! ## Tiers
//!
//! - Volatile (Redis): the current, still-settling month, with a TTL that
//!   outlives the month by one day
//! - Durable (PostgreSQL): closed months, written once and never refetched
//!
//! A month moves between them once, when [`RolloverJob`] runs after it closes.

pub mod billing;
pub mod cache;
pub mod config;
pub mod metering;
pub mod ratelimit;
pub mod rollover;
pub mod service;
pub mod store;
pub mod warming;

use cloudey_common::Clock;
use std::sync::Arc;

pub use billing::{BillingApi, GroupBy, Scope, UsageRequest};
pub use cache::{HybridCostCache, ResponseCache};
pub use config::CostCacheConfig;
pub use metering::{CostAggregator, CostSummary, LineItem};
pub use ratelimit::RateLimiter;
pub use rollover::{RolloverJob, RolloverStats, StaticTenantDirectory, TenantDirectory};
pub use service::CostService;
pub use store::{DurableStore, VolatileStore};
pub use warming::CacheWarmer;

/// Every request-path component, wired once at startup
pub struct CostCacheStack {
    pub limiter: Arc<RateLimiter>,
    pub responses: Arc<ResponseCache>,
    pub aggregator: Arc<CostAggregator>,
    pub cache: Arc<HybridCostCache>,
    pub service: Arc<CostService>,
    pub warmer: Arc<CacheWarmer>,
}

impl CostCacheStack {
    pub fn new(
        config: &CostCacheConfig,
        billing: Arc<dyn BillingApi>,
        volatile: Arc<dyn VolatileStore>,
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let responses = Arc::new(ResponseCache::new(config.response_cache.default_ttl()));
        let aggregator = Arc::new(
            CostAggregator::new(billing, limiter.clone(), responses.clone(), clock.clone())
                .with_ttl_policy(config.response_cache.clone())
                .with_currency(config.currency.clone()),
        );
        let cache = Arc::new(
            HybridCostCache::new(volatile, durable, clock.clone())
                .with_key_prefix(config.key_prefix.clone()),
        );
        let service = Arc::new(CostService::new(
            cache.clone(),
            aggregator.clone(),
            clock.clone(),
        ));
        let warmer = Arc::new(CacheWarmer::new(aggregator.clone(), clock));

        Self {
            limiter,
            responses,
            aggregator,
            cache,
            service,
            warmer,
        }
    }

    /// Rollover job over this stack's cache
    pub fn rollover_job(
        &self,
        tenants: Arc<dyn TenantDirectory>,
        clock: Arc<dyn Clock>,
    ) -> RolloverJob {
        RolloverJob::new(self.cache.clone(), tenants, clock)
    }
}
