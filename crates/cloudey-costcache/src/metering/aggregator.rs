//! Cost aggregation over billing line items
//!
//! Folds raw line items into per-service or per-resource totals. Fetching
//! goes through the response cache first and the rate limiter second, so a
//! repeated query inside its TTL never reaches the provider.

use chrono::NaiveDate;
use cloudey_common::{Clock, CostRecord, Period, TenantId};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::line_item::LineItem;
use crate::billing::{BillingApi, GroupBy, UsageRequest};
use crate::cache::response::{CacheArgs, ResponseCache, ResponseCacheConfig};
use crate::ratelimit::RateLimiter;

/// Response-cache method name for cost queries
const COST_DATA_METHOD: &str = "cost_data";

/// Aggregation key for grouping line items
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct AggregationKey {
    service: String,
    /// Only set when grouping by resource
    resource_id: Option<String>,
}

impl AggregationKey {
    /// Key for a validated item
    fn from_item(item: &LineItem, group_by: GroupBy) -> Self {
        Self {
            service: item.service.clone().unwrap_or_default(),
            resource_id: match group_by {
                GroupBy::Service => None,
                GroupBy::Resource => item.resource_id.clone(),
            },
        }
    }
}

/// Running total for one key; summed as f64, rounded on output
#[derive(Debug, Clone)]
struct AggregatedCost {
    key: AggregationKey,
    total: f64,
}

/// One row of a cost breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdownRow {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Rounded to cents
    pub cost: Decimal,
    /// Unrounded running total, for further folding
    #[serde(default)]
    pub raw_cost: f64,
}

/// Aggregated costs for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Sum of every aggregated item, rounded to cents
    pub total_cost: Decimal,
    pub currency: String,
    pub grouped_by: GroupBy,
    /// Highest cost first; equal costs keep first-seen order
    pub breakdown: Vec<CostBreakdownRow>,
    /// Items that contributed to the totals
    pub line_items: usize,
    /// Items dropped as malformed
    pub skipped: usize,
    /// Set when the provider could not be reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CostSummary {
    /// Zero-valued summary carrying an upstream error
    pub fn unavailable(currency: &str, grouped_by: GroupBy, error: impl Into<String>) -> Self {
        Self {
            total_cost: Decimal::ZERO,
            currency: currency.to_string(),
            grouped_by,
            breakdown: Vec::new(),
            line_items: 0,
            skipped: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Collapse a per-resource breakdown into one record per resource
    ///
    /// A resource billed under several services gets the sum of its rows and
    /// the service of its costliest row. Rows are folded on their unrounded
    /// totals and each record is rounded once. Rows without a resource are
    /// ignored.
    pub fn to_cost_records(&self, period: Period) -> Vec<CostRecord> {
        struct ResourceTotal<'a> {
            resource_id: &'a str,
            service: &'a str,
            service_cost: f64,
            total: f64,
        }

        let mut totals: Vec<ResourceTotal<'_>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for row in &self.breakdown {
            let Some(resource_id) = row.resource_id.as_deref() else {
                continue;
            };
            match index.get(resource_id) {
                Some(&i) => {
                    let entry = &mut totals[i];
                    entry.total += row.raw_cost;
                    if row.raw_cost > entry.service_cost {
                        entry.service = &row.service;
                        entry.service_cost = row.raw_cost;
                    }
                }
                None => {
                    index.insert(resource_id, totals.len());
                    totals.push(ResourceTotal {
                        resource_id,
                        service: &row.service,
                        service_cost: row.raw_cost,
                        total: row.raw_cost,
                    });
                }
            }
        }

        let mut records: Vec<CostRecord> = totals
            .into_iter()
            .map(|t| CostRecord::new(period, t.resource_id, t.service, to_money(t.total)))
            .collect();
        records.sort_by(|a, b| b.cost.cmp(&a.cost));
        records
    }
}

/// Round a running total for presentation
fn to_money(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Aggregate line items
///
/// With a `scope_filter`, items whose scope id differs are dropped before
/// anything else. Items missing a field needed for `group_by` are skipped and
/// counted; a missing amount contributes zero.
pub fn aggregate(
    items: &[LineItem],
    group_by: GroupBy,
    scope_filter: Option<&str>,
    currency: &str,
) -> CostSummary {
    let mut groups: Vec<AggregatedCost> = Vec::new();
    let mut index: HashMap<AggregationKey, usize> = HashMap::new();
    let mut total = 0.0f64;
    let mut line_items = 0usize;
    let mut skipped = 0usize;

    for item in items {
        if let Some(scope) = scope_filter {
            if item.scope_id.as_deref() != Some(scope) {
                continue;
            }
        }

        if let Err(e) = item.validate(group_by) {
            debug!(error = %e, date = %item.date, "Skipping malformed line item");
            skipped += 1;
            continue;
        }

        let cost = item.cost();
        total += cost;
        line_items += 1;

        let key = AggregationKey::from_item(item, group_by);
        match index.get(&key) {
            Some(&i) => groups[i].total += cost,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(AggregatedCost { key, total: cost });
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, "Skipped malformed line items during aggregation");
    }

    // Stable sort: equal totals keep first-seen order
    groups.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));

    CostSummary {
        total_cost: to_money(total),
        currency: currency.to_string(),
        grouped_by: group_by,
        breakdown: groups
            .into_iter()
            .map(|group| CostBreakdownRow {
                service: group.key.service,
                resource_id: group.key.resource_id,
                cost: to_money(group.total),
                raw_cost: group.total,
            })
            .collect(),
        line_items,
        skipped,
        error: None,
    }
}

/// Rate-limited, memoized cost queries
pub struct CostAggregator {
    billing: Arc<dyn BillingApi>,
    limiter: Arc<RateLimiter>,
    responses: Arc<ResponseCache>,
    ttl_policy: ResponseCacheConfig,
    clock: Arc<dyn Clock>,
    currency: String,
}

impl CostAggregator {
    /// Create a new cost aggregator
    pub fn new(
        billing: Arc<dyn BillingApi>,
        limiter: Arc<RateLimiter>,
        responses: Arc<ResponseCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            billing,
            limiter,
            responses,
            ttl_policy: ResponseCacheConfig::default(),
            clock,
            currency: cloudey_common::DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Use custom response TTLs
    pub fn with_ttl_policy(mut self, ttl_policy: ResponseCacheConfig) -> Self {
        self.ttl_policy = ttl_policy;
        self
    }

    /// Report totals in `currency`
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Aggregate items in this aggregator's currency
    pub fn aggregate(
        &self,
        items: &[LineItem],
        group_by: GroupBy,
        scope_filter: Option<&str>,
    ) -> CostSummary {
        aggregate(items, group_by, scope_filter, &self.currency)
    }

    /// Fetch and aggregate costs for one query
    ///
    /// Never fails: when the provider is unreachable the result is a
    /// zero-valued summary with `error` set, and it is not cached.
    #[instrument(skip_all, fields(tenant = %tenant, scope = %request.scope, start = %request.start, end = %request.end))]
    pub async fn fetch_costs(&self, tenant: TenantId, request: &UsageRequest) -> CostSummary {
        let args = Self::cache_args(request);
        if let Some(summary) =
            self.responses
                .get::<CostSummary>(tenant, COST_DATA_METHOD, &args)
        {
            debug!("Serving cost query from response cache");
            return summary;
        }

        self.limiter.wait_if_needed(tenant).await;

        let items = match self.billing.request_usage(tenant, request).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Usage query failed");
                return CostSummary::unavailable(&self.currency, request.group_by, e.to_string());
            }
        };

        let summary = self.aggregate(&items, request.group_by, request.scope.filter_id());
        let ttl = self
            .ttl_policy
            .ttl_for_range_end(request.end, self.clock.today());
        self.responses
            .set(tenant, COST_DATA_METHOD, &summary, Some(ttl), &args);

        info!(
            line_items = summary.line_items,
            rows = summary.breakdown.len(),
            total = %summary.total_cost,
            ttl_secs = ttl.as_secs(),
            "Aggregated usage"
        );
        summary
    }

    fn cache_args(request: &UsageRequest) -> CacheArgs {
        CacheArgs::new()
            .arg("scope", &request.scope)
            .arg("start_date", request.start)
            .arg("end_date", request.end)
            .arg("granularity", request.granularity)
            .arg("group_by", request.group_by)
    }
}

/// Inclusive day range of a period up to `today`
pub fn period_to_date(period: Period, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (period.first_day(), period.last_day().min(today))
}
