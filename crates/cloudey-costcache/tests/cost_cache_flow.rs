//! End-to-end cost cache behavior over in-memory stores

use async_trait::async_trait;
use chrono::NaiveDate;
use cloudey_common::{
    CloudeyError, CostRecord, ErrorKind, FixedClock, Period, Result, StoreError, TenantId,
};
use cloudey_costcache::billing::{BillingApi, GroupBy, Scope, UsageRequest};
use cloudey_costcache::config::CostCacheConfig;
use cloudey_costcache::metering::LineItem;
use cloudey_costcache::store::{
    DurableStore, InMemoryDurableStore, InMemoryVolatileStore, VolatileStore,
};
use cloudey_costcache::CostCacheStack;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TENANT: TenantId = TenantId::new(42);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn period(key: &str) -> Period {
    key.parse().unwrap()
}

/// Billing API returning a fixed item set and counting calls
#[derive(Default)]
struct FakeBilling {
    items: Mutex<Vec<LineItem>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    requests: Mutex<Vec<UsageRequest>>,
}

impl FakeBilling {
    fn with_items(items: Vec<LineItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingApi for FakeBilling {
    async fn request_usage(
        &self,
        _tenant: TenantId,
        request: &UsageRequest,
    ) -> Result<Vec<LineItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(CloudeyError::UpstreamUnavailable("503 from usage API".into()));
        }
        Ok(self.items.lock().clone())
    }
}

/// Volatile store that always fails
struct BrokenVolatileStore {
    exhausted: bool,
}

#[async_trait]
impl VolatileStore for BrokenVolatileStore {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn get(&self, _key: &str) -> std::result::Result<Option<String>, StoreError> {
        Err(self.error())
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> std::result::Result<(), StoreError> {
        Err(self.error())
    }

    async fn delete(&self, _key: &str) -> std::result::Result<bool, StoreError> {
        Err(self.error())
    }
}

impl BrokenVolatileStore {
    fn error(&self) -> StoreError {
        if self.exhausted {
            StoreError::exhausted("broken", "OOM command not allowed")
        } else {
            StoreError::unavailable("broken", "connection refused")
        }
    }
}

struct Harness {
    clock: Arc<FixedClock>,
    billing: Arc<FakeBilling>,
    durable: Arc<InMemoryDurableStore>,
    stack: CostCacheStack,
}

impl Harness {
    fn new(items: Vec<LineItem>) -> Self {
        Self::with_volatile(items, Arc::new(InMemoryVolatileStore::new()))
    }

    fn with_volatile(items: Vec<LineItem>, volatile: Arc<dyn VolatileStore>) -> Self {
        let clock = Arc::new(FixedClock::on(date(2025, 11, 18)));
        let billing = Arc::new(FakeBilling::with_items(items));
        let durable = Arc::new(InMemoryDurableStore::new());
        let stack = CostCacheStack::new(
            &CostCacheConfig::default(),
            billing.clone(),
            volatile,
            durable.clone(),
            clock.clone(),
        );
        Self {
            clock,
            billing,
            durable,
            stack,
        }
    }
}

fn november_items() -> Vec<LineItem> {
    vec![
        LineItem::new("COMPUTE", 7.25, date(2025, 11, 1)).with_resource("r1"),
        LineItem::new("COMPUTE", 5.25, date(2025, 11, 2)).with_resource("r1"),
        LineItem::new("STORAGE", 3.0, date(2025, 11, 2)).with_resource("r2"),
    ]
}

#[tokio::test]
async fn test_save_then_get_current_period() {
    let h = Harness::new(vec![]);
    let nov = period("2025-11");

    let saved = h
        .stack
        .cache
        .save_costs(
            nov,
            TENANT,
            vec![CostRecord::new(nov, "r1", "COMPUTE", dec!(12.50))],
        )
        .await
        .unwrap();
    assert_eq!(saved, 1);

    let records = h.stack.cache.get_costs(nov, TENANT).await.unwrap().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].resource_id, "r1");
    assert_eq!(records[0].cost, dec!(12.50));
    assert!(!records[0].is_complete);

    // Nothing reached the durable tier
    assert!(h.durable.fetch_period(TENANT, nov).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_period_served_from_durable_without_billing_call() {
    let h = Harness::new(november_items());
    let oct = period("2025-10");
    h.durable
        .upsert(
            TENANT,
            oct,
            &[CostRecord::new(oct, "r9", "NETWORK", dec!(40)).with_complete(true)],
        )
        .await
        .unwrap();

    let records = h.stack.service.monthly_costs(TENANT, oct).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].resource_id, "r9");
    assert_eq!(h.billing.calls(), 0);
}

#[tokio::test]
async fn test_rollover_without_volatile_entry_is_noop() {
    let h = Harness::new(vec![]);
    let oct = period("2025-10");
    h.durable
        .upsert(
            TENANT,
            oct,
            &[CostRecord::new(oct, "r9", "NETWORK", dec!(40)).with_complete(true)],
        )
        .await
        .unwrap();

    assert!(!h.stack.cache.rollover_month(oct, TENANT).await.unwrap());

    let rows = h.durable.fetch_period(TENANT, oct).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cost, dec!(40));
}

#[tokio::test]
async fn test_rollover_moves_period_once() {
    let h = Harness::new(november_items());
    let nov = period("2025-11");

    let first = h.stack.service.monthly_costs(TENANT, nov).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(h.billing.calls(), 1);

    h.clock.set_date(date(2025, 12, 2));
    assert!(h.stack.cache.rollover_month(nov, TENANT).await.unwrap());
    assert!(!h.stack.cache.rollover_month(nov, TENANT).await.unwrap());

    let rows = h.stack.service.monthly_costs(TENANT, nov).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.is_complete));
    assert_eq!(rows[0].resource_id, "r1");
    assert_eq!(rows[0].cost, dec!(12.50));
    assert_eq!(h.billing.calls(), 1);
}

#[tokio::test]
async fn test_rollover_keeps_existing_durable_rows() {
    let h = Harness::new(vec![]);
    let nov = period("2025-11");
    h.stack
        .cache
        .save_costs(
            nov,
            TENANT,
            vec![
                CostRecord::new(nov, "r1", "COMPUTE", dec!(5)),
                CostRecord::new(nov, "r2", "STORAGE", dec!(7)),
            ],
        )
        .await
        .unwrap();

    h.clock.set_date(date(2025, 12, 1));
    h.stack
        .cache
        .save_costs(nov, TENANT, vec![CostRecord::new(nov, "r1", "COMPUTE", dec!(31))])
        .await
        .unwrap();

    assert!(h.stack.cache.rollover_month(nov, TENANT).await.unwrap());

    // r1 keeps its durable cost, r2 moves over from the volatile tier
    let rows = h.durable.fetch_period(TENANT, nov).await.unwrap();
    let rows: Vec<_> = rows.iter().map(|r| (r.resource_id.as_str(), r.cost)).collect();
    assert_eq!(rows, vec![("r1", dec!(31)), ("r2", dec!(7))]);
    assert!(h
        .durable
        .fetch_period(TENANT, nov)
        .await
        .unwrap()
        .iter()
        .all(|r| r.is_complete));
    assert!(!h.stack.cache.rollover_month(nov, TENANT).await.unwrap());
}

#[tokio::test]
async fn test_monthly_costs_current_period_cached_in_volatile_tier() {
    let h = Harness::new(november_items());
    let nov = period("2025-11");

    let records = h.stack.service.monthly_costs(TENANT, nov).await.unwrap();
    assert_eq!(records[0].resource_id, "r1");
    assert_eq!(records[0].cost, dec!(12.50));
    assert_eq!(records[1].cost, dec!(3.00));

    let request = h.billing.requests.lock()[0].clone();
    assert_eq!(request.start, date(2025, 11, 1));
    assert_eq!(request.end, date(2025, 11, 18));
    assert_eq!(request.group_by, GroupBy::Resource);

    h.stack.service.monthly_costs(TENANT, nov).await.unwrap();
    assert_eq!(h.billing.calls(), 1);
    assert!(h.durable.fetch_period(TENANT, nov).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_monthly_costs_closed_period_written_complete() {
    let items = vec![LineItem::new("COMPUTE", 20.0, date(2025, 10, 3)).with_resource("r1")];
    let h = Harness::new(items);
    let oct = period("2025-10");

    let records = h.stack.service.monthly_costs(TENANT, oct).await.unwrap();
    assert!(records[0].is_complete);

    let request = h.billing.requests.lock()[0].clone();
    assert_eq!(request.end, date(2025, 10, 31));

    let stored = h.durable.fetch_period(TENANT, oct).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_complete);
}

#[tokio::test]
async fn test_future_period_rejected() {
    let h = Harness::new(november_items());
    let err = h
        .stack
        .service
        .monthly_costs(TENANT, period("2025-12"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(h.billing.calls(), 0);
}

#[tokio::test]
async fn test_upstream_failure_writes_nothing() {
    let h = Harness::new(november_items());
    let nov = period("2025-11");
    h.billing.set_failing(true);

    let err = h.stack.service.monthly_costs(TENANT, nov).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert!(h.stack.cache.get_costs(nov, TENANT).await.unwrap().is_none());
    assert!(h.stack.responses.is_empty());

    h.billing.set_failing(false);
    assert_eq!(h.stack.service.monthly_costs(TENANT, nov).await.unwrap().len(), 2);
    assert_eq!(h.billing.calls(), 2);
}

#[tokio::test]
async fn test_fetch_costs_degrades_on_upstream_failure() {
    let h = Harness::new(november_items());
    h.billing.set_failing(true);

    let request = UsageRequest::new(Scope::Tenancy, date(2025, 11, 1), date(2025, 11, 18));
    let summary = h.stack.aggregator.fetch_costs(TENANT, &request).await;
    assert!(summary.is_error());
    assert_eq!(summary.total_cost, dec!(0));
    assert!(summary.breakdown.is_empty());
}

#[tokio::test]
async fn test_identical_queries_hit_response_cache() {
    let h = Harness::new(november_items());
    let request = UsageRequest::new(Scope::Tenancy, date(2025, 10, 1), date(2025, 10, 31));

    let first = h.stack.aggregator.fetch_costs(TENANT, &request).await;
    let second = h.stack.aggregator.fetch_costs(TENANT, &request).await;
    assert_eq!(first, second);
    assert_eq!(first.total_cost, dec!(15.50));
    assert_eq!(h.billing.calls(), 1);

    // Other tenants have their own entries
    h.stack
        .aggregator
        .fetch_costs(TenantId::new(7), &request)
        .await;
    assert_eq!(h.billing.calls(), 2);
}

#[tokio::test]
async fn test_compartment_scope_filters_foreign_items() {
    let items = vec![
        LineItem::new("COMPUTE", 4.0, date(2025, 11, 1)).with_scope("c1"),
        LineItem::new("COMPUTE", 90.0, date(2025, 11, 1)).with_scope("c2"),
    ];
    let h = Harness::new(items);

    let compartment = UsageRequest::new(
        Scope::Compartment("c1".into()),
        date(2025, 11, 1),
        date(2025, 11, 18),
    );
    let summary = h.stack.aggregator.fetch_costs(TENANT, &compartment).await;
    assert_eq!(summary.total_cost, dec!(4.00));

    let tenancy = UsageRequest::new(Scope::Tenancy, date(2025, 11, 1), date(2025, 11, 18));
    let summary = h.stack.aggregator.fetch_costs(TENANT, &tenancy).await;
    assert_eq!(summary.total_cost, dec!(94.00));
}

#[tokio::test]
async fn test_pagination_overlap_collapses_to_one_row() {
    let item = LineItem::new("COMPUTE", 6.25, date(2025, 11, 3)).with_resource("r1");
    let h = Harness::new(vec![item.clone(), item]);

    let request = UsageRequest::new(Scope::Tenancy, date(2025, 11, 1), date(2025, 11, 18))
        .with_group_by(GroupBy::Resource);
    let summary = h.stack.aggregator.fetch_costs(TENANT, &request).await;
    assert_eq!(summary.breakdown.len(), 1);
    assert_eq!(summary.breakdown[0].cost, dec!(12.50));
}

#[tokio::test]
async fn test_volatile_outage_falls_back_to_durable() {
    let h = Harness::with_volatile(
        november_items(),
        Arc::new(BrokenVolatileStore { exhausted: false }),
    );
    let nov = period("2025-11");
    h.durable
        .upsert(
            TENANT,
            nov,
            &[CostRecord::new(nov, "r1", "COMPUTE", dec!(3))],
        )
        .await
        .unwrap();

    let records = h.stack.cache.get_costs(nov, TENANT).await.unwrap().unwrap();
    assert_eq!(records[0].cost, dec!(3));

    let err = h
        .stack
        .cache
        .save_costs(nov, TENANT, vec![CostRecord::new(nov, "r1", "COMPUTE", dec!(4))])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CacheUnavailable);
}

#[tokio::test]
async fn test_volatile_exhaustion_is_fatal() {
    let h = Harness::with_volatile(
        november_items(),
        Arc::new(BrokenVolatileStore { exhausted: true }),
    );

    let err = h
        .stack
        .cache
        .get_costs(period("2025-11"), TENANT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreExhausted);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_tenants_do_not_share_data() {
    let h = Harness::new(vec![]);
    let nov = period("2025-11");
    h.stack
        .cache
        .save_costs(nov, TENANT, vec![CostRecord::new(nov, "r1", "COMPUTE", dec!(1))])
        .await
        .unwrap();

    assert!(h
        .stack
        .cache
        .get_costs(nov, TenantId::new(43))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cache_warming_fetches_two_ranges() {
    let h = Harness::new(november_items());

    let report = h.stack.warmer.warm_tenant(TENANT).await;
    assert!(report.last_month);
    assert!(report.current_month);
    assert_eq!(h.billing.calls(), 2);
    assert_eq!(h.stack.responses.len(), 2);

    let requests = h.billing.requests.lock().clone();
    assert_eq!(requests[0].start, date(2025, 10, 1));
    assert_eq!(requests[0].end, date(2025, 10, 31));
    assert_eq!(requests[1].start, date(2025, 11, 1));
    assert_eq!(requests[1].end, date(2025, 11, 18));
}

#[tokio::test]
async fn test_cache_warming_reports_failures() {
    let h = Harness::new(vec![]);
    h.billing.set_failing(true);

    let report = h.stack.warmer.warm_tenant(TENANT).await;
    assert!(!report.last_month);
    assert!(!report.current_month);
    assert!(h.stack.responses.is_empty());
}
