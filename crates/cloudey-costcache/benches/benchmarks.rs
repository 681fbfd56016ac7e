//! Cost cache benchmarks
//!
//! - Aggregation throughput by line item count
//! - Response cache key construction
//! - Rate limiter admission probe

use chrono::NaiveDate;
use cloudey_common::TenantId;
use cloudey_costcache::billing::GroupBy;
use cloudey_costcache::cache::{CacheArgs, ResponseCache};
use cloudey_costcache::metering::{aggregate, LineItem};
use cloudey_costcache::ratelimit::{RateLimitConfig, RateLimiter};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

fn line_items(count: usize) -> Vec<LineItem> {
    let start = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
    (0..count)
        .map(|i| {
            let date = start + chrono::Days::new((i % 30) as u64);
            LineItem::new(format!("service-{}", i % 12), (i % 97) as f64 * 0.37, date)
                .with_resource(format!("resource-{}", i % 500))
                .with_scope(format!("compartment-{}", i % 4))
        })
        .collect()
}

// ============ AGGREGATION BENCHMARKS ============

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    group.measurement_time(Duration::from_secs(10));

    for count in [100usize, 1_000, 10_000, 50_000].iter() {
        let items = line_items(*count);
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("by_service", count), &items, |b, items| {
            b.iter(|| aggregate(black_box(items), GroupBy::Service, None, "USD"))
        });

        group.bench_with_input(BenchmarkId::new("by_resource", count), &items, |b, items| {
            b.iter(|| aggregate(black_box(items), GroupBy::Resource, None, "USD"))
        });

        group.bench_with_input(
            BenchmarkId::new("scope_filtered", count),
            &items,
            |b, items| {
                b.iter(|| aggregate(black_box(items), GroupBy::Service, Some("compartment-1"), "USD"))
            },
        );
    }

    group.finish();
}

// ============ CACHE BENCHMARKS ============

fn bench_response_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_cache");
    let tenant = TenantId::new(42);

    let short = CacheArgs::new()
        .arg("scope", "tenancy")
        .arg("start_date", "2025-11-01")
        .arg("end_date", "2025-11-18");
    group.bench_function("key_short", |b| {
        b.iter(|| ResponseCache::make_key(black_box(tenant), "cost_data", black_box(&short)))
    });

    let long = short.clone().arg("scope", "compartment/".repeat(20));
    group.bench_function("key_hashed", |b| {
        b.iter(|| ResponseCache::make_key(black_box(tenant), "cost_data", black_box(&long)))
    });

    group.finish();
}

// ============ RATE LIMITER BENCHMARKS ============

fn bench_rate_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");
    let limiter = RateLimiter::new(RateLimitConfig::default());

    group.bench_function("probe_unknown_tenant", |b| {
        b.iter(|| limiter.can_make_request(black_box(TenantId::new(1))))
    });

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        for _ in 0..10 {
            limiter.wait_if_needed(TenantId::new(2)).await;
        }
    });
    group.bench_function("probe_busy_tenant", |b| {
        b.iter(|| limiter.can_make_request(black_box(TenantId::new(2))))
    });

    group.finish();
}

criterion_group!(aggregation, bench_aggregation);
criterion_group!(caching, bench_response_cache, bench_rate_limiter);

criterion_main!(aggregation, caching);
