//! Cloudey cost cache daemon
//!
//! Keeps the durable tier current by rolling each closed month over from
//! Redis to PostgreSQL.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cloudey_common::{Clock, SystemClock, VERSION};
use cloudey_costcache::{
    cache::HybridCostCache,
    config::CostCacheConfig,
    rollover::{RolloverJob, StaticTenantDirectory},
    store::{PostgresDurableStore, RedisVolatileStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Cloudey cost cache daemon v{}", VERSION);

    // Load configuration
    let config = CostCacheConfig::load()?;
    info!(
        "Rollover config: tenants={}, check_interval={}s, run_on_startup={}",
        config.rollover.tenants.len(),
        config.rollover.check_interval_secs,
        config.rollover.run_on_startup
    );

    let volatile = Arc::new(RedisVolatileStore::new(&config.redis_url).await?);
    info!("Connected to Redis");

    let durable = PostgresDurableStore::new(&config.database_url)
        .await?
        .with_table_name(config.durable_table.clone());
    durable.migrate().await?;
    info!("Connected to PostgreSQL, table {} ready", config.durable_table);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(
        HybridCostCache::new(volatile, Arc::new(durable), clock.clone())
            .with_key_prefix(config.key_prefix.clone()),
    );
    let tenants = Arc::new(StaticTenantDirectory::new(config.rollover_tenants()));
    let job = Arc::new(RolloverJob::new(cache, tenants, clock));

    let scheduler = job.spawn_scheduler(
        config.rollover.check_interval(),
        config.rollover.run_on_startup,
    );
    info!("Rollover scheduler running");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    scheduler.abort();

    Ok(())
}
