//! Redis volatile store

use async_trait::async_trait;
use cloudey_common::StoreError;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::VolatileStore;

const STORE: &str = "redis";

/// Redis-backed volatile tier
pub struct RedisVolatileStore {
    /// Redis client
    client: Client,
    /// Shared multiplexed connection, re-established after I/O failures
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
}

impl RedisVolatileStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(map_redis_error)?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(Some(connection))),
        })
    }

    /// Get a connection, reconnecting if the last one was dropped
    async fn get_connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let guard = self.connection.read().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        drop(guard);

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;

        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Map a command failure, dropping the connection if it is broken
    async fn command_failed(&self, op: &str, err: RedisError) -> StoreError {
        warn!(op, error = %err, "Redis command failed");
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            *self.connection.write().await = None;
        }
        map_redis_error(err)
    }
}

#[async_trait]
impl VolatileStore for RedisVolatileStore {
    fn name(&self) -> &'static str {
        STORE
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => {
                debug!(key, hit = value.is_some(), "Redis get");
                Ok(value)
            }
            Err(e) => Err(self.command_failed("GET", e).await),
        }
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        match conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            Ok(()) => {
                debug!(key, ttl_secs, "Redis set");
                Ok(())
            }
            Err(e) => Err(self.command_failed("SETEX", e).await),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        match conn.del::<_, u64>(key).await {
            Ok(deleted) => Ok(deleted > 0),
            Err(e) => Err(self.command_failed("DEL", e).await),
        }
    }
}

/// Classify a Redis error
///
/// Out-of-memory and client-limit replies mean Redis is up but cannot take
/// more work; everything else is treated as unavailability.
pub fn map_redis_error(err: RedisError) -> StoreError {
    let message = err.to_string();
    let exhausted = err.code() == Some("OOM")
        || message.contains("max number of clients")
        || message.contains("maxmemory");
    if exhausted {
        StoreError::exhausted(STORE, message)
    } else {
        StoreError::unavailable(STORE, message)
    }
}
