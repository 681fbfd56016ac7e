//! PostgreSQL durable store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudey_common::{CostRecord, Period, StoreError, TenantId};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{DurableStats, DurableStore, PeriodStats};

const STORE: &str = "postgres";

/// SQLSTATE class 53: insufficient resources
const EXHAUSTED_CODES: &[&str] = &["53000", "53100", "53200", "53300", "53400"];

/// PostgreSQL-backed durable tier
pub struct PostgresDurableStore {
    pool: Arc<PgPool>,
    table_name: String,
}

impl PostgresDurableStore {
    /// Connect to PostgreSQL
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Create with an existing connection pool
    pub fn with_pool(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            table_name: "cost_records".to_string(),
        }
    }

    /// Set custom table name
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Create the table and indexes if missing
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                tenant_id BIGINT NOT NULL,
                resource_id TEXT NOT NULL,
                period CHAR(7) NOT NULL,
                service TEXT NOT NULL,
                cost NUMERIC(20, 6) NOT NULL,
                is_complete BOOLEAN NOT NULL DEFAULT FALSE,
                last_updated TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (tenant_id, resource_id, period)
            )
            "#,
            self.table_name
        );
        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_tenant_period ON {} (tenant_id, period)",
            self.table_name, self.table_name
        );

        for statement in [table, index] {
            sqlx::query(&statement)
                .execute(&*self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> Result<CostRecord, StoreError> {
        let period: String = row.try_get("period").map_err(map_sqlx_error)?;
        let period: Period = period
            .trim()
            .parse()
            .map_err(|e| StoreError::Serialization(format!("stored period: {e}")))?;

        Ok(CostRecord {
            period,
            resource_id: row.try_get("resource_id").map_err(map_sqlx_error)?,
            service: row.try_get("service").map_err(map_sqlx_error)?,
            cost: row.try_get::<Decimal, _>("cost").map_err(map_sqlx_error)?,
            is_complete: row.try_get("is_complete").map_err(map_sqlx_error)?,
            last_updated: row
                .try_get::<DateTime<Utc>, _>("last_updated")
                .map_err(map_sqlx_error)?,
        })
    }
}

/// Tenant ids are stored bit-for-bit in a signed BIGINT
fn tenant_key(tenant: TenantId) -> i64 {
    tenant.as_u64() as i64
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    fn name(&self) -> &'static str {
        STORE
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(
        &self,
        tenant: TenantId,
        period: Period,
        records: &[CostRecord],
    ) -> Result<usize, StoreError> {
        let query = format!(
            r#"
            INSERT INTO {} (tenant_id, resource_id, period, service, cost, is_complete, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, resource_id, period) DO UPDATE SET
                service = EXCLUDED.service,
                cost = EXCLUDED.cost,
                is_complete = EXCLUDED.is_complete,
                last_updated = EXCLUDED.last_updated
            "#,
            self.table_name
        );

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for record in records {
            sqlx::query(&query)
                .bind(tenant_key(tenant))
                .bind(&record.resource_id)
                .bind(period.to_string())
                .bind(&record.service)
                .bind(record.cost)
                .bind(record.is_complete)
                .bind(record.last_updated)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(tenant = %tenant, period = %period, "Upserted cost rows");
        Ok(records.len())
    }

    #[instrument(skip(self))]
    async fn fetch_period(
        &self,
        tenant: TenantId,
        period: Period,
    ) -> Result<Vec<CostRecord>, StoreError> {
        let query = format!(
            r#"
            SELECT resource_id, period, service, cost, is_complete, last_updated
            FROM {}
            WHERE tenant_id = $1 AND period = $2
            ORDER BY cost DESC, resource_id
            "#,
            self.table_name
        );

        let rows = sqlx::query(&query)
            .bind(tenant_key(tenant))
            .bind(period.to_string())
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(Self::record_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn stats(&self, tenant: TenantId) -> Result<DurableStats, StoreError> {
        let query = format!(
            r#"
            SELECT period,
                   COUNT(*) AS records,
                   BOOL_AND(is_complete) AS is_complete,
                   MAX(last_updated) AS last_updated
            FROM {}
            WHERE tenant_id = $1
            GROUP BY period
            "#,
            self.table_name
        );

        let rows = sqlx::query(&query)
            .bind(tenant_key(tenant))
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let periods = rows
            .iter()
            .map(|row| {
                let period: String = row.try_get("period").map_err(map_sqlx_error)?;
                Ok(PeriodStats {
                    period: period
                        .trim()
                        .parse()
                        .map_err(|e| StoreError::Serialization(format!("stored period: {e}")))?,
                    records: row.try_get::<i64, _>("records").map_err(map_sqlx_error)? as u64,
                    is_complete: row
                        .try_get::<Option<bool>, _>("is_complete")
                        .map_err(map_sqlx_error)?
                        .unwrap_or(false),
                    last_updated: row.try_get("last_updated").map_err(map_sqlx_error)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(DurableStats::from_periods(periods))
    }
}

/// Classify a database error
///
/// Resource exhaustion (disk, memory, connection slots) is reported
/// separately from plain unavailability.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            if code
                .as_deref()
                .is_some_and(|code| EXHAUSTED_CODES.contains(&code))
            {
                StoreError::exhausted(STORE, err.to_string())
            } else {
                StoreError::unavailable(STORE, err.to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Serialization(err.to_string()),
        _ => StoreError::unavailable(STORE, err.to_string()),
    }
}
