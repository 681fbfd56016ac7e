//! Cost cache configuration
//!
//! Defaults match production. Any field can be overridden with a
//! `CLOUDEY__`-prefixed environment variable, nesting with `__`:
//!
//! ```text
//! CLOUDEY__REDIS_URL=redis://cache:6379
//! CLOUDEY__RATE_LIMIT__CALLS_PER_SECOND=10
//! CLOUDEY__ROLLOVER__TENANTS=1,2,42
//! ```

use cloudey_common::{CloudeyError, Result, TenantId};
use serde::{Deserialize, Serialize};

use crate::cache::ResponseCacheConfig;
use crate::ratelimit::RateLimitConfig;
use crate::rollover::RolloverConfig;

const ENV_PREFIX: &str = "CLOUDEY";
const ENV_SEPARATOR: &str = "__";

/// Cost cache service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostCacheConfig {
    /// Volatile tier
    pub redis_url: String,
    /// Durable tier
    pub database_url: String,
    /// Durable tier table
    pub durable_table: String,
    /// Prefix of every volatile key
    pub key_prefix: String,
    /// Currency totals are reported in
    pub currency: String,
    pub rate_limit: RateLimitConfig,
    pub response_cache: ResponseCacheConfig,
    pub rollover: RolloverConfig,
}

impl Default for CostCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://cloudey@localhost:5432/cloudey".to_string(),
            durable_table: "cost_records".to_string(),
            key_prefix: "cloudey".to_string(),
            currency: cloudey_common::DEFAULT_CURRENCY.to_string(),
            rate_limit: RateLimitConfig::default(),
            response_cache: ResponseCacheConfig::default(),
            rollover: RolloverConfig::default(),
        }
    }
}

impl CostCacheConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();
        Self::from_environment(config::Environment::default())
    }

    /// Load from an explicit environment source
    pub fn from_environment(env: config::Environment) -> Result<Self> {
        let env = env
            .prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("rollover.tenants");

        let cfg: Self = config::Config::builder()
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CloudeyError::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        let limits = &self.rate_limit;
        if limits.calls_per_second == 0 || limits.calls_per_minute == 0 {
            return Err(CloudeyError::Config("rate limits must be positive".into()));
        }
        if limits.calls_per_minute < limits.calls_per_second {
            return Err(CloudeyError::Config(
                "calls_per_minute must be at least calls_per_second".into(),
            ));
        }

        let ttls = &self.response_cache;
        if ttls.default_ttl_secs == 0 || ttls.historical_ttl_secs == 0 || ttls.recent_ttl_secs == 0
        {
            return Err(CloudeyError::Config("response cache TTLs must be positive".into()));
        }

        if self.rollover.check_interval_secs == 0 {
            return Err(CloudeyError::Config(
                "rollover check interval must be positive".into(),
            ));
        }

        let table_ok = !self.durable_table.is_empty()
            && self
                .durable_table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !table_ok {
            return Err(CloudeyError::Config(format!(
                "invalid durable table name: {:?}",
                self.durable_table
            )));
        }

        if self.key_prefix.is_empty() {
            return Err(CloudeyError::Config("key_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Tenants the rollover job covers
    pub fn rollover_tenants(&self) -> Vec<TenantId> {
        self.rollover
            .tenants
            .iter()
            .copied()
            .map(TenantId::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = CostCacheConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.rate_limit.calls_per_second, 18);
        assert_eq!(cfg.rate_limit.calls_per_minute, 140);
        assert_eq!(cfg.response_cache.historical_ttl_secs, 3600);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let cfg = CostCacheConfig::from_environment(env(&[])).unwrap();
        assert_eq!(cfg, CostCacheConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let cfg = CostCacheConfig::from_environment(env(&[
            ("CLOUDEY__REDIS_URL", "redis://cache:6379"),
            ("CLOUDEY__RATE_LIMIT__CALLS_PER_SECOND", "5"),
            ("CLOUDEY__ROLLOVER__RUN_ON_STARTUP", "false"),
            ("CLOUDEY__ROLLOVER__TENANTS", "1,2,42"),
        ]))
        .unwrap();

        assert_eq!(cfg.redis_url, "redis://cache:6379");
        assert_eq!(cfg.rate_limit.calls_per_second, 5);
        assert_eq!(cfg.rate_limit.calls_per_minute, 140);
        assert!(!cfg.rollover.run_on_startup);
        assert_eq!(
            cfg.rollover_tenants(),
            vec![TenantId::new(1), TenantId::new(2), TenantId::new(42)]
        );
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut cfg = CostCacheConfig::default();
        cfg.rate_limit.calls_per_minute = 10;
        assert!(cfg.validate().is_err());

        let mut cfg = CostCacheConfig::default();
        cfg.response_cache.recent_ttl_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = CostCacheConfig::default();
        cfg.durable_table = "costs; DROP TABLE x".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_environment_value_is_config_error() {
        let err = CostCacheConfig::from_environment(env(&[(
            "CLOUDEY__RATE_LIMIT__CALLS_PER_SECOND",
            "lots",
        )]))
        .unwrap_err();
        assert!(matches!(err, CloudeyError::Config(_)));
    }
}
