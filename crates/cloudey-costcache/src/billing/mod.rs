//! Billing API boundary
//!
//! The provider's usage API is consumed through [`BillingApi`]; everything
//! upstream of it (transport, auth, pagination) belongs to the implementor.

use async_trait::async_trait;
use chrono::NaiveDate;
use cloudey_common::{Result, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metering::LineItem;

/// Which part of the tenant's account a query covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Whole account; no client-side filtering
    Tenancy,
    /// One compartment; results are re-filtered by scope id
    Compartment(String),
}

impl Scope {
    /// Scope id line items must carry, if any
    pub fn filter_id(&self) -> Option<&str> {
        match self {
            Scope::Tenancy => None,
            Scope::Compartment(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Tenancy => f.write_str("tenancy"),
            Scope::Compartment(id) => write!(f, "compartment/{id}"),
        }
    }
}

/// Time bucket of returned line items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    #[default]
    Daily,
    Monthly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Daily => f.write_str("DAILY"),
            Granularity::Monthly => f.write_str("MONTHLY"),
        }
    }
}

/// Breakdown dimension of an aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Service,
    /// One row per (service, resource)
    Resource,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Service => f.write_str("service"),
            GroupBy::Resource => f.write_str("resource"),
        }
    }
}

/// One usage query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRequest {
    pub scope: Scope,
    /// First day covered
    pub start: NaiveDate,
    /// Last day covered (inclusive)
    pub end: NaiveDate,
    pub granularity: Granularity,
    pub group_by: GroupBy,
}

impl UsageRequest {
    /// Daily, service-grouped query over `[start, end]`
    pub fn new(scope: Scope, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            scope,
            start,
            end,
            granularity: Granularity::default(),
            group_by: GroupBy::default(),
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    /// Dimensions the provider must break results down by
    ///
    /// Compartment queries also need the scope id on every item so results
    /// can be re-filtered locally.
    pub fn dimensions(&self) -> Vec<&'static str> {
        let mut dims = vec!["service"];
        if self.group_by == GroupBy::Resource {
            dims.push("resource_id");
        }
        if matches!(self.scope, Scope::Compartment(_)) {
            dims.push("scope_id");
        }
        dims
    }
}

/// Provider usage API
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Fetch raw line items for one tenant
    ///
    /// Failures are reported as [`CloudeyError::UpstreamUnavailable`].
    ///
    /// [`CloudeyError::UpstreamUnavailable`]: cloudey_common::CloudeyError::UpstreamUnavailable
    async fn request_usage(&self, tenant: TenantId, request: &UsageRequest)
        -> Result<Vec<LineItem>>;
}
