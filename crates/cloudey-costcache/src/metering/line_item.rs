//! Raw billing line items
//!
//! A line item is one provider-reported cost entry (usually one resource on
//! one day). Items arrive loosely typed: any field may be missing.

use chrono::NaiveDate;
use cloudey_common::RecordError;
use serde::{Deserialize, Serialize};

use crate::billing::GroupBy;

/// Provider-reported cost entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Service name
    #[serde(default)]
    pub service: Option<String>,
    /// Resource identifier
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Compartment the resource lives in
    #[serde(default)]
    pub scope_id: Option<String>,
    /// Cost amount; missing means zero
    #[serde(default)]
    pub amount: Option<f64>,
    /// Day the cost was incurred
    pub date: NaiveDate,
}

impl LineItem {
    /// Create a line item for a service
    pub fn new(service: impl Into<String>, amount: f64, date: NaiveDate) -> Self {
        Self {
            service: Some(service.into()),
            resource_id: None,
            scope_id: None,
            amount: Some(amount),
            date,
        }
    }

    /// Set the resource
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Set the scope
    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Drop the amount, as the provider does for some zero-cost entries
    pub fn without_amount(mut self) -> Self {
        self.amount = None;
        self
    }

    /// Cost contribution
    pub fn cost(&self) -> f64 {
        self.amount.unwrap_or(0.0)
    }

    /// Check the fields required to aggregate by `group_by`
    pub fn validate(&self, group_by: GroupBy) -> Result<(), RecordError> {
        if self.service.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(RecordError::MissingService);
        }
        if group_by == GroupBy::Resource
            && self
                .resource_id
                .as_deref()
                .map_or(true, |r| r.trim().is_empty())
        {
            return Err(RecordError::MissingResourceId);
        }
        if !self.cost().is_finite() {
            return Err(RecordError::NonFiniteAmount);
        }
        Ok(())
    }
}
