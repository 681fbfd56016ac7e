//! Aggregated monthly cost rows
//!
//! A [`CostRecord`] is the only shape persisted by either cache tier. Rows are
//! unique per `(resource_id, period)` within a tenant; writing the same pair
//! again replaces the row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::Period;
use crate::error::RecordError;

/// Monthly cost of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Billing period the cost belongs to
    pub period: Period,
    /// Opaque provider resource identifier
    pub resource_id: String,
    /// Service the resource is billed under
    pub service: String,
    /// Total cost over the period (presentation-rounded)
    pub cost: Decimal,
    /// Set once the period is closed and the row is final
    pub is_complete: bool,
    /// When this row was last written
    pub last_updated: DateTime<Utc>,
}

impl CostRecord {
    /// Create an open (not yet complete) record
    pub fn new(
        period: Period,
        resource_id: impl Into<String>,
        service: impl Into<String>,
        cost: Decimal,
    ) -> Self {
        Self {
            period,
            resource_id: resource_id.into(),
            service: service.into(),
            cost,
            is_complete: false,
            last_updated: Utc::now(),
        }
    }

    /// Set the completeness flag
    pub fn with_complete(mut self, is_complete: bool) -> Self {
        self.is_complete = is_complete;
        self
    }

    /// Set the last-updated timestamp
    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = last_updated;
        self
    }

    /// Validate the record in isolation
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.resource_id.trim().is_empty() {
            return Err(RecordError::MissingResourceId);
        }
        if self.service.trim().is_empty() {
            return Err(RecordError::MissingService);
        }
        Ok(())
    }

    /// Validate the record and check it belongs to `period`
    pub fn validate_for(&self, period: Period) -> Result<(), RecordError> {
        self.validate()?;
        if self.period != period {
            return Err(RecordError::PeriodMismatch {
                expected: period.to_string(),
                actual: self.period.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn period() -> Period {
        "2025-11".parse().unwrap()
    }

    #[test]
    fn test_record_creation() {
        let record = CostRecord::new(period(), "r1", "COMPUTE", dec!(12.50));
        assert!(!record.is_complete);
        assert_eq!(record.cost, dec!(12.50));
        assert!(record.validate().is_ok());
        assert!(record.with_complete(true).is_complete);
    }

    #[test]
    fn test_record_validation() {
        let missing_resource = CostRecord::new(period(), " ", "COMPUTE", dec!(1));
        assert_eq!(missing_resource.validate(), Err(RecordError::MissingResourceId));

        let missing_service = CostRecord::new(period(), "r1", "", dec!(1));
        assert_eq!(missing_service.validate(), Err(RecordError::MissingService));

        let other_period = CostRecord::new("2025-10".parse().unwrap(), "r1", "COMPUTE", dec!(1));
        assert!(matches!(
            other_period.validate_for(period()),
            Err(RecordError::PeriodMismatch { .. })
        ));
    }

    #[test]
    fn test_record_serde_roundtrip_keeps_period_key() {
        let record = CostRecord::new(period(), "r1", "COMPUTE", dec!(12.50));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["period"], "2025-11");
        let back: CostRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
