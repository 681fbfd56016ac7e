//! # Cloudey Common
//!
//! Shared types, errors, and the clock abstraction used by the Cloudey cost
//! cache.
//!
//! ## Core Types
//!
//! - [`TenantId`]: opaque identifier of a tenant; all data and rate budgets
//!   are scoped to one
//! - [`Period`]: calendar-month billing bucket (`YYYY-MM`)
//! - [`CostRecord`]: aggregated monthly cost of one resource
//!
//! ## Time
//!
//! - [`Clock`]: source of "now"; [`SystemClock`] in production,
//!   [`FixedClock`] in tests

pub mod clock;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CloudeyError, ErrorKind, RecordError, Result, StoreError};
pub use types::{
    cost_record::CostRecord,
    period::{Period, PeriodStatus},
    tenant::TenantId,
};

/// Cloudey version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default reporting currency
pub const DEFAULT_CURRENCY: &str = "USD";

/// Seconds in one day, used for tier TTL arithmetic
pub const SECONDS_PER_DAY: u64 = 86_400;
