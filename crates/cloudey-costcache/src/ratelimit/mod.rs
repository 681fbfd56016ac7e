//! Rate limiting module
//!
//! Bounds outbound billing-API calls per tenant:
//! - RateLimiter: sliding one-second and one-minute windows, delay-only

pub mod limiter;

pub use limiter::{RateLimitConfig, RateLimiter};
