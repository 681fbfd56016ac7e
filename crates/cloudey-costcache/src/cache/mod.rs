//! Caching module
//!
//! - ResponseCache: short-TTL memoization of provider queries
//! - HybridCostCache: volatile tier for the current period, durable tier for
//!   closed periods

pub mod hybrid;
pub mod response;

pub use hybrid::{CostCacheStats, HybridCostCache, VolatileTierStats};
pub use response::{CacheArgs, ResponseCache, ResponseCacheConfig, ResponseCacheMetrics};
