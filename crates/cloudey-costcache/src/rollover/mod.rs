//! Rollover module
//!
//! Moves closed periods from the volatile to the durable tier:
//! - RolloverJob: per-tenant and batch rollover plus a background scheduler
//! - TenantDirectory: where the batch gets its tenant list

pub mod job;

pub use job::{
    RolloverConfig, RolloverJob, RolloverStats, StaticTenantDirectory, TenantDirectory,
};
