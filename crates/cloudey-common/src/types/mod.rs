//! Core types for the Cloudey cost cache

pub mod cost_record;
pub mod period;
pub mod tenant;
