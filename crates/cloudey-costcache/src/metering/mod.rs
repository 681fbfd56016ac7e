//! Metering module
//!
//! Turns raw billing line items into cost breakdowns:
//! - LineItem: one provider-reported cost entry
//! - CostAggregator: rate-limited, memoized fetch plus aggregation

pub mod aggregator;
pub mod line_item;

pub use aggregator::{aggregate, period_to_date, CostAggregator, CostBreakdownRow, CostSummary};
pub use line_item::LineItem;
