//! Metrics engine - serviceability, aggregation, insights and rollup reconciliation

pub mod aggregate;
pub mod classify;
pub mod filter;
pub mod insights;
pub mod reconcile;
pub mod types;

pub use aggregate::{
    aggregate, brand_breakdown, city_breakdown, compute_metrics, pincode_breakdown,
    platform_breakdown, tally_all, time_series, MetricSource,
};
pub use filter::FilterSet;
pub use insights::{compute_insights, infer_own_brand, resolve_own_brand};
pub use reconcile::{check_consistency, rescopable, scope_rollups, ConsistencyReport};
pub use types::*;
