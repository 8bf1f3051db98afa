//! Engine error types

use chrono::NaiveDate;
use thiserror::Error;

/// Why a raw listing row could not become a `ListingRecord`.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("cannot parse report date '{0}'")]
    UnparseableDate(String),
}

/// Caller errors at engine entry points. Data problems never surface here.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("own brand identity must not be empty")]
    EmptyOwnBrand,

    #[error("date range is inverted: from {from} is after to {to}")]
    InvertedDateRange { from: NaiveDate, to: NaiveDate },

    #[error("cannot parse filter date '{0}'")]
    InvalidFilterDate(String),

    #[error("unknown unparseable-date policy '{0}' (expected reject or default_to_now)")]
    UnknownDatePolicy(String),

    #[error("rollups without pincode granularity cannot be filtered; query raw listings instead")]
    CoarseRollupScope,
}

/// Why a rollup document could not become a `RollupCounter`.
#[derive(Debug, Error, PartialEq)]
pub enum RollupError {
    #[error("malformed rollup document: {0}")]
    Malformed(String),

    #[error("count '{field}' is not a non-negative integer: {value}")]
    InvalidCount { field: &'static str, value: f64 },

    #[error("tier counts out of order: available {available} <= listed {listed} <= recognized {recognized} <= total {total} does not hold")]
    TierViolation {
        available: u64,
        listed: u64,
        recognized: u64,
        total: u64,
    },

    #[error("cannot parse rollup report date '{0}'")]
    UnparseableDate(String),
}
