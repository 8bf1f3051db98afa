//! Data ingestion module - normalization, rollups and storage for listing data

pub mod fetch;
pub mod parse;
pub mod rollup;
pub mod types;
pub mod write;

pub use types::*;
