//! Configuration loaded from environment variables

use crate::cache::DEFAULT_CAPACITY;
use crate::error::EngineError;
use crate::ingestion::types::DatePolicy;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration shared by the api-server and data-ingestion binaries
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub listings_csv: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    pub date_policy: DatePolicy,
    pub own_brand: Option<String>,
    pub reconcile_tolerance: f64,
    pub limit_records: usize, // 0 = no limit
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            listings_csv: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            date_policy: DatePolicy::Reject,
            own_brand: None,
            reconcile_tolerance: 0.1,
            limit_records: 0,
            cache_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Parse the ON_UNPARSEABLE_DATE setting
pub fn parse_date_policy(raw: &str) -> Result<DatePolicy, EngineError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "reject" => Ok(DatePolicy::Reject),
        "default_to_now" | "defaulttonow" | "now" => Ok(DatePolicy::DefaultToNow),
        other => Err(EngineError::UnknownDatePolicy(other.to_string())),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Ok(Config {
            database_url: get("DATABASE_URL"),

            listings_csv: get("LISTINGS_CSV").map(PathBuf::from),

            bind_addr: match get("BIND_ADDR") {
                Some(addr) => addr
                    .parse()
                    .with_context(|| format!("BIND_ADDR '{}' must be host:port", addr))?,
                None => defaults.bind_addr,
            },

            date_policy: match get("ON_UNPARSEABLE_DATE") {
                Some(policy) => parse_date_policy(&policy)?,
                None => defaults.date_policy,
            },

            own_brand: get("OWN_BRAND").map(|b| b.trim().to_string()),

            reconcile_tolerance: match get("RECONCILE_TOLERANCE") {
                Some(tolerance) => tolerance
                    .parse()
                    .context("RECONCILE_TOLERANCE must be a valid number")?,
                None => defaults.reconcile_tolerance,
            },

            limit_records: match get("LIMIT_RECORDS") {
                Some(limit) => limit
                    .parse()
                    .context("LIMIT_RECORDS must be a valid number")?,
                None => defaults.limit_records,
            },

            cache_capacity: match get("RESULT_CACHE_CAPACITY") {
                Some(capacity) => capacity
                    .parse()
                    .context("RESULT_CACHE_CAPACITY must be a valid number")?,
                None => defaults.cache_capacity,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.date_policy, DatePolicy::Reject);
        assert_eq!(config.reconcile_tolerance, 0.1);
        assert_eq!(config.limit_records, 0);
        assert_eq!(config.cache_capacity, 256);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("ON_UNPARSEABLE_DATE", "default_to_now"),
            ("OWN_BRAND", " Amul "),
            ("LISTINGS_CSV", "/data/listings.csv"),
            ("LIMIT_RECORDS", "500"),
            ("RESULT_CACHE_CAPACITY", "32"),
            ("DATABASE_URL", ""),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.date_policy, DatePolicy::DefaultToNow);
        assert_eq!(config.own_brand.as_deref(), Some("Amul"));
        assert_eq!(config.listings_csv, Some(PathBuf::from("/data/listings.csv")));
        assert_eq!(config.limit_records, 500);
        assert_eq!(config.cache_capacity, 32);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("ON_UNPARSEABLE_DATE", "guess")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RECONCILE_TOLERANCE", "tight")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BIND_ADDR", "localhost")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RESULT_CACHE_CAPACITY", "-1")])).is_err());
    }
}
