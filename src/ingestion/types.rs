//! Core data types for the ingestion pipeline
//! Pure data structures with no behavior beyond classification helpers

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw listing row as exported by the scrapers, before normalization.
/// Every field is loosely typed text; numbers may carry currency symbols.
#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct RawListingRow {
    #[serde(rename = "Report_Date", default)]
    pub report_date: Option<String>,

    #[serde(rename = "Unique_Product_ID", default)]
    pub product_id: Option<String>,

    #[serde(rename = "SKU_ID", default)]
    pub sku_id: Option<String>,

    #[serde(rename = "Brand", default)]
    pub brand: Option<String>,

    #[serde(rename = "Company", default)]
    pub company: Option<String>,

    #[serde(rename = "Client_Name", default)]
    pub client_name: Option<String>,

    #[serde(rename = "Name", default)]
    pub product_description: Option<String>,

    #[serde(rename = "Category", default)]
    pub category: Option<String>,

    #[serde(rename = "City", default)]
    pub city: Option<String>,

    #[serde(rename = "Pincode", default)]
    pub pincode: Option<String>,

    #[serde(rename = "Platform", default)]
    pub platform: Option<String>,

    #[serde(rename = "MRP", default)]
    pub mrp: Option<String>,

    #[serde(rename = "Selling_Price", default)]
    pub selling_price: Option<String>,

    #[serde(rename = "Discount", default)]
    pub discount: Option<String>,

    #[serde(rename = "Availability", default)]
    pub availability: Option<String>,
}

impl RawListingRow {
    /// Build a row from a JSON document, where numeric fields may be numbers.
    /// Numbers are rendered back to text so pincodes and prices go through
    /// the same coercion as CSV input.
    pub fn from_json(doc: &serde_json::Value) -> Self {
        let field = |name: &str| -> Option<String> {
            match doc.get(name)? {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                other => Some(other.to_string()),
            }
        };

        RawListingRow {
            report_date: field("Report_Date"),
            product_id: field("Unique_Product_ID"),
            sku_id: field("SKU_ID"),
            brand: field("Brand"),
            company: field("Company"),
            client_name: field("Client_Name"),
            product_description: field("Name"),
            category: field("Category"),
            city: field("City"),
            pincode: field("Pincode"),
            platform: field("Platform"),
            mrp: field("MRP"),
            selling_price: field("Selling_Price"),
            discount: field("Discount"),
            availability: field("Availability"),
        }
    }
}

/// Stock status of one listing at one pincode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Available,
    NotAvailable,
    NotListed,
    Unknown,
}

impl AvailabilityStatus {
    /// Map the scraper's availability column onto the closed status set.
    /// "Yes" → Available, "No" → NotAvailable, "Item Not Found" → NotListed.
    pub fn from_source(raw: &str) -> Self {
        let value = raw.trim();
        if value.eq_ignore_ascii_case("yes") {
            AvailabilityStatus::Available
        } else if value.eq_ignore_ascii_case("no") {
            AvailabilityStatus::NotAvailable
        } else if value.eq_ignore_ascii_case("item not found") {
            AvailabilityStatus::NotListed
        } else {
            AvailabilityStatus::Unknown
        }
    }

    /// Any recognized status makes the pincode serviceable
    pub fn is_serviceable(self) -> bool {
        !matches!(self, AvailabilityStatus::Unknown)
    }

    /// Offered for sale, in stock or not
    pub fn is_listed(self) -> bool {
        matches!(
            self,
            AvailabilityStatus::Available | AvailabilityStatus::NotAvailable
        )
    }

    pub fn is_available(self) -> bool {
        matches!(self, AvailabilityStatus::Available)
    }
}

impl std::fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvailabilityStatus::Available => write!(f, "Yes"),
            AvailabilityStatus::NotAvailable => write!(f, "No"),
            AvailabilityStatus::NotListed => write!(f, "Item Not Found"),
            AvailabilityStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// What to do with a row whose report date cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePolicy {
    /// Drop the row and count it as malformed
    #[default]
    Reject,
    /// Legacy behavior: stamp the row with today's date
    DefaultToNow,
}

/// Listing record - one product on one platform at one pincode on one day.
/// Immutable once normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub report_date: NaiveDate,

    // Product identification
    pub product_id: String,
    pub sku_id: String,
    pub brand: String,
    pub company: String,
    pub client_name: String,
    pub product_description: String,
    pub category: String,

    // Location, city lower-cased for grouping
    pub city: String,
    pub pincode: String,
    pub platform: String,

    // Pricing, 0 when unknown
    pub mrp: f64,
    pub selling_price: f64,
    pub discount_percent: f64,

    pub availability: AvailabilityStatus,
}

impl ListingRecord {
    /// SKU identity used for unique-SKU counts; falls back to the product id
    pub fn sku_key(&self) -> &str {
        if self.sku_id.is_empty() {
            &self.product_id
        } else {
            &self.sku_id
        }
    }
}

/// Outcome of normalizing a batch of raw rows
#[derive(Debug, Default, Clone)]
pub struct Normalized {
    pub records: Vec<ListingRecord>,
    pub dropped: usize,
}

/// Grouping key of one rollup counter, mirroring the batch job's group-by columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupKey {
    pub report_date: Option<NaiveDate>,
    pub city: String,
    pub pincode: Option<String>,
    pub company: String,
    pub client_name: String,
    pub brand: String,
    pub product_description: String,
    pub product_id: String,
    pub platform: String,
    pub category: String,
}

/// Pre-aggregated counters standing in for many listing records.
/// Holds available_count <= listed_count <= recognized_count <= total_count.
///
/// With pincode granularity, `total_count` counts every row and
/// `recognized_count` the rows with a recognized status, so serviceability
/// can be decided again within any scope. Counters without a pincode are
/// pre-classified upstream: `total_count` already counts serviceable rows only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupCounter {
    pub key: RollupKey,
    pub available_count: u64,
    pub listed_count: u64,
    pub recognized_count: u64,
    pub total_count: u64,
    pub discount_sum: f64,
    pub discount_samples: u64,
    pub mrp_mean: f64,
    pub selling_price_mean: f64,
}

/// Database row from listing_rollups table. An empty pincode means the
/// counter was rolled up without pincode granularity.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RollupRow {
    pub report_date: NaiveDate,
    pub city: String,
    pub pincode: String,
    pub company: String,
    pub client_name: String,
    pub brand: String,
    pub product_description: String,
    pub product_id: String,
    pub platform: String,
    pub category: String,
    pub available_count: i64,
    pub listed_count: i64,
    pub recognized_count: i64,
    pub total_count: i64,
    pub discount_sum: f64,
    pub discount_samples: i64,
    pub mrp_mean: f64,
    pub selling_price_mean: f64,
}

/// Write operation statistics
#[derive(Debug, Default, Clone)]
pub struct WriteStats {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for WriteStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted: {}, updated: {}, skipped: {}, errors: {}",
            self.inserted, self.updated, self.skipped, self.errors
        )
    }
}
