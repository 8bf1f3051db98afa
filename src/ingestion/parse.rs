//! Parse functions - normalize raw listing rows into ListingRecord structs

use crate::error::NormalizeError;
use crate::ingestion::types::{
    AvailabilityStatus, DatePolicy, ListingRecord, Normalized, RawListingRow,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Only the first few failures are logged individually
const MAX_LOGGED_ERRORS: usize = 10;

/// Parse a report date in DD-MM-YYYY, falling back to ISO-8601
pub fn parse_report_date(date_str: &str) -> Option<NaiveDate> {
    let value = date_str.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%d-%m-%Y") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

/// Drop a leading "Rs.", "Rs" or "INR" in any letter case
fn strip_currency_prefix(value: &str) -> &str {
    for prefix in ["rs.", "rs", "inr"] {
        if value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return &value[prefix.len()..];
        }
    }
    value
}

/// Parse a loosely formatted amount ("₹1,299.00", "12%", " 45 ", "rs.40").
/// Returns None for missing or non-numeric input.
pub fn parse_amount(raw: Option<&str>) -> Option<f64> {
    let cleaned: String = strip_currency_prefix(raw?.trim())
        .chars()
        .filter(|c| !matches!(c, '₹' | ',' | '%') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalize a single raw row. Pure apart from the DefaultToNow date policy.
pub fn normalize_row(
    row: RawListingRow,
    date_policy: DatePolicy,
) -> Result<ListingRecord, NormalizeError> {
    let pincode = row
        .pincode
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(NormalizeError::MissingField("Pincode"))?
        .to_string();

    let raw_date = row.report_date.as_deref().unwrap_or("");
    let report_date = match (parse_report_date(raw_date), date_policy) {
        (Some(date), _) => date,
        (None, DatePolicy::DefaultToNow) => Utc::now().date_naive(),
        (None, DatePolicy::Reject) => {
            return Err(NormalizeError::UnparseableDate(raw_date.to_string()))
        }
    };

    // Non-numeric prices become 0 so downstream sums stay defined
    let mrp = parse_amount(row.mrp.as_deref()).unwrap_or(0.0).max(0.0);
    let selling_price = parse_amount(row.selling_price.as_deref())
        .unwrap_or(0.0)
        .max(0.0);
    let discount_percent = match parse_amount(row.discount.as_deref()) {
        Some(discount) => discount.clamp(0.0, 100.0),
        None => derive_discount(mrp, selling_price),
    };

    let availability = row
        .availability
        .as_deref()
        .map(AvailabilityStatus::from_source)
        .unwrap_or(AvailabilityStatus::Unknown);

    Ok(ListingRecord {
        report_date,
        product_id: text(row.product_id),
        sku_id: text(row.sku_id),
        brand: text(row.brand),
        company: text(row.company),
        client_name: text(row.client_name),
        product_description: text(row.product_description),
        category: text(row.category),
        city: text(row.city).to_lowercase(),
        pincode,
        platform: text(row.platform),
        mrp,
        selling_price,
        discount_percent,
        availability,
    })
}

/// Discount implied by MRP and selling price, 0 when MRP is unknown
fn derive_discount(mrp: f64, selling_price: f64) -> f64 {
    if mrp <= 0.0 || selling_price <= 0.0 {
        return 0.0;
    }
    ((mrp - selling_price) / mrp * 100.0).clamp(0.0, 100.0)
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Normalize a batch, dropping malformed rows and counting them
pub fn normalize_rows<I>(rows: I, date_policy: DatePolicy) -> Normalized
where
    I: IntoIterator<Item = RawListingRow>,
{
    let mut normalized = Normalized::default();

    for (idx, row) in rows.into_iter().enumerate() {
        match normalize_row(row, date_policy) {
            Ok(record) => normalized.records.push(record),
            Err(e) => {
                normalized.dropped += 1;
                if normalized.dropped <= MAX_LOGGED_ERRORS {
                    warn!("Dropping row {}: {}", idx, e);
                }
            }
        }
    }

    info!(
        "Normalized {} listing records ({} rows dropped)",
        normalized.records.len(),
        normalized.dropped
    );

    normalized
}

/// Parse a listings CSV export from any reader
pub fn parse_listings_csv<R: Read>(reader: R, date_policy: DatePolicy) -> Normalized {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut deserialize_errors = 0;

    for (idx, result) in reader.deserialize::<RawListingRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                deserialize_errors += 1;
                if deserialize_errors <= MAX_LOGGED_ERRORS {
                    warn!("Failed to deserialize row {}: {}", idx, e);
                }
            }
        }
    }

    let mut normalized = normalize_rows(rows, date_policy);
    normalized.dropped += deserialize_errors;
    normalized
}

/// Parse a listings CSV export from disk
pub fn parse_listings_file(path: &Path, date_policy: DatePolicy) -> Result<Normalized> {
    info!("Parsing listings CSV from {:?}", path);
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open listings file {}", path.display()))?;
    Ok(parse_listings_csv(file, date_policy))
}

/// Parse several exports as one batch. Fails on the first export that cannot
/// be read, since a partial batch would skew every pincode classification.
pub fn parse_listings_files(paths: &[PathBuf], date_policy: DatePolicy) -> Result<Normalized> {
    let mut batch = Normalized::default();
    for path in paths {
        let normalized = parse_listings_file(path, date_policy)?;
        batch.dropped += normalized.dropped;
        batch.records.extend(normalized.records);
    }
    info!(
        "Parsed {} export(s): {} records, {} rows dropped",
        paths.len(),
        batch.records.len(),
        batch.dropped
    );
    Ok(batch)
}
