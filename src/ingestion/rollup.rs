//! Rollup functions - pre-aggregate listing records into counters and decode
//! counter documents produced by the batch job

use crate::error::RollupError;
use crate::ingestion::parse::parse_report_date;
use crate::ingestion::types::{ListingRecord, RollupCounter, RollupKey, RollupRow};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Only the first few failures are logged individually
const MAX_LOGGED_ERRORS: usize = 10;

#[derive(Default)]
struct Accumulator {
    available: u64,
    listed: u64,
    recognized: u64,
    total: u64,
    discount_sum: f64,
    discount_samples: u64,
    mrp_sum: f64,
    selling_price_sum: f64,
}

/// Build rollup counters from normalized records, one per product, platform,
/// pincode and report date.
///
/// Counters keep the pincode and the number of rows with a recognized
/// status, so serviceability is decided by whoever tallies them, within
/// whatever scope they select. Rows are not deduplicated.
pub fn build_rollups(records: &[ListingRecord]) -> Vec<RollupCounter> {
    let mut groups: BTreeMap<RollupKey, Accumulator> = BTreeMap::new();

    for record in records {
        let key = RollupKey {
            report_date: Some(record.report_date),
            city: record.city.clone(),
            pincode: Some(record.pincode.clone()),
            company: record.company.clone(),
            client_name: record.client_name.clone(),
            brand: record.brand.clone(),
            product_description: record.product_description.clone(),
            product_id: record.product_id.clone(),
            platform: record.platform.clone(),
            category: record.category.clone(),
        };

        let acc = groups.entry(key).or_default();
        acc.total += 1;
        if record.availability.is_serviceable() {
            acc.recognized += 1;
        }
        if record.availability.is_listed() {
            acc.listed += 1;
        }
        if record.availability.is_available() {
            acc.available += 1;
        }
        acc.discount_sum += record.discount_percent;
        acc.discount_samples += 1;
        acc.mrp_sum += record.mrp;
        acc.selling_price_sum += record.selling_price;
    }

    let counters: Vec<RollupCounter> = groups
        .into_iter()
        .map(|(key, acc)| RollupCounter {
            key,
            available_count: acc.available,
            listed_count: acc.listed,
            recognized_count: acc.recognized,
            total_count: acc.total,
            discount_sum: acc.discount_sum,
            discount_samples: acc.discount_samples,
            mrp_mean: mean(acc.mrp_sum, acc.total),
            selling_price_mean: mean(acc.selling_price_sum, acc.total),
        })
        .collect();

    info!(
        "Built {} rollup counters from {} records",
        counters.len(),
        records.len()
    );

    counters
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Check available <= listed <= recognized <= total
pub fn validate_counts(
    available: u64,
    listed: u64,
    recognized: u64,
    total: u64,
) -> Result<(), RollupError> {
    if available <= listed && listed <= recognized && recognized <= total {
        Ok(())
    } else {
        Err(RollupError::TierViolation {
            available,
            listed,
            recognized,
            total,
        })
    }
}

/// Field spellings accepted in rollup documents, preferred spelling first.
/// Must match the rename/alias pairs on `RollupDocument`.
const FIELD_SPELLINGS: &[(&str, &str)] = &[
    ("availableCount", "available_count"),
    ("listedCount", "listed_count"),
    ("recognizedCount", "recognized_count"),
    ("totalCount", "total_count"),
    ("discountSum", "discount_sum"),
    ("sampleSize", "sample_size"),
    ("Discount", "discount"),
    ("MRP", "mrp"),
    ("Selling_Price", "selling_price"),
    ("Report_Date", "report_date"),
    ("City", "city"),
    ("Pincode", "pincode"),
    ("Company", "company"),
    ("Client_Name", "client_name"),
    ("Brand", "brand"),
    ("Name", "name"),
    ("Unique_Product_ID", "product_id"),
    ("Platform", "platform"),
    ("Category", "category"),
];

/// Rollup document as stored by the batch job. Every field accepts the
/// spellings listed in `FIELD_SPELLINGS`.
#[derive(Debug, Deserialize)]
struct RollupDocument {
    #[serde(rename = "availableCount", alias = "available_count")]
    available_count: f64,

    #[serde(rename = "listedCount", alias = "listed_count")]
    listed_count: f64,

    #[serde(rename = "recognizedCount", alias = "recognized_count", default)]
    recognized_count: Option<f64>,

    #[serde(rename = "totalCount", alias = "total_count")]
    total_count: f64,

    #[serde(rename = "discountSum", alias = "discount_sum", default)]
    discount_sum: Option<f64>,

    #[serde(rename = "sampleSize", alias = "sample_size", default)]
    sample_size: Option<f64>,

    #[serde(rename = "Discount", alias = "discount", default)]
    discount_mean: Option<f64>,

    #[serde(rename = "MRP", alias = "mrp", default)]
    mrp: Option<f64>,

    #[serde(rename = "Selling_Price", alias = "selling_price", default)]
    selling_price: Option<f64>,

    #[serde(rename = "Report_Date", alias = "report_date", default)]
    report_date: Option<String>,

    #[serde(rename = "City", alias = "city", default)]
    city: Option<String>,

    #[serde(rename = "Pincode", alias = "pincode", default)]
    pincode: Option<Value>,

    #[serde(rename = "Company", alias = "company", default)]
    company: Option<String>,

    #[serde(rename = "Client_Name", alias = "client_name", default)]
    client_name: Option<String>,

    #[serde(rename = "Brand", alias = "brand", default)]
    brand: Option<String>,

    #[serde(rename = "Name", alias = "name", default)]
    product_description: Option<String>,

    #[serde(rename = "Unique_Product_ID", alias = "product_id", default)]
    product_id: Option<String>,

    #[serde(rename = "Platform", alias = "platform", default)]
    platform: Option<String>,

    #[serde(rename = "Category", alias = "category", default)]
    category: Option<String>,
}

/// When a document carries a field under both spellings, keep the preferred
/// one. Returns None when nothing needs dropping.
fn drop_duplicate_spellings(doc: &Value) -> Option<Value> {
    let object = doc.as_object()?;
    let duplicated: Vec<(&str, &str)> = FIELD_SPELLINGS
        .iter()
        .copied()
        .filter(|(preferred, alias)| object.contains_key(*preferred) && object.contains_key(*alias))
        .collect();

    if duplicated.is_empty() {
        return None;
    }

    let mut object = object.clone();
    for (preferred, alias) in duplicated {
        debug!("Rollup document has both {} and {}; using {}", preferred, alias, preferred);
        object.remove(alias);
    }
    Some(Value::Object(object))
}

fn count(field: &'static str, value: f64) -> Result<u64, RollupError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(RollupError::InvalidCount { field, value })
    }
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Decode one rollup document into a validated counter.
///
/// Documents without `recognizedCount` come from the legacy job, whose
/// `totalCount` only counts serviceable rows; every counted row is then
/// taken as recognized.
pub fn decode_rollup_document(doc: &Value) -> Result<RollupCounter, RollupError> {
    let deduplicated = drop_duplicate_spellings(doc);
    let doc = RollupDocument::deserialize(deduplicated.as_ref().unwrap_or(doc))
        .map_err(|e| RollupError::Malformed(e.to_string()))?;

    let available_count = count("availableCount", doc.available_count)?;
    let listed_count = count("listedCount", doc.listed_count)?;
    let total_count = count("totalCount", doc.total_count)?;
    let recognized_count = match doc.recognized_count {
        Some(recognized) => count("recognizedCount", recognized)?,
        None => total_count,
    };
    validate_counts(available_count, listed_count, recognized_count, total_count)?;

    let report_date = match doc.report_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            parse_report_date(raw).ok_or_else(|| RollupError::UnparseableDate(raw.to_string()))?,
        ),
    };

    let pincode = match doc.pincode {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|p| !p.is_empty()),
        Some(other) => Some(other.to_string()),
    };

    // Legacy documents only carry the mean discount over the group
    let discount_samples = match doc.sample_size {
        Some(size) => count("sampleSize", size)?,
        None if doc.discount_sum.is_some() || doc.discount_mean.is_some() => total_count,
        None => 0,
    };
    let discount_sum = doc
        .discount_sum
        .or_else(|| doc.discount_mean.map(|m| m * discount_samples as f64))
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);

    Ok(RollupCounter {
        key: RollupKey {
            report_date,
            city: text(doc.city).to_lowercase(),
            pincode,
            company: text(doc.company),
            client_name: text(doc.client_name),
            brand: text(doc.brand),
            product_description: text(doc.product_description),
            product_id: text(doc.product_id),
            platform: text(doc.platform),
            category: text(doc.category),
        },
        available_count,
        listed_count,
        recognized_count,
        total_count,
        discount_sum,
        discount_samples,
        mrp_mean: doc.mrp.filter(|v| v.is_finite()).unwrap_or(0.0),
        selling_price_mean: doc.selling_price.filter(|v| v.is_finite()).unwrap_or(0.0),
    })
}

/// Convert a stored row back into a validated counter
pub fn counter_from_row(row: RollupRow) -> Result<RollupCounter, RollupError> {
    let non_negative = |field: &'static str, value: i64| {
        u64::try_from(value).map_err(|_| RollupError::InvalidCount {
            field,
            value: value as f64,
        })
    };

    let available_count = non_negative("available_count", row.available_count)?;
    let listed_count = non_negative("listed_count", row.listed_count)?;
    let recognized_count = non_negative("recognized_count", row.recognized_count)?;
    let total_count = non_negative("total_count", row.total_count)?;
    validate_counts(available_count, listed_count, recognized_count, total_count)?;

    Ok(RollupCounter {
        key: RollupKey {
            report_date: Some(row.report_date),
            city: row.city,
            pincode: Some(row.pincode).filter(|p| !p.is_empty()),
            company: row.company,
            client_name: row.client_name,
            brand: row.brand,
            product_description: row.product_description,
            product_id: row.product_id,
            platform: row.platform,
            category: row.category,
        },
        available_count,
        listed_count,
        recognized_count,
        total_count,
        discount_sum: row.discount_sum,
        discount_samples: non_negative("discount_samples", row.discount_samples)?,
        mrp_mean: row.mrp_mean,
        selling_price_mean: row.selling_price_mean,
    })
}

/// Counters decoded from a batch of documents
#[derive(Debug, Default, Clone)]
pub struct DecodedRollups {
    pub counters: Vec<RollupCounter>,
    pub dropped: usize,
}

/// Decode a batch of rollup documents, dropping and counting malformed ones
pub fn decode_rollup_documents(docs: &[Value]) -> DecodedRollups {
    let mut decoded = DecodedRollups::default();

    for (idx, doc) in docs.iter().enumerate() {
        match decode_rollup_document(doc) {
            Ok(counter) => decoded.counters.push(counter),
            Err(e) => {
                decoded.dropped += 1;
                if decoded.dropped <= MAX_LOGGED_ERRORS {
                    warn!("Dropping rollup document {}: {}", idx, e);
                }
            }
        }
    }

    info!(
        "Decoded {} rollup counters ({} documents dropped)",
        decoded.counters.len(),
        decoded.dropped
    );

    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::types::AvailabilityStatus;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(pincode: &str, product: &str, status: AvailabilityStatus) -> ListingRecord {
        ListingRecord {
            report_date: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
            product_id: product.to_string(),
            sku_id: String::new(),
            brand: "Amul".to_string(),
            company: "GCMMF".to_string(),
            client_name: "Amul".to_string(),
            product_description: format!("{} 500ml", product),
            category: "Dairy".to_string(),
            city: "mumbai".to_string(),
            pincode: pincode.to_string(),
            platform: "Blinkit".to_string(),
            mrp: 100.0,
            selling_price: 80.0,
            discount_percent: 20.0,
            availability: status,
        }
    }

    #[test]
    fn test_build_rollups_counts() {
        use AvailabilityStatus::*;
        let records = vec![
            record("400001", "P1", Available),
            record("400001", "P1", NotAvailable),
            record("400001", "P1", Unknown),
            record("400002", "P1", NotListed),
            record("400003", "P1", Unknown),
        ];
        let counters = build_rollups(&records);

        assert_eq!(counters.len(), 3);
        let first = &counters[0];
        assert_eq!(first.key.pincode.as_deref(), Some("400001"));
        assert_eq!(first.total_count, 3);
        assert_eq!(first.recognized_count, 2);
        assert_eq!(first.listed_count, 2);
        assert_eq!(first.available_count, 1);
        assert_eq!(first.discount_samples, 3);
        assert!((first.discount_sum - 60.0).abs() < 1e-9);

        assert_eq!(counters[1].recognized_count, 1);
        assert_eq!(counters[1].listed_count, 0);

        // Only Unknown rows: kept, but nothing recognized
        assert_eq!(counters[2].total_count, 1);
        assert_eq!(counters[2].recognized_count, 0);
    }

    #[test]
    fn test_build_rollups_splits_products() {
        use AvailabilityStatus::*;
        let records = vec![
            record("400001", "P1", Available),
            record("400001", "P2", NotAvailable),
        ];
        let counters = build_rollups(&records);

        assert_eq!(counters.len(), 2);
        assert_eq!(counters[0].key.product_id, "P1");
        assert_eq!(counters[1].key.product_id, "P2");
    }

    #[test]
    fn test_decode_camel_case_document() {
        let doc = json!({
            "City": "Mumbai",
            "Brand": "Amul",
            "Platform": "Zepto",
            "Report_Date": "05-03-2025",
            "availableCount": 3,
            "listedCount": 4,
            "totalCount": 6,
            "Discount": 12.5
        });
        let counter = decode_rollup_document(&doc).unwrap();

        assert_eq!(counter.key.city, "mumbai");
        assert_eq!(counter.key.report_date, NaiveDate::from_ymd_opt(2025, 3, 5));
        assert_eq!(counter.available_count, 3);
        assert_eq!(counter.total_count, 6);
        // Legacy document: every counted row is recognized
        assert_eq!(counter.recognized_count, 6);
        assert_eq!(counter.discount_samples, 6);
        assert!((counter.discount_sum - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_snake_case_document() {
        let doc = json!({
            "brand": "Amul",
            "pincode": 400001,
            "available_count": 1.0,
            "listed_count": 2,
            "recognized_count": 2,
            "total_count": 3,
            "discount_sum": 30.0,
            "sample_size": 2
        });
        let counter = decode_rollup_document(&doc).unwrap();

        assert_eq!(counter.key.pincode.as_deref(), Some("400001"));
        assert_eq!(counter.available_count, 1);
        assert_eq!(counter.recognized_count, 2);
        assert_eq!(counter.total_count, 3);
        assert_eq!(counter.discount_samples, 2);
        assert_eq!(counter.key.report_date, None);
    }

    #[test]
    fn test_decode_prefers_camel_case_when_both_present() {
        let doc = json!({
            "availableCount": 1,
            "available_count": 9,
            "listedCount": 2,
            "totalCount": 4,
            "total_count": 0,
            "Brand": "Amul",
            "brand": "Other"
        });
        let counter = decode_rollup_document(&doc).unwrap();

        assert_eq!(counter.available_count, 1);
        assert_eq!(counter.total_count, 4);
        assert_eq!(counter.key.brand, "Amul");
        assert_eq!(decode_rollup_documents(&[doc]).dropped, 0);
    }

    #[test]
    fn test_decode_rejects_tier_violation() {
        let doc = json!({ "availableCount": 5, "listedCount": 4, "totalCount": 6 });
        assert_eq!(
            decode_rollup_document(&doc),
            Err(RollupError::TierViolation {
                available: 5,
                listed: 4,
                recognized: 6,
                total: 6
            })
        );

        let doc = json!({ "availableCount": 1, "listedCount": 3, "recognizedCount": 2, "totalCount": 6 });
        assert!(matches!(
            decode_rollup_document(&doc),
            Err(RollupError::TierViolation { recognized: 2, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_fractional_count() {
        let doc = json!({ "availableCount": 1.5, "listedCount": 4, "totalCount": 6 });
        assert!(matches!(
            decode_rollup_document(&doc),
            Err(RollupError::InvalidCount { field: "availableCount", .. })
        ));
    }

    #[test]
    fn test_counter_from_row() {
        let row = RollupRow {
            report_date: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
            city: "pune".to_string(),
            pincode: "411001".to_string(),
            company: String::new(),
            client_name: String::new(),
            brand: "Amul".to_string(),
            product_description: String::new(),
            product_id: "P1".to_string(),
            platform: "Zepto".to_string(),
            category: String::new(),
            available_count: 2,
            listed_count: 3,
            recognized_count: 3,
            total_count: 4,
            discount_sum: 20.0,
            discount_samples: 4,
            mrp_mean: 50.0,
            selling_price_mean: 45.0,
        };
        let counter = counter_from_row(row.clone()).unwrap();
        assert_eq!(counter.key.pincode.as_deref(), Some("411001"));
        assert_eq!(counter.recognized_count, 3);
        assert_eq!(counter.total_count, 4);

        let legacy = RollupRow {
            pincode: String::new(),
            ..row.clone()
        };
        assert_eq!(counter_from_row(legacy).unwrap().key.pincode, None);

        let negative = RollupRow {
            listed_count: -1,
            ..row
        };
        assert!(matches!(
            counter_from_row(negative),
            Err(RollupError::InvalidCount { field: "listed_count", .. })
        ));
    }

    #[test]
    fn test_decode_batch_counts_dropped() {
        let docs = vec![
            json!({ "availableCount": 1, "listedCount": 1, "totalCount": 1 }),
            json!({ "listedCount": 1, "totalCount": 1 }),
            json!({ "availableCount": 0, "listedCount": 0, "totalCount": 0, "Report_Date": "someday" }),
        ];
        let decoded = decode_rollup_documents(&docs);

        assert_eq!(decoded.counters.len(), 1);
        assert_eq!(decoded.dropped, 2);
    }
}
