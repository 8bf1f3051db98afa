//! Rollup path - metrics straight from pre-aggregated counters, plus the
//! consistency check against the raw-row path

use crate::error::EngineError;
use crate::ingestion::types::{ListingRecord, RollupCounter};
use crate::metrics::aggregate::{tally_all, MetricSource};
use crate::metrics::filter::FilterSet;
use crate::metrics::types::{DiscountTally, GroupMetrics, TierCounts};
use crate::round1;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Counters with a pincode are reclassified within the tallied scope, exactly
/// as raw records are. Counters without one count `total_count` as
/// serviceable.
impl MetricSource for RollupCounter {
    fn brand(&self) -> &str {
        &self.key.brand
    }

    fn company(&self) -> &str {
        &self.key.company
    }

    fn client_name(&self) -> &str {
        &self.key.client_name
    }

    fn product_id(&self) -> &str {
        &self.key.product_id
    }

    fn product_description(&self) -> &str {
        &self.key.product_description
    }

    fn city(&self) -> &str {
        &self.key.city
    }

    fn pincode(&self) -> Option<&str> {
        self.key.pincode.as_deref()
    }

    fn platform(&self) -> &str {
        &self.key.platform
    }

    fn report_date(&self) -> Option<NaiveDate> {
        self.key.report_date
    }

    fn tally(items: &[&Self]) -> GroupMetrics {
        // Same pincode rule as the raw path: serviceable when any counter at
        // the pincode within this scope has recognized rows
        let serviceable_pincodes: BTreeSet<&str> = items
            .iter()
            .filter(|counter| counter.recognized_count > 0)
            .filter_map(|counter| counter.key.pincode.as_deref())
            .collect();

        let mut counts = TierCounts::default();
        let mut discount = DiscountTally::default();
        let mut products = BTreeSet::new();
        let mut pincodes = BTreeSet::new();

        for counter in items {
            let serviceable = match counter.key.pincode.as_deref() {
                Some(pincode) => serviceable_pincodes.contains(pincode),
                // Pre-classified upstream
                None => true,
            };

            counts.total += counter.total_count;
            if serviceable {
                // Listed rows imply a recognized row at the same pincode
                counts.add(&TierCounts {
                    total: 0,
                    serviceable: counter.total_count,
                    listed: counter.listed_count,
                    available: counter.available_count,
                    not_available: counter.listed_count.saturating_sub(counter.available_count),
                });
            }

            discount.sum += counter.discount_sum;
            discount.samples += counter.discount_samples;
            products.insert(counter.key.product_id.as_str());
            if let Some(pincode) = counter.key.pincode.as_deref() {
                pincodes.insert(pincode);
            }
        }

        GroupMetrics {
            counts,
            discount,
            unique_skus: products.len(),
            pincode_count: pincodes.len(),
        }
    }
}

/// Select the counters inside `filter`.
///
/// Counters without a pincode were classified over the upstream batch and
/// cannot be reclassified, so any narrower scope is refused for them.
pub fn scope_rollups(
    counters: &[RollupCounter],
    filter: &FilterSet,
) -> Result<Vec<RollupCounter>, EngineError> {
    let scoped = filter.apply(counters);
    if !filter.is_unrestricted() && scoped.iter().any(|counter| counter.key.pincode.is_none()) {
        return Err(EngineError::CoarseRollupScope);
    }
    Ok(scoped)
}

/// True when every counter carries a pincode and can be tallied in any scope
pub fn rescopable(counters: &[RollupCounter]) -> bool {
    counters.iter().all(|counter| counter.key.pincode.is_some())
}

/// One headline metric as seen by both paths, full precision
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDrift {
    pub metric: &'static str,
    pub raw: f64,
    pub rollup: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub tolerance: f64,
    pub drifts: Vec<MetricDrift>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts
            .iter()
            .all(|drift| drift.difference <= self.tolerance)
    }

    /// Largest absolute difference across metrics
    pub fn max_difference(&self) -> f64 {
        self.drifts
            .iter()
            .map(|drift| drift.difference)
            .fold(0.0, f64::max)
    }
}

/// Compare Penetration/Availability/Coverage computed from raw records and
/// from rollup counters built over the same data.
///
/// A mismatch beyond tolerance means the rollup job is wrong; this is a test
/// and batch-job check, never a runtime correction.
pub fn check_consistency(
    records: &[ListingRecord],
    counters: &[RollupCounter],
    tolerance: f64,
) -> ConsistencyReport {
    let raw = tally_all(records).counts;
    let rollup = tally_all(counters).counts;

    let drift = |metric: &'static str, raw: f64, rollup: f64| MetricDrift {
        metric,
        raw,
        rollup,
        difference: (raw - rollup).abs(),
    };

    let report = ConsistencyReport {
        tolerance,
        drifts: vec![
            drift("penetration", raw.penetration(), rollup.penetration()),
            drift("availability", raw.availability(), rollup.availability()),
            drift("coverage", raw.coverage(), rollup.coverage()),
        ],
    };

    if report.is_consistent() {
        info!(
            "Rollup consistent with raw rows (max difference {:.3})",
            report.max_difference()
        );
    } else {
        for d in report.drifts.iter().filter(|d| d.difference > tolerance) {
            warn!(
                "Rollup drift on {}: raw {:.1} vs rollup {:.1}",
                d.metric,
                round1(d.raw),
                round1(d.rollup)
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::rollup::build_rollups;
    use crate::ingestion::types::{AvailabilityStatus, RollupKey};
    use crate::metrics::aggregate::{city_breakdown, compute_metrics};

    fn counter(city: &str, available: u64, listed: u64, total: u64) -> RollupCounter {
        RollupCounter {
            key: RollupKey {
                city: city.to_string(),
                brand: "Amul".to_string(),
                product_id: "P1".to_string(),
                ..RollupKey::default()
            },
            available_count: available,
            listed_count: listed,
            recognized_count: total,
            total_count: total,
            discount_sum: 40.0,
            discount_samples: 4,
            mrp_mean: 0.0,
            selling_price_mean: 0.0,
        }
    }

    #[test]
    fn test_rollup_formulas() {
        let counters = vec![counter("pune", 1, 2, 3)];
        let result = compute_metrics(&counters, None);

        assert_eq!(result.penetration_percent, 66.7);
        assert_eq!(result.availability_percent, 50.0);
        assert_eq!(result.coverage_percent, 33.3);
        assert_eq!(result.not_available_items, 1);
        assert_eq!(result.avg_discount, 10.0);
        assert_eq!(result.unique_sku_count, 1);
    }

    #[test]
    fn test_rollup_city_breakdown_sums_counters() {
        let counters = vec![
            counter("pune", 1, 2, 4),
            counter("pune", 1, 2, 4),
            counter("delhi", 0, 0, 0),
        ];
        let cities = city_breakdown(&counters);

        assert_eq!(cities[0].city, "delhi");
        assert_eq!(cities[0].coverage_percent, 0.0);
        assert_eq!(cities[1].penetration_percent, 50.0);
        assert_eq!(cities[1].stock_availability_percent, 50.0);
        assert_eq!(cities[1].pincode_count, 0);
    }

    #[test]
    fn test_check_consistency_with_built_rollups() {
        use AvailabilityStatus::*;
        let statuses = [Available, NotAvailable, NotListed, Unknown, Available, Unknown];
        let records: Vec<ListingRecord> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| ListingRecord {
                report_date: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
                product_id: format!("P{}", i % 2),
                sku_id: String::new(),
                brand: "Amul".to_string(),
                company: String::new(),
                client_name: String::new(),
                product_description: String::new(),
                category: String::new(),
                city: "pune".to_string(),
                pincode: format!("41100{}", i % 3),
                platform: "Blinkit".to_string(),
                mrp: 0.0,
                selling_price: 0.0,
                discount_percent: 0.0,
                availability: *status,
            })
            .collect();

        let counters = build_rollups(&records);
        let report = check_consistency(&records, &counters, 0.1);

        assert!(report.is_consistent(), "{:?}", report);
        assert_eq!(report.drifts.len(), 3);
    }

    fn listing(day: u32, brand: &str, pincode: &str, status: AvailabilityStatus) -> ListingRecord {
        ListingRecord {
            report_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            product_id: format!("{}-1L", brand),
            sku_id: String::new(),
            brand: brand.to_string(),
            company: String::new(),
            client_name: String::new(),
            product_description: String::new(),
            category: String::new(),
            city: "pune".to_string(),
            pincode: pincode.to_string(),
            platform: "Blinkit".to_string(),
            mrp: 0.0,
            selling_price: 0.0,
            discount_percent: 0.0,
            availability: status,
        }
    }

    /// 411003 is serviceable only through Nestle, and 411001 only through
    /// the day 5 row, so narrowing the scope changes which pincodes count
    fn pincode_depends_on_scope() -> Vec<ListingRecord> {
        use AvailabilityStatus::*;
        vec![
            listing(5, "Amul", "411001", Available),
            listing(6, "Amul", "411001", Unknown),
            listing(6, "Amul", "411002", Available),
            listing(6, "Nestle", "411003", Available),
            listing(6, "Amul", "411003", Unknown),
        ]
    }

    #[test]
    fn test_filtered_rollups_match_filtered_records() {
        let records = pincode_depends_on_scope();
        let counters = build_rollups(&records);
        let day6 = NaiveDate::from_ymd_opt(2025, 3, 6);

        let filters = [
            FilterSet::default(),
            FilterSet {
                date_from: day6,
                date_to: day6,
                ..FilterSet::default()
            },
            FilterSet {
                brands: vec!["Amul".to_string()],
                ..FilterSet::default()
            },
        ];

        for filter in &filters {
            let raw = tally_all(&filter.apply(&records)).counts;
            let scoped = scope_rollups(&counters, filter).unwrap();
            let rolled = tally_all(&scoped).counts;
            assert_eq!(raw, rolled, "{:?}", filter);
        }

        let amul = FilterSet {
            brands: vec!["Amul".to_string()],
            ..FilterSet::default()
        };
        let scoped = scope_rollups(&counters, &amul).unwrap();
        let result = compute_metrics(&scoped, None);
        assert_eq!(result.serviceable_items, 3);
        assert_eq!(result.penetration_percent, 66.7);
        assert_eq!(result.coverage_percent, 66.7);
    }

    #[test]
    fn test_scope_rollups_refuses_coarse_counters_under_filter() {
        let counters = vec![counter("pune", 1, 2, 3), counter("delhi", 0, 1, 1)];
        let pune = FilterSet {
            cities: vec!["pune".to_string()],
            ..FilterSet::default()
        };

        assert_eq!(
            scope_rollups(&counters, &pune),
            Err(EngineError::CoarseRollupScope)
        );
        assert_eq!(scope_rollups(&counters, &FilterSet::default()).unwrap().len(), 2);
        assert!(!rescopable(&counters));

        let nothing = FilterSet {
            cities: vec!["chennai".to_string()],
            ..FilterSet::default()
        };
        assert!(scope_rollups(&counters, &nothing).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_only_pincode_counter_is_not_serviceable() {
        let mut unknown = counter("pune", 0, 0, 2);
        unknown.key.pincode = Some("411001".to_string());
        unknown.recognized_count = 0;
        let mut known = counter("pune", 1, 1, 1);
        known.key.pincode = Some("411002".to_string());

        let counts = tally_all(&[unknown, known]).counts;
        assert_eq!(counts.total, 3);
        assert_eq!(counts.serviceable, 1);
        assert!(!rescopable(&[counter("pune", 0, 0, 0)]));
    }

    #[test]
    fn test_check_consistency_flags_drift() {
        let records: Vec<ListingRecord> = Vec::new();
        let counters = vec![counter("pune", 1, 1, 1)];
        let report = check_consistency(&records, &counters, 0.1);

        assert!(!report.is_consistent());
        assert_eq!(report.max_difference(), 100.0);
    }
}
