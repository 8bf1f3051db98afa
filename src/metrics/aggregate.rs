//! Aggregation - one grouping primitive feeding every breakdown

use crate::ingestion::types::ListingRecord;
use crate::metrics::classify::tier_counts;
use crate::metrics::insights::{insights_for, period_delta};
use crate::metrics::types::{
    BrandMetrics, CityMetrics, DiscountTally, GroupMetrics, MetricsResult, OwnBrand,
    PincodeMetrics, PlatformMetrics, TimePoint,
};
use crate::round1;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Anything the engine can aggregate: raw listing records or rollup counters.
/// `tally` turns a group of items into funnel counts; the percentage formulas
/// live on `TierCounts` and are shared by every implementor.
pub trait MetricSource {
    fn brand(&self) -> &str;
    fn company(&self) -> &str;
    fn client_name(&self) -> &str;
    fn product_id(&self) -> &str;
    fn product_description(&self) -> &str;
    fn city(&self) -> &str;
    fn pincode(&self) -> Option<&str>;
    fn platform(&self) -> &str;
    fn report_date(&self) -> Option<NaiveDate>;

    fn tally(items: &[&Self]) -> GroupMetrics
    where
        Self: Sized;
}

impl MetricSource for ListingRecord {
    fn brand(&self) -> &str {
        &self.brand
    }

    fn company(&self) -> &str {
        &self.company
    }

    fn client_name(&self) -> &str {
        &self.client_name
    }

    fn product_id(&self) -> &str {
        &self.product_id
    }

    fn product_description(&self) -> &str {
        &self.product_description
    }

    fn city(&self) -> &str {
        &self.city
    }

    fn pincode(&self) -> Option<&str> {
        Some(&self.pincode)
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn report_date(&self) -> Option<NaiveDate> {
        Some(self.report_date)
    }

    fn tally(items: &[&Self]) -> GroupMetrics {
        let mut discount = DiscountTally::default();
        let mut skus = BTreeSet::new();
        let mut pincodes = BTreeSet::new();

        for record in items {
            discount.sum += record.discount_percent;
            discount.samples += 1;
            skus.insert(record.sku_key());
            pincodes.insert(record.pincode.as_str());
        }

        GroupMetrics {
            counts: tier_counts(items),
            discount,
            unique_skus: skus.len(),
            pincode_count: pincodes.len(),
        }
    }
}

/// Split items into groups by key, preserving input order within a group
pub fn partition<'a, T, K, F, I>(items: I, key: F) -> BTreeMap<K, Vec<&'a T>>
where
    T: 'a,
    K: Ord,
    F: Fn(&T) -> K,
    I: IntoIterator<Item = &'a T>,
{
    let mut groups: BTreeMap<K, Vec<&'a T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(item)).or_default().push(item);
    }
    groups
}

/// Group items by key and tally each group independently.
/// Serviceability is classified within each group, never across groups.
pub fn aggregate<T, K, F>(items: &[T], key: F) -> BTreeMap<K, GroupMetrics>
where
    T: MetricSource,
    K: Ord,
    F: Fn(&T) -> K,
{
    partition(items, key)
        .into_iter()
        .map(|(k, members)| (k, T::tally(&members)))
        .collect()
}

/// Tally every item as one group
pub fn tally_all<T: MetricSource>(items: &[T]) -> GroupMetrics {
    let all: Vec<&T> = items.iter().collect();
    T::tally(&all)
}

/// Headline metrics for a scope.
///
/// Average discount is taken over the own brand's items when an own brand is
/// given and present, else over everything. Insights and the period delta
/// need an own brand and report "No Data" without one.
pub fn compute_metrics<T: MetricSource>(items: &[T], own: Option<&OwnBrand>) -> MetricsResult {
    let group = tally_all(items);

    let own_items: Vec<&T> = match own {
        Some(brand) => items
            .iter()
            .filter(|item| item.brand() == brand.as_str())
            .collect(),
        None => Vec::new(),
    };

    let avg_discount = if own_items.is_empty() {
        group.discount.mean()
    } else {
        T::tally(&own_items).discount.mean()
    };

    let delta = match own {
        Some(_) => period_delta(&own_items),
        None => Default::default(),
    };

    let insights = insights_for(items, own);

    debug!(
        "Computed metrics over {} items ({} serviceable)",
        group.counts.total, group.counts.serviceable
    );

    MetricsResult::new(&group, avg_discount, delta, insights)
}

/// Availability per report date, ascending. Items without a date are skipped.
pub fn time_series<T: MetricSource>(items: &[T]) -> Vec<TimePoint> {
    aggregate(items, |item| item.report_date())
        .into_iter()
        .filter_map(|(date, group)| {
            date.map(|date| TimePoint {
                date,
                value: round1(group.counts.availability()),
            })
        })
        .collect()
}

pub fn city_breakdown<T: MetricSource>(items: &[T]) -> Vec<CityMetrics> {
    aggregate(items, |item| item.city().to_string())
        .into_iter()
        .map(|(city, group)| CityMetrics {
            city,
            stock_availability_percent: round1(group.counts.availability()),
            stock_out_percent: round1(group.counts.stock_out()),
            pincode_count: group.pincode_count,
            coverage_percent: round1(group.counts.coverage()),
            penetration_percent: round1(group.counts.penetration()),
        })
        .collect()
}

/// Per-brand comparison; items without a brand are left out
pub fn brand_breakdown<T: MetricSource>(items: &[T]) -> Vec<BrandMetrics> {
    aggregate(items, |item| item.brand().to_string())
        .into_iter()
        .filter(|(brand, _)| !brand.is_empty())
        .map(|(brand, group)| BrandMetrics {
            brand,
            avg_discount: round1(group.discount.mean()),
            availability_percent: round1(group.counts.availability()),
            penetration_percent: round1(group.counts.penetration()),
            coverage_percent: round1(group.counts.coverage()),
            sku_count: group.unique_skus,
        })
        .collect()
}

pub fn platform_breakdown<T: MetricSource>(items: &[T]) -> Vec<PlatformMetrics> {
    aggregate(items, |item| item.platform().to_string())
        .into_iter()
        .map(|(platform, group)| PlatformMetrics {
            platform,
            avg_discount: round1(group.discount.mean()),
            availability_percent: round1(group.counts.availability()),
            penetration_percent: round1(group.counts.penetration()),
            coverage_percent: round1(group.counts.coverage()),
            sku_count: group.unique_skus,
        })
        .collect()
}

/// Per-pincode metrics; items without pincode granularity are skipped
pub fn pincode_breakdown<T: MetricSource>(items: &[T]) -> Vec<PincodeMetrics> {
    aggregate(items, |item| item.pincode().map(str::to_string))
        .into_iter()
        .filter_map(|(pincode, group)| {
            pincode.map(|pincode| PincodeMetrics {
                pincode,
                total_items: group.counts.total,
                availability_percent: round1(group.counts.availability()),
                penetration_percent: round1(group.counts.penetration()),
                coverage_percent: round1(group.counts.coverage()),
            })
        })
        .collect()
}
