//! Competitive & regional insights - own brand against competitors per city

use crate::error::EngineError;
use crate::metrics::aggregate::{partition, MetricSource};
use crate::metrics::types::{Insights, OwnBrand, PeriodDelta, RegionInsight, TierCounts};
use crate::round1;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// Legacy identity inference: the first item carrying a client name is "own".
/// Kept for callers that do not pass an explicit brand.
pub fn infer_own_brand<T: MetricSource>(items: &[T]) -> Option<OwnBrand> {
    items
        .iter()
        .map(|item| item.client_name().trim())
        .find(|name| !name.is_empty())
        .and_then(|name| OwnBrand::new(name).ok())
}

/// Resolve the own brand at the boundary: an explicit value wins and must not
/// be blank; without one, fall back to inference.
pub fn resolve_own_brand<T: MetricSource>(
    explicit: Option<&str>,
    items: &[T],
) -> Result<Option<OwnBrand>, EngineError> {
    match explicit {
        Some(brand) => OwnBrand::new(brand).map(Some),
        None => Ok(infer_own_brand(items)),
    }
}

/// Delta between the two most recent report dates present in `items`.
/// Fewer than two dates yields zero deltas.
pub fn period_delta<T: MetricSource>(items: &[&T]) -> PeriodDelta {
    let dates: BTreeSet<NaiveDate> = items.iter().filter_map(|item| item.report_date()).collect();
    let mut recent = dates.iter().rev().copied();

    match (recent.next(), recent.next()) {
        (Some(current), Some(previous)) => {
            let now = counts_on(items, current);
            let before = counts_on(items, previous);
            PeriodDelta {
                current_date: Some(current),
                previous_date: Some(previous),
                coverage_delta: round1(now.coverage() - before.coverage()),
                availability_delta: round1(now.availability() - before.availability()),
                penetration_delta: round1(now.penetration() - before.penetration()),
            }
        }
        (current, _) => PeriodDelta {
            current_date: current,
            ..PeriodDelta::default()
        },
    }
}

fn counts_on<T: MetricSource>(items: &[&T], date: NaiveDate) -> TierCounts {
    let on_date: Vec<&T> = items
        .iter()
        .copied()
        .filter(|item| item.report_date() == Some(date))
        .collect();
    T::tally(&on_date).counts
}

struct RegionStats<'a, T> {
    name: String,
    own_items: Vec<&'a T>,
    own: TierCounts,
    competitor: Option<TierCounts>,
}

impl<T: MetricSource> RegionStats<'_, T> {
    fn availability_gap(&self) -> Option<f64> {
        self.competitor
            .map(|competitor| self.own.availability() - competitor.availability())
    }

    fn to_insight(&self) -> RegionInsight {
        let competitor = self.competitor.unwrap_or_default();
        RegionInsight {
            name: Some(self.name.clone()),
            own_coverage: round1(self.own.coverage()),
            competitor_coverage: round1(competitor.coverage()),
            coverage_gap: round1(self.own.coverage() - competitor.coverage()),
            own_availability: round1(self.own.availability()),
            competitor_availability: round1(competitor.availability()),
            availability_gap: round1(self.own.availability() - competitor.availability()),
            period_delta: period_delta(&self.own_items),
        }
    }
}

fn by_value(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Lowest own coverage region and highest availability gap region.
///
/// Items whose brand equals the own brand are "own"; items with any other
/// non-empty brand are competitors. Regions are cities.
pub fn compute_insights<T: MetricSource>(items: &[T], own: &OwnBrand) -> Insights {
    let own_items = items.iter().filter(|item| item.brand() == own.as_str());
    let competitor_items = items
        .iter()
        .filter(|item| !item.brand().is_empty() && item.brand() != own.as_str());

    let own_by_city = partition(own_items, |item| item.city().to_string());
    let competitor_by_city = partition(competitor_items, |item| item.city().to_string());

    let regions: Vec<RegionStats<'_, T>> = own_by_city
        .into_iter()
        .map(|(name, own_items)| {
            let own = T::tally(&own_items).counts;
            let competitor = competitor_by_city
                .get(&name)
                .map(|members| T::tally(members).counts);
            RegionStats {
                name,
                own_items,
                own,
                competitor,
            }
        })
        .collect();

    if regions.is_empty() {
        debug!("No items for own brand {}; insights unavailable", own);
        return Insights {
            own_brand: Some(own.to_string()),
            ..Insights::no_data()
        };
    }

    let lowest_coverage_region = regions
        .iter()
        .min_by(|a, b| by_value(a.own.coverage(), b.own.coverage()))
        .map(RegionStats::to_insight)
        .unwrap_or_else(RegionInsight::no_data);

    // Prefer the region where we trail competitors most; when we trail
    // nowhere, surface the region with the weakest own availability.
    let contested: Vec<&RegionStats<'_, T>> = regions
        .iter()
        .filter(|region| region.competitor.is_some())
        .collect();
    let widest_gap = contested
        .iter()
        .copied()
        .filter_map(|region| region.availability_gap().map(|gap| (region, gap)))
        .min_by(|a, b| by_value(a.1, b.1));
    let gap_region = match widest_gap {
        Some((region, gap)) if gap < 0.0 => Some(region),
        _ => contested
            .iter()
            .copied()
            .min_by(|a, b| by_value(a.own.availability(), b.own.availability())),
    };
    let highest_availability_gap_region = gap_region
        .map(RegionStats::to_insight)
        .unwrap_or_else(RegionInsight::no_data);

    Insights {
        own_brand: Some(own.to_string()),
        lowest_coverage_region,
        highest_availability_gap_region,
    }
}

/// Insights for an optional own brand; None reports "No Data"
pub fn insights_for<T: MetricSource>(items: &[T], own: Option<&OwnBrand>) -> Insights {
    match own {
        Some(brand) => compute_insights(items, brand),
        None => Insights::no_data(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::types::{AvailabilityStatus, ListingRecord};

    fn record(day: u32, brand: &str, client: &str, city: &str, status: AvailabilityStatus) -> ListingRecord {
        ListingRecord {
            report_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            product_id: "P1".to_string(),
            sku_id: String::new(),
            brand: brand.to_string(),
            company: String::new(),
            client_name: client.to_string(),
            product_description: String::new(),
            category: String::new(),
            city: city.to_string(),
            pincode: format!("{}-1", city),
            platform: "Blinkit".to_string(),
            mrp: 0.0,
            selling_price: 0.0,
            discount_percent: 0.0,
            availability: status,
        }
    }

    #[test]
    fn test_infer_own_brand_first_client_name() {
        let records = vec![
            record(5, "Nestle", "", "pune", AvailabilityStatus::Available),
            record(5, "Amul", " Amul ", "pune", AvailabilityStatus::Available),
            record(5, "Mother Dairy", "Mother Dairy", "pune", AvailabilityStatus::Available),
        ];
        assert_eq!(infer_own_brand(&records), Some(OwnBrand::new("Amul").unwrap()));
    }

    #[test]
    fn test_infer_own_brand_none() {
        let records = vec![record(5, "Nestle", "", "pune", AvailabilityStatus::Available)];
        assert_eq!(infer_own_brand(&records), None);
        assert_eq!(insights_for(&records, None), Insights::no_data());
    }

    #[test]
    fn test_resolve_own_brand() {
        let records = vec![record(5, "Amul", "Amul", "pune", AvailabilityStatus::Available)];

        assert_eq!(
            resolve_own_brand(Some("Nestle"), &records).unwrap(),
            Some(OwnBrand::new("Nestle").unwrap())
        );
        assert_eq!(
            resolve_own_brand(None, &records).unwrap(),
            Some(OwnBrand::new("Amul").unwrap())
        );
        assert_eq!(
            resolve_own_brand(Some(""), &records),
            Err(EngineError::EmptyOwnBrand)
        );
    }

    #[test]
    fn test_own_brand_absent_reports_no_data() {
        let records = vec![record(5, "Nestle", "", "pune", AvailabilityStatus::Available)];
        let own = OwnBrand::new("Amul").unwrap();
        let insights = compute_insights(&records, &own);

        assert_eq!(insights.own_brand.as_deref(), Some("Amul"));
        assert_eq!(insights.lowest_coverage_region, RegionInsight::no_data());
        assert_eq!(insights.highest_availability_gap_region.label(), "No Data");
    }

    #[test]
    fn test_period_delta_two_dates() {
        use AvailabilityStatus::*;
        let records = vec![
            record(4, "Amul", "", "pune", Available),
            record(4, "Amul", "", "pune", Available),
            record(5, "Amul", "", "pune", Available),
            record(5, "Amul", "", "pune", NotAvailable),
            // Older date is ignored
            record(3, "Amul", "", "pune", NotAvailable),
        ];
        let refs: Vec<&ListingRecord> = records.iter().collect();
        let delta = period_delta(&refs);

        assert_eq!(delta.current_date, NaiveDate::from_ymd_opt(2025, 3, 5));
        assert_eq!(delta.previous_date, NaiveDate::from_ymd_opt(2025, 3, 4));
        assert_eq!(delta.availability_delta, -50.0);
        assert_eq!(delta.coverage_delta, -50.0);
        assert_eq!(delta.penetration_delta, 0.0);
    }

    #[test]
    fn test_period_delta_single_date_is_zero() {
        let records = vec![record(5, "Amul", "", "pune", AvailabilityStatus::Available)];
        let refs: Vec<&ListingRecord> = records.iter().collect();
        let delta = period_delta(&refs);

        assert_eq!(delta.coverage_delta, 0.0);
        assert_eq!(delta.availability_delta, 0.0);
        assert_eq!(delta.previous_date, None);
    }

    #[test]
    fn test_gap_fallback_to_lowest_own_availability() {
        use AvailabilityStatus::*;
        // Own leads competitors everywhere
        let records = vec![
            record(5, "Amul", "", "pune", Available),
            record(5, "Amul", "", "pune", NotAvailable),
            record(5, "Nestle", "", "pune", NotAvailable),
            record(5, "Amul", "", "chennai", Available),
            record(5, "Nestle", "", "chennai", NotAvailable),
        ];
        let own = OwnBrand::new("Amul").unwrap();
        let insights = compute_insights(&records, &own);

        let region = &insights.highest_availability_gap_region;
        assert_eq!(region.label(), "pune");
        assert_eq!(region.own_availability, 50.0);
        assert_eq!(region.availability_gap, 50.0);
    }

    #[test]
    fn test_gap_requires_competitor_data() {
        use AvailabilityStatus::*;
        let records = vec![
            record(5, "Amul", "", "pune", Available),
            record(5, "Nestle", "", "delhi", NotAvailable),
        ];
        let own = OwnBrand::new("Amul").unwrap();
        let insights = compute_insights(&records, &own);

        assert_eq!(insights.lowest_coverage_region.label(), "pune");
        assert_eq!(insights.lowest_coverage_region.competitor_coverage, 0.0);
        assert_eq!(insights.highest_availability_gap_region, RegionInsight::no_data());
    }
}
