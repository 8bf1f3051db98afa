//! Metric types - derived, output-only structures

use crate::error::EngineError;
use crate::{percent, round1};
use chrono::NaiveDate;
use serde::Serialize;

/// Serviceability of one pincode within a scope.
/// available implies listed implies serviceable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PincodeState {
    pub serviceable: bool,
    pub listed: bool,
    pub available: bool,
}

/// Item counts through the serviceable → listed → available funnel.
/// Holds available <= listed <= serviceable <= total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub total: u64,
    pub serviceable: u64,
    pub listed: u64,
    pub available: u64,
    pub not_available: u64,
}

impl TierCounts {
    /// Listed share of serviceable volume
    pub fn penetration(&self) -> f64 {
        percent(self.listed, self.serviceable)
    }

    /// In-stock share of listed volume
    pub fn availability(&self) -> f64 {
        percent(self.available, self.listed)
    }

    /// In-stock share of serviceable volume
    pub fn coverage(&self) -> f64 {
        percent(self.available, self.serviceable)
    }

    /// Coverage as Availability × Penetration; equal to `coverage` up to rounding
    pub fn coverage_product(&self) -> f64 {
        self.availability() * self.penetration() / 100.0
    }

    /// Out-of-stock share of listed volume, 0 when nothing is listed
    pub fn stock_out(&self) -> f64 {
        if self.listed == 0 {
            0.0
        } else {
            100.0 - self.availability()
        }
    }

    pub fn add(&mut self, other: &TierCounts) {
        self.total += other.total;
        self.serviceable += other.serviceable;
        self.listed += other.listed;
        self.available += other.available;
        self.not_available += other.not_available;
    }
}

/// Running discount sum for averaging
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscountTally {
    pub sum: f64,
    pub samples: u64,
}

impl DiscountTally {
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum / self.samples as f64
        }
    }
}

/// Everything one aggregation pass knows about a group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMetrics {
    pub counts: TierCounts,
    pub discount: DiscountTally,
    pub unique_skus: usize,
    pub pincode_count: usize,
}

/// The brand treated as "own" in competitive comparisons
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnBrand(String);

impl OwnBrand {
    pub fn new(brand: impl Into<String>) -> Result<Self, EngineError> {
        let brand = brand.into().trim().to_string();
        if brand.is_empty() {
            return Err(EngineError::EmptyOwnBrand);
        }
        Ok(OwnBrand(brand))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Change between the two most recent report dates, current − previous
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDelta {
    pub current_date: Option<NaiveDate>,
    pub previous_date: Option<NaiveDate>,
    pub coverage_delta: f64,
    pub availability_delta: f64,
    pub penetration_delta: f64,
}

/// One region singled out by the insight engine. `name` is None when no
/// insight is available, with every number at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInsight {
    pub name: Option<String>,
    pub own_coverage: f64,
    pub competitor_coverage: f64,
    /// own − competitor, percentage points
    pub coverage_gap: f64,
    pub own_availability: f64,
    pub competitor_availability: f64,
    /// own − competitor, percentage points
    pub availability_gap: f64,
    pub period_delta: PeriodDelta,
}

impl RegionInsight {
    pub fn no_data() -> Self {
        RegionInsight::default()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("No Data")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub own_brand: Option<String>,
    pub lowest_coverage_region: RegionInsight,
    pub highest_availability_gap_region: RegionInsight,
}

impl Insights {
    pub fn no_data() -> Self {
        Insights::default()
    }
}

/// Headline metrics for a scope, rounded to one decimal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResult {
    pub penetration_percent: f64,
    pub availability_percent: f64,
    pub coverage_percent: f64,
    pub coverage_product_percent: f64,
    pub total_items: u64,
    pub serviceable_items: u64,
    pub listed_items: u64,
    pub available_items: u64,
    pub not_available_items: u64,
    pub unique_sku_count: usize,
    pub pincode_count: usize,
    pub avg_discount: f64,
    pub period_delta: PeriodDelta,
    pub insights: Insights,
}

impl MetricsResult {
    pub fn new(
        group: &GroupMetrics,
        avg_discount: f64,
        period_delta: PeriodDelta,
        insights: Insights,
    ) -> Self {
        let counts = &group.counts;
        MetricsResult {
            penetration_percent: round1(counts.penetration()),
            availability_percent: round1(counts.availability()),
            coverage_percent: round1(counts.coverage()),
            coverage_product_percent: round1(counts.coverage_product()),
            total_items: counts.total,
            serviceable_items: counts.serviceable,
            listed_items: counts.listed,
            available_items: counts.available,
            not_available_items: counts.not_available,
            unique_sku_count: group.unique_skus,
            pincode_count: group.pincode_count,
            avg_discount: round1(avg_discount),
            period_delta,
            insights,
        }
    }
}

/// One point of the availability time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityMetrics {
    pub city: String,
    pub stock_availability_percent: f64,
    pub stock_out_percent: f64,
    pub pincode_count: usize,
    pub coverage_percent: f64,
    pub penetration_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandMetrics {
    pub brand: String,
    pub avg_discount: f64,
    pub availability_percent: f64,
    pub penetration_percent: f64,
    pub coverage_percent: f64,
    pub sku_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetrics {
    pub platform: String,
    pub avg_discount: f64,
    pub availability_percent: f64,
    pub penetration_percent: f64,
    pub coverage_percent: f64,
    pub sku_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PincodeMetrics {
    pub pincode: String,
    pub total_items: u64,
    pub availability_percent: f64,
    pub penetration_percent: f64,
    pub coverage_percent: f64,
}
