//! Filter sets accepted by engine entry points

use crate::error::EngineError;
use crate::ingestion::parse::parse_report_date;
use crate::metrics::aggregate::MetricSource;
use chrono::NaiveDate;

/// Selection applied before aggregation. Empty lists match everything;
/// the date range is inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    pub brands: Vec<String>,
    pub companies: Vec<String>,
    pub products: Vec<String>,
    pub cities: Vec<String>,
    pub platforms: Vec<String>,
    pub pincode: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Split a comma-separated query value, dropping blanks
pub fn parse_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Parse an optional filter date in DD-MM-YYYY or ISO form
pub fn parse_filter_date(raw: Option<&str>) -> Result<Option<NaiveDate>, EngineError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_report_date(value)
            .map(Some)
            .ok_or_else(|| EngineError::InvalidFilterDate(value.to_string())),
    }
}

fn canonical_list(values: Vec<String>, lowercase: bool) -> Vec<String> {
    let mut values: Vec<String> = values
        .into_iter()
        .map(|v| {
            let v = v.trim();
            if lowercase {
                v.to_lowercase()
            } else {
                v.to_string()
            }
        })
        .filter(|v| !v.is_empty())
        .collect();
    values.sort();
    values.dedup();
    values
}

fn contains_or_empty(list: &[String], value: &str) -> bool {
    list.is_empty() || list.iter().any(|candidate| candidate == value)
}

impl FilterSet {
    /// Trim, sort and deduplicate every list; cities are lower-cased to match
    /// normalized records. Rejects inverted date ranges.
    pub fn canonicalize(self) -> Result<Self, EngineError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(EngineError::InvertedDateRange { from, to });
            }
        }

        Ok(FilterSet {
            brands: canonical_list(self.brands, false),
            companies: canonical_list(self.companies, false),
            products: canonical_list(self.products, false),
            cities: canonical_list(self.cities, true),
            platforms: canonical_list(self.platforms, false),
            pincode: self
                .pincode
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            date_from: self.date_from,
            date_to: self.date_to,
        })
    }

    /// True when the filter keeps every item
    pub fn is_unrestricted(&self) -> bool {
        self == &FilterSet::default()
    }

    /// Stable key for memoizing results of a canonicalized filter set
    pub fn canonical_key(&self) -> String {
        let date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        format!(
            "brands={}|companies={}|products={}|cities={}|platforms={}|pincode={}|from={}|to={}",
            self.brands.join(","),
            self.companies.join(","),
            self.products.join(","),
            self.cities.join(","),
            self.platforms.join(","),
            self.pincode.as_deref().unwrap_or(""),
            date(self.date_from),
            date(self.date_to),
        )
    }

    pub fn matches<T: MetricSource>(&self, item: &T) -> bool {
        if !contains_or_empty(&self.brands, item.brand())
            || !contains_or_empty(&self.companies, item.company())
            || !contains_or_empty(&self.cities, item.city())
            || !contains_or_empty(&self.platforms, item.platform())
        {
            return false;
        }

        if !self.products.is_empty()
            && !self.products.iter().any(|product| {
                product == item.product_id() || product == item.product_description()
            })
        {
            return false;
        }

        if let Some(pincode) = self.pincode.as_deref() {
            if item.pincode() != Some(pincode) {
                return false;
            }
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = item.report_date() else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from)
                || self.date_to.is_some_and(|to| date > to)
            {
                return false;
            }
        }

        true
    }

    /// Items passing the filter, in input order
    pub fn apply<T: MetricSource + Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .filter(|item| self.matches(*item))
            .cloned()
            .collect()
    }
}
