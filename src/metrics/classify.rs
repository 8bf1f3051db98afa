//! Serviceability classification at pincode granularity

use crate::ingestion::types::ListingRecord;
use crate::metrics::types::{PincodeState, TierCounts};
use std::collections::BTreeMap;

/// Derive serviceable/listed/available for every pincode in the scope
pub fn classify_pincodes(records: &[&ListingRecord]) -> BTreeMap<String, PincodeState> {
    let mut states: BTreeMap<String, PincodeState> = BTreeMap::new();

    for record in records {
        let state = states.entry(record.pincode.clone()).or_default();
        state.serviceable |= record.availability.is_serviceable();
        state.listed |= record.availability.is_listed();
        state.available |= record.availability.is_available();
    }

    states
}

/// Count items through the serviceable → listed → available funnel.
///
/// Pincodes are classified first; a record counts as serviceable when its
/// pincode is serviceable, then as listed/available when both its pincode
/// qualifies and its own status does. Item counts, not pincode counts, feed
/// the headline ratios.
pub fn tier_counts(records: &[&ListingRecord]) -> TierCounts {
    let states = classify_pincodes(records);
    let mut counts = TierCounts {
        total: records.len() as u64,
        ..TierCounts::default()
    };

    for record in records {
        let state = match states.get(&record.pincode) {
            Some(state) if state.serviceable => state,
            _ => continue,
        };
        counts.serviceable += 1;

        if !(state.listed && record.availability.is_listed()) {
            continue;
        }
        counts.listed += 1;

        if state.available && record.availability.is_available() {
            counts.available += 1;
        } else {
            counts.not_available += 1;
        }
    }

    counts
}
