// Library module for testable functions

pub mod cache;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod metrics;

/// Ratio of two counts as a percentage.
/// Formula: (part / whole) × 100, 0 when whole is 0
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Round to one decimal place for presentation.
/// Non-finite values collapse to 0 so callers never serialize NaN.
pub fn round1(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_two_thirds() {
        let pct = percent(2, 3);
        assert!((pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_percent_whole() {
        assert_eq!(percent(5, 5), 100.0);
    }

    #[test]
    fn test_percent_zero_denominator() {
        // Empty scope must not divide by zero
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(3, 0), 0.0);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(66.666_666), 66.7);
        assert_eq!(round1(33.333_333), 33.3);
        assert_eq!(round1(50.0), 50.0);
        assert_eq!(round1(-29.96), -30.0);
    }

    #[test]
    fn test_round1_non_finite() {
        assert_eq!(round1(f64::NAN), 0.0);
        assert_eq!(round1(f64::INFINITY), 0.0);
    }
}
