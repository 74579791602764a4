//! Continuous percentiles (linear interpolation between closest ranks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentile `p` in `[0, 1]` of `values`, interpolating linearly between
/// the two nearest ranks. `None` for an empty sample.
pub fn percentile_cont(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile_cont(values, 0.5)
}

/// Elapsed time between two instants in fractional days.
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 86_400.0
}

/// Summary of a duration sample in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub sample_size: usize,
    pub median_days: Option<f64>,
    pub p90_days: Option<f64>,
    pub min_days: Option<f64>,
    pub max_days: Option<f64>,
}

impl DurationSummary {
    pub fn from_days(days: &[f64]) -> Self {
        let min_days = days.iter().copied().reduce(f64::min);
        let max_days = days.iter().copied().reduce(f64::max);
        Self {
            sample_size: days.len(),
            median_days: median(days),
            p90_days: percentile_cont(days, 0.9),
            min_days,
            max_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_odd_and_even_samples() {
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_interpolation_matches_percentile_cont() {
        // PERCENTILE_CONT(0.9) over 1..=10 is 9.1
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let p90 = percentile_cont(&values, 0.9).unwrap();
        assert!((p90 - 9.1).abs() < 1e-9);
        assert_eq!(percentile_cont(&values, 0.0), Some(1.0));
        assert_eq!(percentile_cont(&values, 1.0), Some(10.0));
    }

    #[test]
    fn test_median_stays_within_sample_bounds() {
        let samples = [0.0, 0.5, 12.0, 400.0, 3.25, 3.25, 90.0];
        let summary = DurationSummary::from_days(&samples);
        let median = summary.median_days.unwrap();
        assert!(median >= 0.0);
        assert!(median <= summary.max_days.unwrap());
        assert_eq!(summary.sample_size, 7);
    }
}
