//! Recency/frequency reaccess heuristic.
//!
//! Shared by the access predictor and the file content cache; each keeps its
//! own histories and calls this pure function over them.

use docket_core::constants::MIN_ACCESS_INTERVAL_MS;
use docket_core::{elapsed_between, Timestamp};

/// Probability that an item with access history `timestamps` is read again soon.
///
/// - fewer than two accesses: `0.0`
/// - `Δ` = mean inter-access interval, `elapsed` = time since the last access
/// - `elapsed < 2Δ`: `1.0`
/// - otherwise `1 / (1 + elapsed / Δ)`
///
/// Timestamps need not be sorted.
pub fn access_probability(timestamps: &[Timestamp], now: Timestamp) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }

    let (first, last) = timestamps
        .iter()
        .fold((timestamps[0], timestamps[0]), |(lo, hi), t| {
            (lo.min(*t), hi.max(*t))
        });

    let span_ms = elapsed_between(first, last).as_secs_f64() * 1000.0;
    let mean_ms = (span_ms / (timestamps.len() - 1) as f64).max(MIN_ACCESS_INTERVAL_MS as f64);
    let elapsed_ms = elapsed_between(last, now).as_secs_f64() * 1000.0;

    if elapsed_ms < 2.0 * mean_ms {
        1.0
    } else {
        1.0 / (1.0 + elapsed_ms / mean_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn regular(start: Timestamp, interval_secs: i64, count: usize) -> Vec<Timestamp> {
        (0..count)
            .map(|i| start + chrono::Duration::seconds(interval_secs * i as i64))
            .collect()
    }

    #[test]
    fn test_insufficient_evidence() {
        let now = Utc::now();
        assert_eq!(access_probability(&[], now), 0.0);
        assert_eq!(access_probability(&[now], now), 0.0);
    }

    #[test]
    fn test_imminent_reaccess_is_certain() {
        let start = Utc::now();
        let history = regular(start, 10, 4);
        let last = *history.last().unwrap();

        assert_eq!(access_probability(&history, last), 1.0);
        assert_eq!(access_probability(&history, last + chrono::Duration::seconds(5)), 1.0);
        assert_eq!(access_probability(&history, last + chrono::Duration::seconds(19)), 1.0);
    }

    #[test]
    fn test_decay_past_two_intervals() {
        let start = Utc::now();
        let history = regular(start, 10, 3);
        let last = *history.last().unwrap();

        // elapsed = 2Δ -> 1 / (1 + 2)
        let p = access_probability(&history, last + chrono::Duration::seconds(20));
        assert!((p - 1.0 / 3.0).abs() < 1e-9);

        // elapsed = 9Δ -> 1 / 10
        let p = access_probability(&history, last + chrono::Duration::seconds(90));
        assert!((p - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_unsorted_history() {
        let start = Utc::now();
        let mut history = regular(start, 10, 3);
        history.reverse();
        let last = start + chrono::Duration::seconds(20);
        assert_eq!(access_probability(&history, last), 1.0);
    }

    #[test]
    fn test_simultaneous_accesses_use_minimum_interval() {
        let now = Utc::now();
        let history = vec![now, now, now];
        assert_eq!(access_probability(&history, now), 1.0);

        let later = now + chrono::Duration::seconds(1);
        let p = access_probability(&history, later);
        assert!(p > 0.0 && p < 0.01);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Half an interval after the last access the item is always predicted.
        #[test]
        fn prop_half_interval_is_certain(interval in 1i64..100_000, count in 2usize..20) {
            let start = Utc::now();
            let history = regular(start, interval, count);
            let last = *history.last().unwrap();
            let now = last + chrono::Duration::milliseconds(interval * 500);
            prop_assert_eq!(access_probability(&history, now), 1.0);
        }

        /// Past 2Δ the probability strictly decreases and approaches zero.
        #[test]
        fn prop_strictly_decreasing_past_two_intervals(interval in 1i64..10_000, count in 2usize..10) {
            let start = Utc::now();
            let history = regular(start, interval, count);
            let last = *history.last().unwrap();

            let mut previous = 1.0;
            for k in 2..60i64 {
                let p = access_probability(&history, last + chrono::Duration::seconds(interval * k));
                prop_assert!(p < previous, "p({k}Δ) = {p} not below {previous}");
                prop_assert!(p > 0.0);
                previous = p;
            }
            prop_assert!(previous < 0.02);
        }
    }
}
