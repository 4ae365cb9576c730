use serde::{Deserialize, Serialize};

use crate::model::span::nanos_to_ms;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Nearest-rank percentile over an ascending slice: index `ceil(p/100 * n) - 1`,
/// clamped to the slice bounds. Empty input yields zero.
pub fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// Summarizes raw nanosecond latencies into millisecond figures.
pub fn summarize(latencies: &[u64]) -> LatencySummary {
    if latencies.is_empty() {
        return LatencySummary::default();
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();
    let total: u128 = sorted.iter().map(|v| *v as u128).sum();

    LatencySummary {
        avg_ms: total as f64 / sorted.len() as f64 / 1_000_000.0,
        p50_ms: nanos_to_ms(percentile(&sorted, 50.0)),
        p95_ms: nanos_to_ms(percentile(&sorted, 95.0)),
        p99_ms: nanos_to_ms(percentile(&sorted, 99.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_on_known_list() {
        let sorted = (1..=100).collect::<Vec<u64>>();
        assert_eq!(percentile(&sorted, 50.0), 50);
        assert_eq!(percentile(&sorted, 95.0), 95);
        assert_eq!(percentile(&sorted, 99.0), 99);
        assert_eq!(percentile(&sorted, 0.0), 1);
        assert_eq!(percentile(&sorted, 100.0), 100);
    }

    #[test]
    fn single_element_percentiles_are_equal() {
        let summary = summarize(&[4_000_000]);
        assert_eq!(summary.p50_ms, 4.0);
        assert_eq!(summary.p95_ms, 4.0);
        assert_eq!(summary.p99_ms, 4.0);
        assert_eq!(summary.avg_ms, 4.0);
    }

    #[test]
    fn percentiles_are_monotonic_and_input_order_free() {
        let values = [9_000_000, 1_000_000, 5_000_000, 7_000_000, 3_000_000];
        let a = summarize(&values);
        let mut reversed = values;
        reversed.reverse();
        let b = summarize(&reversed);
        assert_eq!(a, b);
        assert!(a.p50_ms <= a.p95_ms);
        assert!(a.p95_ms <= a.p99_ms);
        assert_eq!(a.p50_ms, 5.0);
        assert_eq!(a.p99_ms, 9.0);
    }

    #[test]
    fn empty_list_is_zero() {
        assert_eq!(percentile(&[], 95.0), 0);
        assert_eq!(summarize(&[]), LatencySummary::default());
    }
}
