// =============================================================================
// EMA Gap / Trend Analyzer
// =============================================================================
//
// For one metric series, two sub-windows ending at the latest sample:
//   short window (default 5 min)  -> EMA_short
//   long window  (default 60 min) -> EMA_long
//
//   gap       = EMA_short - EMA_long                    (at the last sample)
//   delta_gap = gap(last short sample) - gap(first short sample)
//
// Both EMAs are evaluated at the first and last timestamps of the short
// window; the long window always contains those samples. The (gap,
// delta_gap) pair is then classified into a discrete trend label.
// =============================================================================

use serde::Serialize;

use crate::indicators::ema::{compute_ema_adaptive, TimedValue};
use crate::types::{minutes, Sample, TrendLabel};

/// Values closer to zero than this are treated as zero by the classifier.
pub const TREND_EPSILON: f64 = 1e-12;

/// Window lengths for the short/long EMA pair, in minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapWindows {
    pub short_minutes: f64,
    pub long_minutes: f64,
}

impl Default for GapWindows {
    fn default() -> Self {
        Self {
            short_minutes: 5.0,
            long_minutes: 60.0,
        }
    }
}

/// Gap signals for a single metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricGap {
    pub ema_short: f64,
    pub ema_long: f64,
    pub gap: f64,
    pub delta_gap: f64,
}

impl MetricGap {
    pub fn trend(&self) -> TrendLabel {
        classify_trend(self.gap, self.delta_gap)
    }
}

/// Per-subnet analysis result. Field names on the wire are fixed regardless
/// of the configured window lengths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapResult {
    pub netuid: u16,
    pub current_emission: f64,
    pub current_price: f64,
    #[serde(rename = "final_ema5_price")]
    pub ema_short_price: f64,
    #[serde(rename = "final_ema60_price")]
    pub ema_long_price: f64,
    #[serde(rename = "final_gap_price")]
    pub gap_price: f64,
    pub delta_gap_price: f64,
    #[serde(rename = "final_ema5_emission")]
    pub ema_short_emission: f64,
    #[serde(rename = "final_ema60_emission")]
    pub ema_long_emission: f64,
    #[serde(rename = "final_gap_emission")]
    pub gap_emission: f64,
    pub delta_gap_emission: f64,
    pub price_trend: TrendLabel,
    pub emission_trend: TrendLabel,
    /// Population standard deviation of price over the analysed samples.
    pub std_price: f64,
    /// Number of samples analysed.
    pub sample_count: usize,
    /// Discontinuities found in this subnet's series during the pass.
    pub sampling_gaps: usize,
}

/// Classify a `(final_gap, delta_gap)` pair.
///
/// | gap | delta | label     |
/// |-----|-------|-----------|
/// | > 0 | > 0   | Bullish   |
/// | < 0 | > 0   | Bearish   |
/// | > 0 | < 0   | Pull Back |
/// | < 0 | < 0   | Reversal  |
///
/// Either value within [`TREND_EPSILON`] of zero yields `Neutral`.
pub fn classify_trend(final_gap: f64, delta_gap: f64) -> TrendLabel {
    if final_gap.abs() < TREND_EPSILON || delta_gap.abs() < TREND_EPSILON {
        return TrendLabel::Neutral;
    }
    let up = final_gap > 0.0;
    let diverging = delta_gap > 0.0;
    match (diverging, up) {
        (true, true) => TrendLabel::Bullish,
        (true, false) => TrendLabel::Bearish,
        (false, true) => TrendLabel::PullBack,
        (false, false) => TrendLabel::Reversal,
    }
}

/// Samples of `series` within `window_minutes` of its last timestamp.
pub fn trailing_window(series: &[TimedValue], window_minutes: f64) -> &[TimedValue] {
    let Some(&(latest, _)) = series.last() else {
        return series;
    };
    let lower = latest - minutes(window_minutes);
    let start = series.partition_point(|&(ts, _)| ts < lower);
    &series[start..]
}

/// Gap signals for one timestamp-ascending metric series.
///
/// Returns `None` when the short window holds fewer than two samples or the
/// long window is empty.
pub fn metric_gap(series: &[TimedValue], windows: GapWindows) -> Option<MetricGap> {
    let short = trailing_window(series, windows.short_minutes);
    let long = trailing_window(series, windows.long_minutes);
    if short.len() < 2 || long.is_empty() {
        return None;
    }

    let ema_short = compute_ema_adaptive(short, windows.short_minutes);
    let ema_long = compute_ema_adaptive(long, windows.long_minutes);

    let long_at = |ts| {
        ema_long
            .iter()
            .find(|&&(t, _)| t == ts)
            .map(|&(_, v)| v)
    };

    let &(first_ts, first_short) = ema_short.first()?;
    let &(last_ts, last_short) = ema_short.last()?;
    let gap_first = first_short - long_at(first_ts)?;
    let final_long = long_at(last_ts)?;
    let gap = last_short - final_long;

    Some(MetricGap {
        ema_short: last_short,
        ema_long: final_long,
        gap,
        delta_gap: gap - gap_first,
    })
}

/// Population standard deviation; `0.0` for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Run the gap analysis on price and emission of one subnet's series.
///
/// `std_price` and `sample_count` cover every sample passed in.
/// `sampling_gaps` is left at zero; the engine fills it in.
pub fn analyze_subnet(netuid: u16, samples: &[Sample], windows: GapWindows) -> Option<GapResult> {
    let current = samples.last()?;
    let prices: Vec<TimedValue> = samples.iter().map(|s| (s.timestamp, s.price)).collect();
    let emissions: Vec<TimedValue> = samples.iter().map(|s| (s.timestamp, s.emission)).collect();

    let price = metric_gap(&prices, windows)?;
    let emission = metric_gap(&emissions, windows)?;

    Some(GapResult {
        netuid,
        current_emission: current.emission,
        current_price: current.price,
        ema_short_price: price.ema_short,
        ema_long_price: price.ema_long,
        gap_price: price.gap,
        delta_gap_price: price.delta_gap,
        ema_short_emission: emission.ema_short,
        ema_long_emission: emission.ema_long,
        gap_emission: emission.gap,
        delta_gap_emission: emission.delta_gap,
        price_trend: price.trend(),
        emission_trend: emission.trend(),
        std_price: std_dev(&samples.iter().map(|s| s.price).collect::<Vec<_>>()),
        sample_count: samples.len(),
        sampling_gaps: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::ema::compute_ema;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn per_minute(values: &[f64]) -> Vec<TimedValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (t0() + Duration::minutes(i as i64), v))
            .collect()
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify_trend(2.0, 1.0), TrendLabel::Bullish);
        assert_eq!(classify_trend(-2.0, 1.0), TrendLabel::Bearish);
        assert_eq!(classify_trend(2.0, -1.0), TrendLabel::PullBack);
        assert_eq!(classify_trend(-2.0, -1.0), TrendLabel::Reversal);
        assert_eq!(classify_trend(0.0, 1.0), TrendLabel::Neutral);
        assert_eq!(classify_trend(2.0, 0.0), TrendLabel::Neutral);
        assert_eq!(classify_trend(1e-13, 5.0), TrendLabel::Neutral);
    }

    #[test]
    fn trailing_window_is_inclusive_of_lower_bound() {
        let s = per_minute(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        // Latest at minute 6; 5-minute window starts at minute 1.
        assert_eq!(trailing_window(&s, 5.0).len(), 6);
        assert_eq!(trailing_window(&s, 60.0).len(), 7);
        assert!(trailing_window(&[], 5.0).is_empty());
    }

    #[test]
    fn too_few_short_samples_is_insufficient() {
        // Two samples 10 minutes apart: short window holds only the last.
        let s = vec![(t0(), 1.0), (t0() + Duration::minutes(10), 2.0)];
        assert!(metric_gap(&s, GapWindows::default()).is_none());
        assert!(metric_gap(&per_minute(&[1.0]), GapWindows::default()).is_none());
    }

    #[test]
    fn constant_series_is_neutral() {
        let s = per_minute(&[3.0; 30]);
        let g = metric_gap(&s, GapWindows::default()).unwrap();
        assert!(g.gap.abs() < 1e-12);
        assert!(g.delta_gap.abs() < 1e-12);
        assert_eq!(g.trend(), TrendLabel::Neutral);
    }

    #[test]
    fn equal_windows_give_zero_delta() {
        // Identical short and long windows produce identical EMAs.
        let s = per_minute(&[1.0, 5.0, 2.0, 8.0, 3.0, 9.0]);
        let w = GapWindows {
            short_minutes: 5.0,
            long_minutes: 5.0,
        };
        let g = metric_gap(&s, w).unwrap();
        assert_eq!(g.gap, 0.0);
        assert_eq!(g.delta_gap, 0.0);
        assert_eq!(g.trend(), TrendLabel::Neutral);
    }

    #[test]
    fn gap_matches_manual_computation() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + (i as f64) * 0.5).collect();
        let s = per_minute(&values);
        let g = metric_gap(&s, GapWindows::default()).unwrap();

        // Short: minutes 14..=19 (span 5), long: all 20 (span 19 < 60).
        let short = compute_ema(&s[14..], 5.0);
        let long = compute_ema(&s, 19.0);
        let expected_gap = short[5].1 - long[19].1;
        let expected_first = short[0].1 - long[14].1;
        assert!((g.gap - expected_gap).abs() < 1e-12);
        assert!((g.delta_gap - (expected_gap - expected_first)).abs() < 1e-12);
        assert!((g.ema_short - short[5].1).abs() < 1e-12);
        assert!((g.ema_long - long[19].1).abs() < 1e-12);
    }

    #[test]
    fn rising_series_is_bullish() {
        // Accelerating growth: the short EMA pulls further ahead of the long.
        let values: Vec<f64> = (0..40).map(|i| 1.0 + (i as f64).powi(2) * 0.01).collect();
        let g = metric_gap(&per_minute(&values), GapWindows::default()).unwrap();
        assert!(g.gap > 0.0);
        assert_eq!(g.trend(), TrendLabel::Bullish);
    }

    #[test]
    fn analyze_subnet_reports_current_values() {
        let samples: Vec<Sample> = (0..10)
            .map(|i| Sample {
                netuid: 12,
                timestamp: t0() + Duration::minutes(i),
                price: 1.0 + i as f64,
                emission: 0.5,
            })
            .collect();
        let r = analyze_subnet(12, &samples, GapWindows::default()).unwrap();
        assert_eq!(r.netuid, 12);
        assert_eq!(r.current_price, 10.0);
        assert_eq!(r.current_emission, 0.5);
        assert_eq!(r.emission_trend, TrendLabel::Neutral);
        assert_eq!(r.sampling_gaps, 0);
        assert_eq!(r.sample_count, 10);
        // Prices 1..=10: population variance is (10^2 - 1) / 12.
        assert!((r.std_price - (99.0f64 / 12.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn std_dev_of_constant_or_empty_is_zero() {
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(std_dev(&[4.0, 4.0, 4.0]), 0.0);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn gap_result_uses_stable_wire_names() {
        let samples: Vec<Sample> = (0..6)
            .map(|i| Sample {
                netuid: 1,
                timestamp: t0() + Duration::minutes(i),
                price: 1.0,
                emission: 1.0,
            })
            .collect();
        let r = analyze_subnet(1, &samples, GapWindows::default()).unwrap();
        let v = serde_json::to_value(&r).unwrap();
        for key in [
            "netuid",
            "current_emission",
            "current_price",
            "final_ema5_price",
            "final_ema60_price",
            "final_gap_price",
            "delta_gap_price",
            "final_ema5_emission",
            "final_ema60_emission",
            "final_gap_emission",
            "delta_gap_emission",
            "std_price",
            "sample_count",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["price_trend"], "Neutral");
    }
}
