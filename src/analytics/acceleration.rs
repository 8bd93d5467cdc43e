// =============================================================================
// Acceleration Engine
// =============================================================================
//
// Second-order trend signal on an aggregate series:
//
//   diff_i       = value_i - EMA_i
//   acceleration = (diff_last - diff_prev) / dt_minutes
//
// evaluated per nominal timeframe on the samples within that timeframe of
// the latest timestamp, with the EMA window shortened to the restricted
// series' span when history is short.
//
// The rolling variant computes the same quantity for every sliding
// sub-window of `rolling_window` samples and smooths the resulting sequence
// with a Savitzky–Golay filter before taking the last value.
// =============================================================================

use std::collections::BTreeMap;

use tracing::trace;

use super::gap::trailing_window;
use crate::indicators::ema::{compute_ema_adaptive, TimedValue};
use crate::indicators::savgol::savgol_filter;
use crate::types::minutes_between;

/// Timeframe (minutes) -> acceleration per minute, `None` when unavailable.
pub type AccelerationResult = BTreeMap<u32, Option<f64>>;

/// Parameters of the rolling/smoothed variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// Samples per sliding sub-window.
    pub rolling_window: usize,
    /// Savitzky–Golay window length (odd).
    pub smoothing_window: usize,
    /// Savitzky–Golay polynomial order.
    pub polyorder: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            rolling_window: 5,
            smoothing_window: 5,
            polyorder: 2,
        }
    }
}

/// Acceleration between the last two samples of `series`.
///
/// Returns `None` for fewer than two samples or a zero time step.
pub fn acceleration(series: &[TimedValue], nominal_minutes: f64) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let ema = compute_ema_adaptive(series, nominal_minutes);
    let n = series.len();
    if ema.len() != n {
        return None;
    }

    let (ts_prev, v_prev) = series[n - 2];
    let (ts_last, v_last) = series[n - 1];
    let dt = minutes_between(ts_prev, ts_last);
    if dt <= 0.0 {
        return None;
    }

    let diff_prev = v_prev - ema[n - 2].1;
    let diff_last = v_last - ema[n - 1].1;
    Some((diff_last - diff_prev) / dt)
}

/// Acceleration for every sliding sub-window of `rolling_window` samples,
/// oldest first. Sub-windows with a zero time step are skipped.
pub fn rolling_acceleration(
    series: &[TimedValue],
    nominal_minutes: f64,
    rolling_window: usize,
) -> Vec<f64> {
    if rolling_window < 2 {
        return Vec::new();
    }
    series
        .windows(rolling_window)
        .filter_map(|w| acceleration(w, nominal_minutes))
        .collect()
}

/// Smoothed rolling acceleration.
///
/// Falls back to the last raw value when the rolling sequence is shorter
/// than the smoothing window, and to `None` when it is empty.
pub fn smoothed_acceleration(
    series: &[TimedValue],
    nominal_minutes: f64,
    params: SmoothingParams,
) -> Option<f64> {
    let raw = rolling_acceleration(series, nominal_minutes, params.rolling_window);
    let last_raw = *raw.last()?;

    match savgol_filter(&raw, params.smoothing_window, params.polyorder) {
        Some(smoothed) => smoothed.last().copied(),
        None => {
            trace!(
                points = raw.len(),
                window = params.smoothing_window,
                "smoothing inapplicable, using last raw acceleration"
            );
            Some(last_raw)
        }
    }
}

/// [`acceleration`] for each timeframe, on the samples within that many
/// minutes of the latest timestamp.
pub fn acceleration_by_timeframe(series: &[TimedValue], timeframes: &[u32]) -> AccelerationResult {
    timeframes
        .iter()
        .map(|&tf| {
            let window = trailing_window(series, f64::from(tf));
            (tf, acceleration(window, f64::from(tf)))
        })
        .collect()
}

/// [`smoothed_acceleration`] for each timeframe.
pub fn smoothed_acceleration_by_timeframe(
    series: &[TimedValue],
    timeframes: &[u32],
    params: SmoothingParams,
) -> AccelerationResult {
    timeframes
        .iter()
        .map(|&tf| {
            let window = trailing_window(series, f64::from(tf));
            (tf, smoothed_acceleration(window, f64::from(tf), params))
        })
        .collect()
}
