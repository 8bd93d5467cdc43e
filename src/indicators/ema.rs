// =============================================================================
// Exponential Moving Average (EMA) over timestamped samples
// =============================================================================
//
// Formula (window N in minutes, one sample per poll cycle):
//   alpha  = 2 / (N + 1)
//   EMA_0  = x_0
//   EMA_i  = alpha * x_i + (1 - alpha) * EMA_{i-1}
//
// Unlike the classic SMA-seeded variant, the series is seeded with its first
// raw value so the output always has the same length as the input.
// =============================================================================

use chrono::{DateTime, Utc};

use crate::types::minutes_between;

/// A `(timestamp, value)` pair. Series are always timestamp-ascending.
pub type TimedValue = (DateTime<Utc>, f64);

/// Running EMA recurrence state for a single window length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaState {
    alpha: f64,
    value: Option<f64>,
}

impl EmaState {
    /// Returns `None` for a non-positive or non-finite window.
    pub fn new(window_minutes: f64) -> Option<Self> {
        if !window_minutes.is_finite() || window_minutes <= 0.0 {
            return None;
        }
        Some(Self {
            alpha: 2.0 / (window_minutes + 1.0),
            value: None,
        })
    }

    /// Feed the next observation and return the updated EMA.
    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }
}

/// Compute the EMA series for `series` at `window_minutes`.
///
/// The output has the same length and timestamps as the input and the first
/// EMA equals the first raw value. Returns an empty `Vec` for an empty input
/// or an invalid window.
pub fn compute_ema(series: &[TimedValue], window_minutes: f64) -> Vec<TimedValue> {
    let Some(mut state) = EmaState::new(window_minutes) else {
        return Vec::new();
    };
    series
        .iter()
        .map(|&(ts, x)| (ts, state.update(x)))
        .collect()
}

/// Effective window for a series: the nominal window, shortened to the
/// series' actual span when the history is shorter than requested.
///
/// A zero span (single sample, or all samples at one instant) keeps the
/// nominal window.
pub fn effective_window(series: &[TimedValue], nominal_minutes: f64) -> f64 {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return nominal_minutes;
    };
    let span = minutes_between(first.0, last.0);
    if span > 0.0 && span < nominal_minutes {
        span
    } else {
        nominal_minutes
    }
}

/// [`compute_ema`] with the short-history correction from [`effective_window`].
pub fn compute_ema_adaptive(series: &[TimedValue], nominal_minutes: f64) -> Vec<TimedValue> {
    compute_ema(series, effective_window(series, nominal_minutes))
}
