// =============================================================================
// Shared types used across the subnet trend engine
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Netuid of the root subnet. Excluded from totals and ranking unless the
/// legacy `include_root_entity` flag is set.
pub const ROOT_NETUID: u16 = 0;

/// One validated observation of a subnet at a snapshot timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub netuid: u16,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub emission: f64,
}

/// Raw row as returned by the store. Price and emission are `None` when the
/// stored cell was missing, non-numeric or non-finite.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub netuid: u16,
    pub timestamp: DateTime<Utc>,
    pub price: Option<f64>,
    pub emission: Option<f64>,
}

impl RawRecord {
    /// Convert into a [`Sample`] if both metrics parsed to finite numbers.
    pub fn to_sample(&self) -> Option<Sample> {
        let price = self.price.filter(|p| p.is_finite())?;
        let emission = self.emission.filter(|e| e.is_finite())?;
        Some(Sample {
            netuid: self.netuid,
            timestamp: self.timestamp,
            price,
            emission,
        })
    }
}

/// Discrete label derived from a (final gap, delta gap) pair.
///
/// Sign convention: a converging gap above zero is a `PullBack`, a
/// converging gap below zero is a `Reversal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Bullish,
    Bearish,
    #[serde(rename = "Pull Back")]
    PullBack,
    Reversal,
    Neutral,
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "Bullish"),
            Self::Bearish => write!(f, "Bearish"),
            Self::PullBack => write!(f, "Pull Back"),
            Self::Reversal => write!(f, "Reversal"),
            Self::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Milliseconds since the Unix epoch, the on-disk timestamp representation.
pub fn to_epoch_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_epoch_ms`]. Returns `None` for out-of-range values.
pub fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// Elapsed minutes between two instants as a real number.
pub fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

/// A real number of minutes as a millisecond-precision duration.
pub fn minutes(m: f64) -> Duration {
    Duration::milliseconds((m * 60_000.0).round() as i64)
}
