// =============================================================================
// Sampling continuity guard
// =============================================================================
//
// The poller writes one snapshot roughly every 60 s. A spacing larger than
// the configured maximum between two consecutive samples of one subnet means
// at least one poll cycle is missing. This is reported, never fatal.

use tracing::warn;

use crate::types::Sample;

/// A discontinuity between samples `from_index` and `to_index` of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingGap {
    pub netuid: u16,
    pub from_index: usize,
    pub to_index: usize,
    pub gap_secs: f64,
}

impl std::fmt::Display for SamplingGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "netuid {} has a gap of {:.0} seconds between sample {} and sample {}",
            self.netuid, self.gap_secs, self.from_index, self.to_index
        )
    }
}

/// Every adjacent pair in `samples` spaced strictly more than
/// `max_gap_secs` apart.
pub fn find_sampling_gaps(
    netuid: u16,
    samples: &[Sample],
    max_gap_secs: f64,
) -> Vec<SamplingGap> {
    samples
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let spacing = pair[1].timestamp - pair[0].timestamp;
            let gap_secs = spacing.num_milliseconds() as f64 / 1000.0;
            (gap_secs > max_gap_secs).then_some(SamplingGap {
                netuid,
                from_index: i,
                to_index: i + 1,
                gap_secs,
            })
        })
        .collect()
}

/// Log a diagnostic for every sampling gap and return how many were found.
pub fn check_continuity(netuid: u16, samples: &[Sample], max_gap_secs: f64) -> usize {
    let gaps = find_sampling_gaps(netuid, samples, max_gap_secs);
    for gap in &gaps {
        warn!(
            netuid = gap.netuid,
            from_index = gap.from_index,
            to_index = gap.to_index,
            gap_secs = gap.gap_secs,
            "{gap}"
        );
    }
    gaps.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn series(offsets_secs: &[i64]) -> Vec<Sample> {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        offsets_secs
            .iter()
            .map(|&s| Sample {
                netuid: 4,
                timestamp: t0 + Duration::seconds(s),
                price: 1.0,
                emission: 1.0,
            })
            .collect()
    }

    #[test]
    fn single_long_gap_yields_one_diagnostic() {
        // 60, 65, 120, 58 second spacings.
        let s = series(&[0, 60, 125, 245, 303]);
        let gaps = find_sampling_gaps(4, &s, 65.0);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].from_index, 2);
        assert_eq!(gaps[0].to_index, 3);
        assert!((gaps[0].gap_secs - 120.0).abs() < 1e-9);
    }

    #[test]
    fn regular_cadence_has_no_gaps() {
        let s = series(&[0, 60, 120, 181, 240]);
        assert!(find_sampling_gaps(4, &s, 65.0).is_empty());
        assert_eq!(check_continuity(4, &s, 65.0), 0);
    }

    #[test]
    fn short_series_has_no_gaps() {
        assert!(find_sampling_gaps(4, &series(&[0]), 65.0).is_empty());
        assert!(find_sampling_gaps(4, &[], 65.0).is_empty());
    }

    #[test]
    fn diagnostic_names_subnet_and_indices() {
        let gap = SamplingGap {
            netuid: 9,
            from_index: 3,
            to_index: 4,
            gap_secs: 121.4,
        };
        assert_eq!(
            gap.to_string(),
            "netuid 9 has a gap of 121 seconds between sample 3 and sample 4"
        );
    }
}
