// =============================================================================
// Analysis Engine — aggregation and ranking
// =============================================================================
//
// One analysis pass:
//   1. Read the latest snapshot timestamp and every record within the
//      lookback horizon from the store.
//   2. Group records into per-subnet series; drop subnets with malformed
//      values and (unless the legacy flag is set) the root subnet.
//   3. Aggregate total-price series over the whole horizon -> EMA, global
//      gap, acceleration.
//   4. Current subnets only (present in the latest snapshot, history trimmed
//      to the gap windows): continuity guard, gap analysis, total price.
//   5. Rank current subnets by emission, keep the top K, order by netuid.
//
// Every pass recomputes from the store; nothing is carried between calls.
// =============================================================================

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::acceleration::{
    acceleration_by_timeframe, smoothed_acceleration_by_timeframe, AccelerationResult,
    SmoothingParams,
};
use super::continuity::check_continuity;
use super::gap::{analyze_subnet, metric_gap, GapResult, GapWindows};
use crate::indicators::ema::{compute_ema_adaptive, TimedValue};
use crate::store::SampleStore;
use crate::types::{minutes, RawRecord, Sample, TrendLabel, ROOT_NETUID};

/// Engine parameters, derived from the runtime config.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    pub windows: GapWindows,
    pub total_ema_window_minutes: f64,
    pub acceleration_timeframes: Vec<u32>,
    pub smoothing: SmoothingParams,
    pub top_k: usize,
    pub max_sample_gap_secs: f64,
    /// Legacy behaviour: count the root subnet in totals and ranking.
    pub include_root_entity: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            windows: GapWindows::default(),
            total_ema_window_minutes: 240.0,
            acceleration_timeframes: vec![5, 10, 15, 60, 240],
            smoothing: SmoothingParams::default(),
            top_k: 10,
            max_sample_gap_secs: 65.0,
            include_root_entity: false,
        }
    }
}

impl AnalysisParams {
    /// History needed by the widest window in use, in minutes.
    pub fn lookback_minutes(&self) -> f64 {
        let max_tf = self
            .acceleration_timeframes
            .iter()
            .copied()
            .max()
            .map_or(0.0, f64::from);
        self.windows
            .long_minutes
            .max(self.windows.short_minutes)
            .max(self.total_ema_window_minutes)
            .max(max_tf)
    }
}

/// Aggregate output of one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSnapshot {
    pub snapshot_timestamp: DateTime<Utc>,
    pub total_price: f64,
    pub total_price_ema: f64,
    #[serde(rename = "final_gap_total_price")]
    pub global_gap: Option<f64>,
    #[serde(rename = "delta_gap_total_price")]
    pub global_delta_gap: Option<f64>,
    pub total_price_trend: Option<TrendLabel>,
    pub acceleration: AccelerationResult,
    pub acceleration_smoothed: AccelerationResult,
    #[serde(rename = "subnet_gap_trends")]
    pub ranked_entities: Vec<GapResult>,
}

/// Run a full analysis pass against `store`.
///
/// `Ok(None)` means the store holds no snapshots (or no records in the
/// lookback horizon); this is distinct from a snapshot whose ranking is empty.
pub fn run_analysis(
    store: &dyn SampleStore,
    params: &AnalysisParams,
) -> Result<Option<AnalysisSnapshot>> {
    let Some(latest) = store
        .latest_snapshot_timestamp()
        .context("failed to read latest snapshot timestamp")?
    else {
        info!("no snapshot data found in the store");
        return Ok(None);
    };

    let lower_bound = latest - minutes(params.lookback_minutes());
    let records = store
        .records_since(lower_bound)
        .with_context(|| format!("failed to fetch records since {lower_bound}"))?;

    Ok(analyze_records(&records, latest, params))
}

/// Pure part of [`run_analysis`]: everything after the store reads.
pub fn analyze_records(
    records: &[RawRecord],
    latest: DateTime<Utc>,
    params: &AnalysisParams,
) -> Option<AnalysisSnapshot> {
    if records.is_empty() {
        info!(latest = %latest, "no records within the lookback horizon");
        return None;
    }

    let series = group_series(records, params.include_root_entity);
    let history_minutes = params.windows.long_minutes.max(params.windows.short_minutes);
    let current = current_series(&series, latest, history_minutes);

    let mut results = Vec::new();
    for (&netuid, samples) in &current {
        let gaps = check_continuity(netuid, samples, params.max_sample_gap_secs);
        match analyze_subnet(netuid, samples, params.windows) {
            Some(mut r) => {
                r.sampling_gaps = gaps;
                results.push(r);
            }
            None => debug!(
                netuid,
                samples = samples.len(),
                "insufficient data for gap analysis"
            ),
        }
    }

    let total_price = total_price(&current);
    let aggregate = aggregate_series(&series);

    let total_price_ema = compute_ema_adaptive(&aggregate, params.total_ema_window_minutes)
        .last()
        .map_or(total_price, |&(_, v)| v);

    let global = metric_gap(&aggregate, params.windows);
    let acceleration = acceleration_by_timeframe(&aggregate, &params.acceleration_timeframes);
    let acceleration_smoothed = smoothed_acceleration_by_timeframe(
        &aggregate,
        &params.acceleration_timeframes,
        params.smoothing,
    );

    let analysed = results.len();
    let ranked_entities = rank_entities(results, params.top_k);

    debug!(
        subnets = series.len(),
        current = current.len(),
        analysed,
        ranked = ranked_entities.len(),
        total_price,
        total_price_ema,
        "analysis pass complete"
    );

    Some(AnalysisSnapshot {
        snapshot_timestamp: latest,
        total_price,
        total_price_ema,
        global_gap: global.map(|g| g.gap),
        global_delta_gap: global.map(|g| g.delta_gap),
        total_price_trend: global.map(|g| g.trend()),
        acceleration,
        acceleration_smoothed,
        ranked_entities,
    })
}

/// Group records into timestamp-ascending per-subnet series.
///
/// A subnet with any malformed record in the horizon is dropped entirely so
/// a missing value never enters an EMA trajectory as zero.
pub fn group_series(records: &[RawRecord], include_root: bool) -> BTreeMap<u16, Vec<Sample>> {
    let mut series: BTreeMap<u16, Vec<Sample>> = BTreeMap::new();
    let mut malformed: Vec<u16> = Vec::new();

    for rec in records {
        if rec.netuid == ROOT_NETUID && !include_root {
            continue;
        }
        match rec.to_sample() {
            Some(sample) => series.entry(rec.netuid).or_default().push(sample),
            None => malformed.push(rec.netuid),
        }
    }

    malformed.sort_unstable();
    malformed.dedup();
    for netuid in malformed {
        series.remove(&netuid);
        debug!(netuid, "subnet excluded: malformed price or emission");
    }

    for samples in series.values_mut() {
        samples.sort_by_key(|s| s.timestamp);
        // Keep the last sample written for any repeated timestamp.
        samples.reverse();
        samples.dedup_by_key(|s| s.timestamp);
        samples.reverse();
    }

    series
}

/// Subnets present in the snapshot at `latest`, each trimmed to the samples
/// within `history_minutes` of it.
///
/// A subnet that stopped reporting keeps contributing to the aggregate series
/// for the timestamps it was present at, but is neither counted in the
/// current total nor ranked.
pub fn current_series(
    series: &BTreeMap<u16, Vec<Sample>>,
    latest: DateTime<Utc>,
    history_minutes: f64,
) -> BTreeMap<u16, Vec<Sample>> {
    let lower = latest - minutes(history_minutes);
    series
        .iter()
        .filter_map(|(&netuid, samples)| {
            let last = samples.last()?;
            if last.timestamp != latest {
                debug!(netuid, last_seen = %last.timestamp, "subnet absent from latest snapshot");
                return None;
            }
            let start = samples.partition_point(|s| s.timestamp < lower);
            Some((netuid, samples[start..].to_vec()))
        })
        .collect()
}

/// Sum of each subnet's most recent price.
pub fn total_price(series: &BTreeMap<u16, Vec<Sample>>) -> f64 {
    series
        .values()
        .filter_map(|samples| samples.last())
        .map(|s| s.price)
        .sum()
}

/// Sum of all subnet prices per snapshot timestamp, timestamp-ascending.
pub fn aggregate_series(series: &BTreeMap<u16, Vec<Sample>>) -> Vec<TimedValue> {
    let mut by_ts: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for sample in series.values().flatten() {
        *by_ts.entry(sample.timestamp).or_insert(0.0) += sample.price;
    }
    by_ts.into_iter().collect()
}

/// Top `top_k` results by current emission (descending, netuid ascending on
/// ties), returned in netuid order.
pub fn rank_entities(mut results: Vec<GapResult>, top_k: usize) -> Vec<GapResult> {
    results.sort_by(|a, b| {
        b.current_emission
            .total_cmp(&a.current_emission)
            .then(a.netuid.cmp(&b.netuid))
    });
    results.truncate(top_k);
    results.sort_by_key(|r| r.netuid);
    results
}
