// =============================================================================
// Operator Report — periodic analysis summary in the service log
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::analytics::{run_analysis, AnalysisSnapshot};
use crate::app_state::AppState;

/// Run one analysis pass every `report_interval_secs` and log the result.
pub async fn run_report_loop(state: Arc<AppState>) {
    let secs = state.runtime_config.read().report_interval_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    loop {
        interval.tick().await;

        let worker = state.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_analysis(&*worker.store, &worker.analysis_params())
        })
        .await;

        match result {
            Ok(Ok(Some(snapshot))) => log_snapshot(&snapshot),
            Ok(Ok(None)) => info!("no snapshot data found in the store"),
            Ok(Err(e)) => warn!(error = %format!("{e:#}"), "analysis report failed"),
            Err(e) => error!(error = %e, "analysis report task failed"),
        }
    }
}

/// Structured log lines for one snapshot: aggregate first, then one line per
/// ranked subnet.
pub fn log_snapshot(snapshot: &AnalysisSnapshot) {
    info!(
        snapshot_timestamp = %snapshot.snapshot_timestamp,
        total_price = snapshot.total_price,
        total_price_ema = snapshot.total_price_ema,
        final_gap_total_price = ?snapshot.global_gap,
        delta_gap_total_price = ?snapshot.global_delta_gap,
        trend = ?snapshot.total_price_trend,
        "total price"
    );

    for (tf, acc) in &snapshot.acceleration {
        let smoothed = snapshot.acceleration_smoothed.get(tf).copied().flatten();
        info!(
            timeframe_minutes = tf,
            acceleration = ?acc,
            smoothed = ?smoothed,
            "total price acceleration"
        );
    }

    for r in &snapshot.ranked_entities {
        info!(
            netuid = r.netuid,
            price = r.current_price,
            emission = r.current_emission,
            gap_price = r.gap_price,
            delta_gap_price = r.delta_gap_price,
            price_trend = %r.price_trend,
            emission_trend = %r.emission_trend,
            std_price = r.std_price,
            samples = r.sample_count,
            sampling_gaps = r.sampling_gaps,
            "subnet trend"
        );
    }
}
