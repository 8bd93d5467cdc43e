// =============================================================================
// Subnet Trends — Main Entry Point
// =============================================================================
//
// Serves trend analytics over the subnet snapshots written by the external
// poller. The service never writes market data itself; it reads the SQLite
// store, recomputes on demand and caches serialized responses briefly.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analytics;
mod api;
mod app_state;
mod indicators;
mod report;
mod runtime_config;
mod store;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::store::SqliteStore;

const CONFIG_PATH: &str = "subnet_trends.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Subnet Trends starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        let defaults = RuntimeConfig::default();
        if !std::path::Path::new(CONFIG_PATH).exists() {
            // Leave a template behind for the operator to edit.
            if let Err(e) = defaults.save(CONFIG_PATH) {
                warn!(error = %e, "Failed to write default config");
            }
        }
        defaults
    });
    config.apply_env_overrides();
    config.warn_on_issues();

    if config.include_root_entity {
        warn!("include_root_entity is set: netuid 0 counts toward totals and ranking (legacy)");
    }
    info!(
        db_path = %config.db_path,
        bind_addr = %config.bind_addr,
        top_k = config.top_k,
        timeframes = ?config.acceleration_timeframes,
        "Configuration resolved"
    );

    // ── 2. Store & shared state ──────────────────────────────────────────
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("failed to open snapshot store at {}", config.db_path))?;
    let bind_addr = config.bind_addr.clone();
    let sweep_secs = config.cache_sweep_interval_secs.max(1);
    let state = Arc::new(AppState::new(config, Arc::new(store)));

    // ── 3. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!(error = %e, "API server failed");
        }
    });

    // ── 4. Response cache sweeper ────────────────────────────────────────
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
        loop {
            interval.tick().await;
            sweep_state.cache.sweep(Instant::now());
        }
    });

    // ── 5. Operator report loop ──────────────────────────────────────────
    tokio::spawn(report::run_report_loop(state.clone()));

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");

    info!(uptime_secs = state.uptime_secs(), "Subnet Trends shut down complete.");
    Ok(())
}
