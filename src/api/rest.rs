// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only endpoints over the snapshot store and the analysis engine.
// Everything except `/api/v1/health` goes through the response cache: a
// fresh entry for (client ip, path, query) is returned verbatim, otherwise
// the handler recomputes on the blocking pool and stores the new body.
// Only successful responses are cached.
//
// CORS is permissive; the service is a dashboard backend.
// =============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, Json, Path, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, warn};

use crate::analytics::run_analysis;
use crate::api::cache::CacheKey;
use crate::app_state::AppState;
use crate::store::RecordFilter;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST router with CORS middleware and shared state.
///
/// Handlers read the client address from `ConnectInfo`, so the router must
/// be served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/snapshots/latest", get(latest_snapshot))
        .route("/snapshots/:snapshot_id", get(snapshot_by_id))
        .route("/subnets", get(subnets))
        .route("/analysis", get(analysis))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (not cached)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    cached_responses: usize,
    cache_ttl_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        cached_responses: state.cache.len(),
        cache_ttl_secs: state.cache.ttl().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Cached computation
// =============================================================================

/// Serve `uri` for `ip` from the cache, or run `compute` on the blocking pool.
///
/// `compute` yields the serialized body, or `None` for a 404 with
/// `not_found` as the error message.
async fn serve_cached<F>(
    state: Arc<AppState>,
    ip: IpAddr,
    uri: &Uri,
    not_found: &'static str,
    compute: F,
) -> Response
where
    F: FnOnce(&AppState) -> Result<Option<String>> + Send + 'static,
{
    let key = CacheKey::new(ip, uri.path(), uri.query());

    if let Some(body) = state.cache.get_fresh(&key, Instant::now()) {
        debug!(%ip, path = %key.path, "response cache hit");
        return json_body(body);
    }

    let worker = state.clone();
    match tokio::task::spawn_blocking(move || compute(&worker)).await {
        Ok(Ok(Some(body))) => {
            state.cache.insert(key, body.clone(), Instant::now());
            json_body(body)
        }
        Ok(Ok(None)) => error_response(StatusCode::NOT_FOUND, not_found),
        Ok(Err(e)) => {
            warn!(path = %uri.path(), error = %format!("{e:#}"), "request failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, &format!("{e:#}"))
        }
        Err(e) => {
            error!(path = %uri.path(), error = %e, "blocking task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn json_body(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn to_body<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("failed to serialise response")
}

// =============================================================================
// Snapshots
// =============================================================================

async fn latest_snapshot(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Response {
    serve_cached(state, addr.ip(), &uri, "no data", |s| {
        s.store
            .latest_snapshot()
            .context("failed to read latest snapshot")?
            .map(|snap| to_body(&snap))
            .transpose()
    })
    .await
}

async fn snapshot_by_id(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(snapshot_id): Path<i64>,
    uri: Uri,
) -> Response {
    serve_cached(state, addr.ip(), &uri, "snapshot not found", move |s| {
        s.store
            .snapshot(snapshot_id)
            .with_context(|| format!("failed to read snapshot {snapshot_id}"))?
            .map(|snap| to_body(&snap))
            .transpose()
    })
    .await
}

// =============================================================================
// Subnets + analysis
// =============================================================================

async fn subnets(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(filter): Query<RecordFilter>,
    uri: Uri,
) -> Response {
    serve_cached(state, addr.ip(), &uri, "no data", move |s| {
        let records = s
            .store
            .query_records(&filter)
            .context("failed to query subnet records")?;
        let analysis = run_analysis(&*s.store, &s.analysis_params())?;
        to_body(&json!({ "subnets": records, "analysis": analysis })).map(Some)
    })
    .await
}

async fn analysis(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Response {
    serve_cached(state, addr.ip(), &uri, "no data", |s| {
        run_analysis(&*s.store, &s.analysis_params())?
            .map(|snap| to_body(&snap))
            .transpose()
    })
    .await
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::runtime_config::RuntimeConfig;
    use crate::store::{LedgerEntry, SqliteStore};

    fn t(min: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(min)
    }

    fn entry(netuid: u16, price: f64, emission: f64) -> LedgerEntry {
        LedgerEntry {
            netuid,
            subnet_name: format!("subnet-{netuid}"),
            symbol: "τ".into(),
            price,
            emission,
        }
    }

    fn setup(minutes: i64) -> (Arc<AppState>, Router) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for m in 0..minutes {
            store
                .record_snapshot(
                    t(m),
                    &[entry(0, 1.0, 0.0), entry(1, 2.0 + m as f64 * 0.1, 0.3), entry(2, 5.0, 0.6)],
                )
                .unwrap();
        }
        let state = Arc::new(AppState::new(RuntimeConfig::default(), store));
        let app = router(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 40000))));
        (state, app)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = get_raw(app, uri).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_raw(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_, app) = setup(0);
        let (status, body) = get(&app, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn empty_store_is_not_found() {
        let (state, app) = setup(0);
        let (status, body) = get(&app, "/analysis").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no data");

        let (status, _) = get(&app, "/snapshots/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.cache.len(), 0);
    }

    #[tokio::test]
    async fn analysis_excludes_root_and_uses_stable_names() {
        let (_, app) = setup(10);
        let (status, body) = get(&app, "/analysis").await;
        assert_eq!(status, StatusCode::OK);

        let ranked = body["subnet_gap_trends"].as_array().unwrap();
        let ids: Vec<u64> = ranked.iter().map(|r| r["netuid"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!((body["total_price"].as_f64().unwrap() - 7.9).abs() < 1e-9);
        assert!(body.get("final_gap_total_price").is_some());
        assert!(body.get("delta_gap_total_price").is_some());
    }

    #[tokio::test]
    async fn repeated_request_within_ttl_is_served_from_cache() {
        let (state, app) = setup(10);
        let (_, first) = get_raw(&app, "/analysis").await;

        // New data is invisible until the entry expires.
        state
            .store
            .record_snapshot(t(10), &[entry(1, 50.0, 9.0), entry(2, 5.0, 0.6)])
            .unwrap();
        let (_, second) = get_raw(&app, "/analysis").await;
        assert_eq!(first, second);

        // A different query string is a different key.
        let (_, fresh) = get(&app, "/analysis?v=2").await;
        assert_eq!(fresh["snapshot_timestamp"], serde_json::to_value(t(10)).unwrap());
    }

    #[tokio::test]
    async fn snapshot_routes() {
        let (_, app) = setup(3);
        let (status, latest) = get(&app, "/snapshots/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["records"].as_array().unwrap().len(), 3);

        let id = latest["snapshot_id"].as_i64().unwrap();
        let (status, by_id) = get(&app, &format!("/snapshots/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_id, latest);

        let (status, body) = get(&app, "/snapshots/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "snapshot not found");
    }

    #[tokio::test]
    async fn subnets_filter_and_embed_analysis() {
        let (_, app) = setup(4);
        let (status, body) = get(&app, "/subnets?netuid=2").await;
        assert_eq!(status, StatusCode::OK);

        let rows = body["subnets"].as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r["netuid"] == 2));
        assert!(body["analysis"].is_object());
    }

    #[tokio::test]
    async fn subnets_on_empty_store_has_null_analysis() {
        let (_, app) = setup(0);
        let (status, body) = get(&app, "/subnets").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["subnets"].as_array().unwrap().is_empty());
        assert!(body["analysis"].is_null());
    }
}
