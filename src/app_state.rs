// =============================================================================
// Central Application State
// =============================================================================
//
// Shared across the HTTP handlers and background loops via `Arc<AppState>`.
//
// Thread safety:
//   - parking_lot::RwLock around the runtime config.
//   - The store and the response cache manage their own interior mutability.
//
// Nothing analytical is held here: every analysis pass recomputes from the
// store, and only serialized HTTP responses are cached.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::analytics::AnalysisParams;
use crate::api::cache::ResponseCache;
use crate::runtime_config::RuntimeConfig;
use crate::store::SqliteStore;

pub struct AppState {
    pub runtime_config: RwLock<RuntimeConfig>,
    pub store: Arc<SqliteStore>,
    pub cache: ResponseCache,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, store: Arc<SqliteStore>) -> Self {
        let cache = ResponseCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
        );
        Self {
            runtime_config: RwLock::new(config),
            store,
            cache,
            start_time: Instant::now(),
        }
    }

    /// Engine parameters from the current config.
    pub fn analysis_params(&self) -> AnalysisParams {
        self.runtime_config.read().analysis_params()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
