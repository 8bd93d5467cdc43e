use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Identity of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ip: IpAddr,
    pub path: String,
    pub query: String,
}

impl CacheKey {
    pub fn new(ip: IpAddr, path: impl Into<String>, query: Option<&str>) -> Self {
        Self {
            ip,
            path: path.into(),
            query: query.unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    stored_at: Instant,
}

/// Per-client response cache with a fixed freshness window.
///
/// Guarantees:
/// - A hit returns the exact serialized body stored, never a recomputation.
/// - An entry is fresh while younger than `ttl`, measured from its last write.
/// - Memory is bounded by `max_entries`; inserting a new key at capacity
///   evicts the oldest entry.
///
/// There is no in-flight dedup: concurrent misses on one key all recompute
/// and the last writer wins.
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    map: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            map: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// The stored body for `key` if it is younger than the TTL at `now`.
    pub fn get_fresh(&self, key: &CacheKey, now: Instant) -> Option<String> {
        let map = self.map.lock();
        let entry = map.get(key)?;
        (now.saturating_duration_since(entry.stored_at) < self.ttl).then(|| entry.body.clone())
    }

    pub fn insert(&self, key: CacheKey, body: String, now: Instant) {
        let mut map = self.map.lock();

        if !map.contains_key(&key) && map.len() >= self.max_entries {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = oldest {
                map.remove(&victim);
                debug!(
                    path = %victim.path,
                    cache_size = map.len(),
                    "cache capacity reached; evicted oldest response"
                );
            }
        }

        map.insert(
            key,
            CacheEntry {
                body,
                stored_at: now,
            },
        );
    }

    /// Drop every entry that is no longer fresh at `now`. Returns how many
    /// were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut map = self.map.lock();
        let before = map.len();
        map.retain(|_, e| now.saturating_duration_since(e.stored_at) < self.ttl);
        let removed = before - map.len();
        if removed > 0 {
            info!(removed, remaining = map.len(), "response cache swept");
        }
        removed
    }
}
