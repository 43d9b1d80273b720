use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use perception_core_types::RequestId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::key::CacheKey;

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    request_id: RequestId,
    stored_at: Instant,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    corrupt: AtomicU64,
    purged: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub corrupt: u64,
    pub purged: u64,
    pub entries: u64,
}

/// Request-scoped, content-addressed store for model call results.
///
/// Every entry is tagged with the request that produced it so a failed request can drop all of
/// its results at once. Lookups never wait: a miss only means the call runs uncached.
pub struct ResponseCache {
    entries: DashMap<CacheKey, Entry>,
    ttl_ms: AtomicU64,
    counters: Counters,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms: AtomicU64::new(duration_to_millis(ttl)),
            counters: Counters::default(),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_ms.store(duration_to_millis(ttl), Ordering::Relaxed);
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// Typed read. A stored value that no longer deserialises into `T` is evicted and reported
    /// as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let (value, stored_at) = self.lookup(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                self.evict_corrupt(key, stored_at);
                self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                self.counters.hits.fetch_sub(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(target: "response-cache", key = %key, %err, "corrupt entry treated as miss");
                None
            }
        }
    }

    /// Drop the entry read at `stored_at`; a replacement stored meanwhile stays.
    fn evict_corrupt(&self, key: &CacheKey, stored_at: Instant) {
        self.entries
            .remove_if(key, |_, entry| entry.stored_at == stored_at);
    }

    fn evict_expired(&self, key: &CacheKey, ttl: Duration) {
        self.entries
            .remove_if(key, |_, entry| entry.stored_at.elapsed() > ttl);
    }

    fn lookup(&self, key: &CacheKey) -> Option<(Value, Instant)> {
        let ttl = self.current_ttl();
        let fresh = match self.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= ttl => {
                Some((entry.value.clone(), entry.stored_at))
            }
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match fresh {
            Some(found) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(found)
            }
            None => {
                self.evict_expired(key, ttl);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(target: "response-cache", key = %key, "entry expired");
                None
            }
        }
    }

    pub fn put(&self, key: CacheKey, value: Value, request_id: &RequestId) {
        self.entries.insert(
            key,
            Entry {
                value,
                request_id: request_id.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove every entry produced by `request_id`. Returns how many were dropped.
    pub fn purge(&self, request_id: &RequestId) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = &entry.request_id != request_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.counters
            .purged
            .fetch_add(removed as u64, Ordering::Relaxed);
        debug!(target: "response-cache", request_id = %request_id, removed, "purged request entries");
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            corrupt: self.counters.corrupt.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
            entries: self.entries.len() as u64,
        }
    }

    fn current_ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis > u128::from(u64::MAX) {
        u64::MAX
    } else {
        millis as u64
    }
}
