//! Persistent tier cache: remembers which resolved URI last loaded for a key.
//!
//! Entries carry their own expiry and are evicted lazily: the first reader
//! that observes `now >= expires_at` deletes the entry and reports a miss.
//! There is no background sweep.
//!
//! The cache is a latency optimisation only. Every storage failure is logged
//! and degraded to a miss (reads) or dropped (writes); nothing here returns
//! an error to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::tier::Tier;
use crate::config::TierCacheConfig;
use crate::storage::KeyValueStore;

/// A persisted "last known good" URI for one cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Cache identity (explicit cache key, else the canonical URI).
    #[serde(default)]
    pub key: String,

    /// The URI that last loaded successfully.
    pub uri: String,

    /// Tier the URI was resolved for, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    /// Epoch milliseconds at write time.
    pub cached_at: u64,

    /// Epoch milliseconds after which the entry is stale.
    pub expires_at: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }
}

/// Hit/miss accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub faults: u64,
    pub writes: u64,
}

/// Key → last-successful-URI store with a fixed TTL.
pub struct PersistentTierCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    key_prefix: String,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    faults: AtomicU64,
    writes: AtomicU64,
}

impl PersistentTierCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &TierCacheConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &TierCacheConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ttl: config.ttl(),
            key_prefix: config.key_prefix.clone(),
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn miss(&self) -> Option<CacheEntry> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Look up the last successful URI for `key`.
    ///
    /// Returns `None` when absent, expired (the entry is removed first),
    /// unreadable, or when the cache is disabled.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.enabled || key.is_empty() {
            return None;
        }
        let storage_key = self.storage_key(key);

        let raw = match self.store.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "Tier cache miss");
                return self.miss();
            }
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Tier cache read failed, treating as miss");
                return self.miss();
            }
        };

        let mut entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Corrupt tier cache entry, removing");
                self.remove_quietly(&storage_key).await;
                return self.miss();
            }
        };

        let now = self.clock.now_millis();
        if entry.is_expired(now) || entry.uri.is_empty() {
            self.expired.fetch_add(1, Ordering::Relaxed);
            debug!(key, expires_at = entry.expires_at, now, "Tier cache entry expired");
            self.remove_quietly(&storage_key).await;
            return self.miss();
        }

        if entry.key.is_empty() {
            entry.key = key.to_string();
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key, uri = %entry.uri, "Tier cache hit");
        Some(entry)
    }

    /// Record `uri` as the last successful URI for `key`. Last writer wins.
    pub async fn put(&self, key: &str, uri: &str, tier: Option<Tier>) {
        if !self.enabled || key.is_empty() || uri.is_empty() {
            return;
        }

        let now = self.clock.now_millis();
        let entry = CacheEntry {
            key: key.to_string(),
            uri: uri.to_string(),
            tier,
            cached_at: now,
            expires_at: now.saturating_add(self.ttl.as_millis() as u64),
        };

        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Failed to serialize tier cache entry");
                return;
            }
        };

        match self.store.set(&self.storage_key(key), &payload).await {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key, uri, "Tier cache updated");
            }
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Tier cache write failed");
            }
        }
    }

    /// Explicitly drop the entry for `key`.
    pub async fn invalidate(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        let storage_key = self.storage_key(key);
        self.remove_quietly(&storage_key).await;
        debug!(key, "Tier cache entry invalidated");
    }

    /// Remove every entry under this cache's prefix. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Failed to list tier cache keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(&self.key_prefix)) {
            if self.remove_quietly(key).await {
                removed += 1;
            }
        }

        info!(removed, "Tier cache cleared");
        removed
    }

    async fn remove_quietly(&self, storage_key: &str) -> bool {
        match self.store.remove(storage_key).await {
            Ok(()) => true,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(key = storage_key, error = %e, "Tier cache remove failed");
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}
