//! Process-wide response cache with per-entry expiry
//!
//! Entries are logically absent once `now - created_at > ttl`. Expired
//! entries are evicted lazily by [`ResponseCache::get`] and in bulk by
//! [`ResponseCache::cleanup`], which the periodic sweeper calls.
//!
//! Each entry is stored behind an `Arc` and swapped whole under the write
//! lock, so readers see either the old complete entry or the new one.

use crate::time::{Clock, SystemClock};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// One cached value and its expiry bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub created_at: DateTime<Utc>,
    pub ttl_millis: i64,
}

impl<T> CacheEntry<T> {
    /// True once the entry has outlived its TTL at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > ChronoDuration::milliseconds(self.ttl_millis)
    }
}

/// Key→value store shared by all request handlers
pub struct ResponseCache<T> {
    entries: RwLock<HashMap<String, Arc<CacheEntry<T>>>>,
    clock: Arc<dyn Clock>,
}

impl<T> ResponseCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Cache driven by the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Look up a live entry; an expired entry is evicted and reported absent
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.payload.clone()),
                Some(_) => {}
            }
        }

        // A concurrent set may have refreshed the key between the two locks
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
                debug!(key = %key, "Evicted expired cache entry on read");
                return None;
            }
            return Some(entry.payload.clone());
        }
        None
    }

    /// Store `value` under `key` for `ttl_minutes`; last write wins
    pub async fn set(&self, key: &str, value: T, ttl_minutes: u64) {
        let ttl_millis = i64::try_from(ttl_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX);
        let entry = Arc::new(CacheEntry {
            payload: value,
            created_at: self.clock.now(),
            ttl_millis,
        });
        self.entries.write().await.insert(key.to_string(), entry);
        debug!(key = %key, ttl_minutes, "Cache entry stored");
    }

    /// Remove a key regardless of expiry
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of physically stored entries (expired ones included)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    debug!("Cache dropped, stopping sweeper");
                    break;
                };
                let removed = cache.cleanup().await;
                if removed > 0 {
                    debug!(removed, "Cache sweep removed expired entries");
                }
            }
        })
    }
}

impl<T> Default for ResponseCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn cache_with_clock() -> (ResponseCache<Vec<String>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (ResponseCache::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_missing_key_is_absent() {
        let (cache, _clock) = cache_with_clock();
        assert!(cache.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_one_minute_ttl_expires_after_61_seconds() {
        let (cache, clock) = cache_with_clock();
        let payload = vec!["a.jpg".to_string()];

        cache.set("k", payload.clone(), 1).await;
        assert_eq!(cache.get("k").await, Some(payload));

        clock.advance(Duration::from_secs(61));
        assert!(cache.get("k").await.is_none());
        // Lazy expiry removed it physically too
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", vec![], 120).await;

        clock.advance(Duration::from_secs(120 * 60 - 1));
        assert!(cache.get("k").await.is_some());

        clock.advance(Duration::from_secs(2));
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_restarts_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", vec!["old".to_string()], 1).await;
        clock.advance(Duration::from_secs(50));
        cache.set("k", vec!["new".to_string()], 1).await;
        clock.advance(Duration::from_secs(50));

        assert_eq!(cache.get("k").await, Some(vec!["new".to_string()]));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let (cache, clock) = cache_with_clock();
        cache.set("short", vec![], 1).await;
        cache.set("long", vec![], 60).await;

        clock.advance(Duration::from_secs(120));
        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("long").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (cache, _clock) = cache_with_clock();
        cache.set("k", vec![], 5).await;
        assert!(cache.invalidate("k").await);
        assert!(!cache.invalidate("k").await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_expired_entries() {
        let clock = Arc::new(ManualClock::default());
        let cache: Arc<ResponseCache<u32>> = Arc::new(ResponseCache::with_clock(clock.clone()));
        cache.set("k", 7, 1).await;
        let handle = cache.spawn_sweeper(Duration::from_secs(30 * 60));

        clock.advance(Duration::from_secs(120));
        tokio::time::sleep(Duration::from_secs(30 * 60 + 1)).await;

        assert_eq!(cache.len().await, 0);
        handle.abort();
    }
}
