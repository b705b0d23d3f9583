use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use lru::LruCache;
use redis::Commands;

pub const REPORT_KEY_NAMESPACE: &str = "report";
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache key for one report: `report:<identity>:<start>:<end>`.
#[must_use]
pub fn report_cache_key(identity: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}{}:{}",
        report_cache_prefix(identity),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Prefix shared by every cached report of a user, whatever the window.
#[must_use]
pub fn report_cache_prefix(identity: &str) -> String {
    format!("{REPORT_KEY_NAMESPACE}:{identity}:")
}

/// Key-value store for serialized reports.
///
/// Implementations apply their own timeouts. Callers treat every error as
/// a soft failure.
pub trait ReportCache {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Remove every entry whose key starts with `prefix`, returning how many were removed.
    fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;
}

impl<T: ReportCache + ?Sized> ReportCache for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        (**self).delete_by_prefix(prefix)
    }
}

impl<T: ReportCache + ?Sized> ReportCache for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        (**self).delete_by_prefix(prefix)
    }
}

impl<T: ReportCache + ?Sized> ReportCache for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        (**self).delete_by_prefix(prefix)
    }
}

// --- In-process backend ---

#[derive(Debug, Clone)]
struct CacheEntry {
    data: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(data: String, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Bounded in-process cache with LRU eviction and per-entry expiry.
pub struct MemoryCache {
    store: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    const FALLBACK_CAPACITY: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CACHE_CAPACITY) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// A capacity of zero falls back to [`DEFAULT_CACHE_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(Self::FALLBACK_CAPACITY);
        Self {
            store: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, including ones that expired but were not read since.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ReportCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut store = self.lock();
        let Some(entry) = store.get(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            store.pop(key);
            return Ok(None);
        }
        Ok(Some(entry.data.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.lock()
            .push(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut store = self.lock();
        let matching: Vec<String> = store
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            store.pop(key);
        }
        Ok(matching.len() as u64)
    }
}

// --- Redis backend ---

/// Redis-backed cache shared between processes.
///
/// A single connection is serialized behind a mutex; the connection carries
/// read and write timeouts so no call blocks indefinitely.
pub struct RedisCache {
    conn: Mutex<redis::Connection>,
}

impl RedisCache {
    pub fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client =
            redis::Client::open(url).with_context(|| format!("Invalid Redis URL: {url}"))?;
        let mut conn = client
            .get_connection_with_timeout(timeout)
            .with_context(|| format!("Failed to connect to Redis at {url}"))?;
        conn.set_read_timeout(Some(timeout))?;
        conn.set_write_timeout(Some(timeout))?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .context("Redis did not answer PING")?;
        tracing::info!(url, "connected to Redis report cache");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, redis::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportCache for RedisCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.lock();
        let conn = &mut *guard;
        let value: Option<String> = conn.get(key).context("Redis GET failed")?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let mut guard = self.lock();
        let conn = &mut *guard;
        let () = conn
            .set_ex(key, value, seconds)
            .context("Redis SETEX failed")?;
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut guard = self.lock();
        let conn = &mut *guard;
        let keys: Vec<String> = conn
            .scan_match::<_, String>(&pattern)
            .context("Redis SCAN failed")?
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).context("Redis DEL failed")?;
        Ok(removed)
    }
}

/// Escape Redis glob metacharacters so a prefix only matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_report_cache_key_format() {
        let key = report_cache_key("abc-123", day(2024, 1, 1), day(2024, 1, 7));
        assert_eq!(key, "report:abc-123:2024-01-01:2024-01-07");
        assert!(key.starts_with(&report_cache_prefix("abc-123")));
    }

    #[test]
    fn test_prefix_does_not_match_longer_identity() {
        let key = report_cache_key("user10", day(2024, 1, 1), day(2024, 1, 7));
        assert!(!key.starts_with(&report_cache_prefix("user1")));
    }

    #[test]
    fn test_memory_cache_set_get() {
        let cache = MemoryCache::new(10);
        assert!(cache.get("k").unwrap().is_none());
        cache.set("k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));

        cache.set("k", "v2", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_memory_cache_expired_entry_is_a_miss() {
        let cache = MemoryCache::new(10);
        cache.set("k", "v", Duration::ZERO).unwrap();
        assert!(cache.get("k").unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memory_cache_delete_by_prefix() {
        let cache = MemoryCache::new(10);
        let ttl = Duration::from_secs(60);
        cache
            .set(&report_cache_key("u1", day(2024, 1, 1), day(2024, 1, 7)), "a", ttl)
            .unwrap();
        cache
            .set(&report_cache_key("u1", day(2024, 2, 1), day(2024, 2, 7)), "b", ttl)
            .unwrap();
        cache
            .set(&report_cache_key("u2", day(2024, 1, 1), day(2024, 1, 7)), "c", ttl)
            .unwrap();

        let removed = cache.delete_by_prefix(&report_cache_prefix("u1")).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert!(
            cache
                .get(&report_cache_key("u2", day(2024, 1, 1), day(2024, 1, 7)))
                .unwrap()
                .is_some()
        );

        assert_eq!(cache.delete_by_prefix(&report_cache_prefix("u1")).unwrap(), 0);
    }

    #[test]
    fn test_memory_cache_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a", "1", ttl).unwrap();
        cache.set("b", "2", ttl).unwrap();
        // Touch "a" so "b" becomes the eviction candidate
        cache.get("a").unwrap();
        cache.set("c", "3", ttl).unwrap();

        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("c").unwrap().is_some());
    }

    #[test]
    fn test_memory_cache_zero_capacity_uses_default() {
        let cache = MemoryCache::new(0);
        cache.set("k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_trait_object_forwarding() {
        let cache: Box<dyn ReportCache> = Box::new(MemoryCache::default());
        cache.set("k", "v", Duration::from_secs(60)).unwrap();
        let by_ref: &dyn ReportCache = &cache;
        assert_eq!(by_ref.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("report:abc:"), "report:abc:");
        assert_eq!(escape_glob("a*b?c[d]e\\"), "a\\*b\\?c\\[d\\]e\\\\");
    }
}
