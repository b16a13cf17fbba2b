//! TTL query cache
//!
//! One [`QueryCache`] per query type. Keys are `"{op_code}:{canonical-json}"`
//! where the JSON is the validated query with object keys sorted at every
//! level, so two structurally equal queries always share a key.
//!
//! Entries are evicted on TTL expiry (checked on read), on capacity pressure
//! (least recently inserted first; reads do not refresh recency) or on
//! [`QueryCache::clear`].

use super::models::QueryOperation;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

/// Cache settings shared by the four per-operation caches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    /// Entries kept per cache; 0 disables caching like `enabled = false`
    pub max_size: usize,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_size: DEFAULT_CACHE_MAX_SIZE,
            enabled: true,
        }
    }
}

/// Read-only snapshot of a cache's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    /// `hits / (hits + misses)`, 0 when nothing was looked up yet
    pub hit_rate: f64,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct QueryCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size);
        if config.enabled && capacity.is_none() {
            tracing::warn!("Query cache max_size is 0, caching disabled");
        }
        Self {
            entries: Mutex::new(LruCache::new(capacity.unwrap_or(NonZeroUsize::MIN))),
            ttl: Duration::from_millis(config.ttl_ms),
            enabled: config.enabled && capacity.is_some(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh value for `key`, if any. Expired entries are dropped here.
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let mut entries = self.lock();
        let fresh = match entries.peek(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: String, value: V) {
        if !self.enabled {
            return;
        }
        let mut entries = self.lock();
        // Re-inserting must count as a new insertion for eviction order
        entries.pop(&key);
        entries.push(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

// ============================================================================
// Key derivation
// ============================================================================

/// Cache key for a validated query: op code, `:`, canonical JSON.
pub fn generate_key<Q: Serialize>(operation: QueryOperation, query: &Q) -> String {
    let value = serde_json::to_value(query).unwrap_or(serde_json::Value::Null);
    let mut key = String::with_capacity(64);
    key.push_str(operation.code());
    key.push(':');
    write_canonical(&value, &mut key);
    key
}

/// Compact JSON with object keys sorted at every level.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(ttl_ms: u64, max_size: usize) -> QueryCache<String> {
        QueryCache::new(&CacheConfig {
            ttl_ms,
            max_size,
            enabled: true,
        })
    }

    #[test]
    fn test_key_is_independent_of_field_order() {
        let a = json!({"entity": {"type": "file", "identifier": "src/a.ts"}, "depth": 2});
        let b = json!({"depth": 2, "entity": {"identifier": "src/a.ts", "type": "file"}});
        assert_eq!(
            generate_key(QueryOperation::Dependencies, &a),
            generate_key(QueryOperation::Dependencies, &b)
        );
    }

    #[test]
    fn test_key_is_prefixed_by_operation() {
        let q = json!({"depth": 1});
        let dep = generate_key(QueryOperation::Dependencies, &q);
        let dnt = generate_key(QueryOperation::Dependents, &q);
        assert_ne!(dep, dnt);
        assert_eq!(dep, r#"dep:{"depth":1}"#);
        assert!(dnt.starts_with("dnt:"));
    }

    #[test]
    fn test_canonical_json_escapes_keys_and_keeps_array_order() {
        let q = json!({"b\"": [3, 1, 2], "a": null});
        assert_eq!(
            generate_key(QueryOperation::Path, &q),
            r#"path:{"a":null,"b\"":[3,1,2]}"#
        );
    }

    #[test]
    fn test_hit_miss_counters() {
        let c = cache(60_000, 10);
        assert_eq!(c.get("k"), None);
        c.set("k".into(), "v".into());
        assert_eq!(c.get("k").as_deref(), Some("v"));
        assert_eq!(c.get("k").as_deref(), Some("v"));

        let stats = c.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let c = cache(60_000, 2);
        c.set("a".into(), "1".into());
        c.set("b".into(), "2".into());
        // Reads do not refresh insertion order
        assert!(c.get("a").is_some());
        c.set("c".into(), "3".into());

        assert_eq!(c.get("a"), None);
        assert!(c.get("b").is_some());
        assert!(c.get("c").is_some());
        assert_eq!(c.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_removed_on_read() {
        let c = cache(30, 10);
        c.set("k".into(), "v".into());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(c.get("k"), None);
        assert!(c.is_empty());
    }

    #[test]
    fn test_clear_keeps_counters() {
        let c = cache(60_000, 10);
        c.set("k".into(), "v".into());
        assert!(c.get("k").is_some());
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.stats().hits, 1);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let c: QueryCache<String> = QueryCache::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        });
        c.set("k".into(), "v".into());
        assert_eq!(c.get("k"), None);
        assert_eq!(c.stats().misses, 1);
        assert_eq!(c.stats().size, 0);
    }

    #[test]
    fn test_zero_max_size_disables_cache() {
        let c = cache(60_000, 0);
        c.set("k".into(), "v".into());
        assert_eq!(c.get("k"), None);
        assert_eq!(c.stats().misses, 1);
        assert_eq!(c.stats().size, 0);
    }
}
