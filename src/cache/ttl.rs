use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::clock::Clock;

struct Entry {
    data: Value,
    expires_at: DateTime<Utc>,
}

/// In-memory TTL map for shaped report payloads, keyed by
/// `site:kind:params`. Expiry is lazy: expired entries are treated as
/// absent on read and overwritten on the next write. No capacity bound;
/// the key space is sites x report kinds x parameter combinations, not
/// user-controlled growth.
pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::milliseconds(ttl_ms as i64),
            clock,
        }
    }

    /// Deterministic cache key. Callers always build parameters in the same
    /// order, so no canonical sort is needed.
    pub fn key(site_id: &str, kind: &str, params: &[(&str, &str)]) -> String {
        let mut key = format!("{site_id}:{kind}");
        for (k, v) in params {
            key.push_str(&format!(":{k}={v}"));
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().expect("cache poisoned");
        let entry = entries.get(key)?;
        if self.clock.now() < entry.expires_at {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    /// Return the entry even when it has expired. Used to degrade
    /// gracefully when the upstream rate-limits a recompute.
    pub fn get_stale(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().expect("cache poisoned");
        entries.get(key).map(|e| e.data.clone())
    }

    pub fn put(&self, key: String, data: Value) {
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.lock().expect("cache poisoned");
        entries.insert(key, Entry { data, expires_at });
    }

    /// Drop every entry belonging to the given site. Called on
    /// disconnect/reconnect/selector change so data from a previous
    /// connection is never served after reconfiguration.
    pub fn invalidate_site(&self, site_id: &str) {
        let prefix = format!("{site_id}:");
        let mut entries = self.entries.lock().expect("cache poisoned");
        entries.retain(|key, _| !key.starts_with(&prefix));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().expect("cache poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use serde_json::json;

    fn cache_with_clock() -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let cache = TtlCache::new(300_000, clock.clone());
        (cache, clock)
    }

    #[test]
    fn entry_survives_until_ttl_and_expires_after() {
        let (cache, clock) = cache_with_clock();
        let key = TtlCache::key("site-1", "analytics", &[("days", "28")]);
        cache.put(key.clone(), json!({"rows": []}));

        clock.advance(Duration::seconds(299));
        assert_eq!(cache.get(&key), Some(json!({"rows": []})));

        clock.advance(Duration::seconds(2));
        assert_eq!(cache.get(&key), None);
        // Stale reads still see the value for rate-limit degradation.
        assert_eq!(cache.get_stale(&key), Some(json!({"rows": []})));
    }

    #[test]
    fn site_invalidation_is_prefix_scoped() {
        let (cache, _clock) = cache_with_clock();
        cache.put(
            TtlCache::key("site-1", "analytics", &[]),
            json!({"rows": [1]}),
        );
        cache.put(
            TtlCache::key("site-1", "search-console", &[("days", "7")]),
            json!({"rows": [2]}),
        );
        cache.put(
            TtlCache::key("site-2", "analytics", &[]),
            json!({"rows": [3]}),
        );

        cache.invalidate_site("site-1");

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&TtlCache::key("site-2", "analytics", &[])),
            Some(json!({"rows": [3]}))
        );
        assert_eq!(cache.get(&TtlCache::key("site-1", "analytics", &[])), None);
    }

    #[test]
    fn overwrite_replaces_data_and_extends_ttl() {
        let (cache, clock) = cache_with_clock();
        let key = TtlCache::key("site-1", "ads", &[]);
        cache.put(key.clone(), json!(1));
        clock.advance(Duration::seconds(200));
        cache.put(key.clone(), json!(2));
        clock.advance(Duration::seconds(200));
        assert_eq!(cache.get(&key), Some(json!(2)));
    }
}
