//! In-process TTL cache for entity projections.
//!
//! Entries are disposable: every value cached here is a projection of durable
//! data and can be dropped and rebuilt at any time. There is no LRU or size
//! bound; expiry is the only thing keeping the map small, so keys must come
//! from a bounded set (entity kind + user id).

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::clock::{Clock, SystemClock};

/// How often expired entries are swept out, regardless of access.
pub const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// A cached value with its expiry bookkeeping. Never leaves this module.
struct CacheEntry {
  data: Value,
  #[allow(dead_code)]
  stored_at: DateTime<Utc>,
  expires_at: DateTime<Utc>,
}

/// TTL-based key/value cache with an injectable clock.
pub struct CacheManager {
  entries: Mutex<HashMap<String, CacheEntry>>,
  default_ttl: Duration,
  clock: Arc<dyn Clock>,
}

impl CacheManager {
  /// Create a cache with the wall clock and the default 30 minute TTL.
  pub fn new() -> Self {
    Self::with_clock(Arc::new(SystemClock))
  }

  /// Create a cache with an explicit time source.
  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      default_ttl: Duration::minutes(30),
      clock,
    }
  }

  /// Override the default TTL.
  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  /// Store a value, unconditionally replacing any existing entry.
  pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
    let data = match serde_json::to_value(value) {
      Ok(v) => v,
      Err(e) => {
        // A value we cannot serialize is a value we cannot cache.
        warn!(key, error = %e, "failed to serialize value for cache");
        return;
      }
    };

    let now = self.clock.now();
    let entry = CacheEntry {
      data,
      stored_at: now,
      expires_at: now + ttl.unwrap_or(self.default_ttl),
    };

    let mut entries = self.entries.lock().expect("cache lock poisoned");
    entries.insert(key.to_string(), entry);
  }

  /// Look up a value. Expired entries are evicted and reported as misses.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let mut entries = self.entries.lock().expect("cache lock poisoned");

    let expired = match entries.get(key) {
      Some(entry) => self.clock.now() > entry.expires_at,
      None => return None,
    };

    if expired {
      entries.remove(key);
      return None;
    }

    let entry = entries.get(key)?;
    match serde_json::from_value(entry.data.clone()) {
      Ok(value) => Some(value),
      Err(e) => {
        // Entry was written for a different shape; drop it.
        warn!(key, error = %e, "cached value failed to deserialize, evicting");
        entries.remove(key);
        None
      }
    }
  }

  /// Drop a single entry.
  pub fn invalidate(&self, key: &str) {
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    entries.remove(key);
  }

  /// Drop everything.
  pub fn invalidate_all(&self) {
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    entries.clear();
  }

  /// Remove all expired entries, returning how many were dropped.
  ///
  /// Runs on a fixed interval (see [`SWEEP_INTERVAL`]) from the maintenance
  /// task so that keys which are never read again still get evicted.
  pub fn sweep(&self) -> usize {
    let now = self.clock.now();
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    let before = entries.len();
    entries.retain(|_, entry| now <= entry.expires_at);
    before - entries.len()
  }

  /// Number of live entries, expired or not.
  pub fn len(&self) -> usize {
    self.entries.lock().expect("cache lock poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for CacheManager {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::clock::ManualClock;

  fn manual_cache() -> (CacheManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = CacheManager::with_clock(clock.clone());
    (cache, clock)
  }

  #[test]
  fn test_put_then_get_returns_value() {
    let (cache, _clock) = manual_cache();
    cache.put("k", &vec![1, 2, 3], None);
    let got: Option<Vec<i32>> = cache.get("k");
    assert_eq!(got, Some(vec![1, 2, 3]));
  }

  #[test]
  fn test_get_after_ttl_expiry_returns_none_and_evicts() {
    let (cache, clock) = manual_cache();
    cache.put("k", &"v", Some(Duration::minutes(10)));

    clock.advance(Duration::minutes(11));
    let got: Option<String> = cache.get("k");
    assert_eq!(got, None);
    assert!(cache.is_empty());
  }

  #[test]
  fn test_get_at_exact_expiry_still_hits() {
    let (cache, clock) = manual_cache();
    cache.put("k", &"v", Some(Duration::minutes(10)));

    // Expiry is strict: only now > expires_at misses.
    clock.advance(Duration::minutes(10));
    let got: Option<String> = cache.get("k");
    assert_eq!(got, Some("v".to_string()));
  }

  #[test]
  fn test_put_overwrites_unconditionally() {
    let (cache, _clock) = manual_cache();
    cache.put("k", &"old", None);
    cache.put("k", &"new", None);
    let got: Option<String> = cache.get("k");
    assert_eq!(got, Some("new".to_string()));
  }

  #[test]
  fn test_invalidate_removes_single_key() {
    let (cache, _clock) = manual_cache();
    cache.put("a", &1, None);
    cache.put("b", &2, None);
    cache.invalidate("a");
    assert_eq!(cache.get::<i32>("a"), None);
    assert_eq!(cache.get::<i32>("b"), Some(2));
  }

  #[test]
  fn test_invalidate_all_clears_everything() {
    let (cache, _clock) = manual_cache();
    cache.put("a", &1, None);
    cache.put("b", &2, None);
    cache.invalidate_all();
    assert!(cache.is_empty());
  }

  #[test]
  fn test_sweep_removes_only_expired_entries() {
    let (cache, clock) = manual_cache();
    cache.put("short", &1, Some(Duration::minutes(1)));
    cache.put("long", &2, Some(Duration::minutes(60)));

    clock.advance(Duration::minutes(5));
    let swept = cache.sweep();
    assert_eq!(swept, 1);
    assert_eq!(cache.get::<i32>("short"), None);
    assert_eq!(cache.get::<i32>("long"), Some(2));
  }

  #[test]
  fn test_default_ttl_applies_when_none_given() {
    let (cache, clock) = manual_cache();
    cache.put("k", &"v", None);

    clock.advance(Duration::minutes(29));
    assert_eq!(cache.get::<String>("k"), Some("v".to_string()));

    clock.advance(Duration::minutes(2));
    assert_eq!(cache.get::<String>("k"), None);
  }

  #[test]
  fn test_mismatched_shape_is_evicted() {
    let (cache, _clock) = manual_cache();
    cache.put("k", &"not a number", None);
    assert_eq!(cache.get::<Vec<i32>>("k"), None);
    assert!(cache.is_empty());
  }
}
