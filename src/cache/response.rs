//! In-memory response cache with a fixed time-to-live.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::clock::{Clock, SystemClock};

/// A cached value and the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  pub cached_at: DateTime<Utc>,
}

/// Key/value cache whose entries expire `ttl` after they were stored.
///
/// Expired entries are removed lazily, on the first read past expiry. There is
/// no size bound; the key space is expected to stay small (one key per list
/// or lookup the dashboard shows).
pub struct ResponseCache<V> {
  entries: Mutex<HashMap<String, CacheEntry<V>>>,
  ttl: Duration,
  clock: Arc<dyn Clock>,
}

impl<V: Clone> ResponseCache<V> {
  /// Create a cache backed by the system clock.
  pub fn new(ttl: Duration) -> Self {
    Self::with_clock(ttl, Arc::new(SystemClock))
  }

  pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl,
      clock,
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store `value` under `key`, replacing any previous entry.
  pub fn set(&self, key: &str, value: V) {
    let entry = CacheEntry {
      value,
      cached_at: self.clock.now(),
    };
    self.entries().insert(key.to_string(), entry);
  }

  /// Return the value for `key` if it was stored less than `ttl` ago.
  ///
  /// An expired entry is deleted before the miss is reported.
  pub fn get(&self, key: &str) -> Option<V> {
    let now = self.clock.now();
    let mut entries = self.entries();

    match entries.get(key) {
      Some(entry) if now - entry.cached_at < self.ttl => Some(entry.value.clone()),
      Some(_) => {
        entries.remove(key);
        None
      }
      None => None,
    }
  }

  /// Remove every key containing `pattern`, or everything when `pattern` is `None`.
  ///
  /// Returns the number of entries removed.
  pub fn invalidate(&self, pattern: Option<&str>) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    match pattern {
      Some(p) => entries.retain(|key, _| !key.contains(p)),
      None => entries.clear(),
    }
    before - entries.len()
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries().len()
  }

  #[cfg(test)]
  pub fn contains_key(&self, key: &str) -> bool {
    self.entries().contains_key(key)
  }
}
