//! In-memory TTL store for query results.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use super::key::QueryKey;
use super::traits::{CacheEntry, CacheStats, Clock, SystemClock};

/// Sizing and expiry settings for a [`QueryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
  /// TTL used when `set` is called without one
  pub default_ttl: Duration,
  /// Maximum number of entries kept after a `set`
  pub max_size: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl: Duration::minutes(5),
      max_size: 50,
    }
  }
}

/// Synchronous memoization of query results keyed by [`QueryKey`].
///
/// Expired entries are purged lazily by `get`, `set` and `stats`; nothing
/// runs in the background. When a `set` pushes the cache past `max_size`,
/// entries are evicted in insertion order. Reads never change an entry's
/// eviction priority.
pub struct QueryCache<T> {
  entries: HashMap<String, CacheEntry<T>>,
  config: CacheConfig,
  clock: Arc<dyn Clock>,
  next_sequence: u64,
}

impl<T: Clone> QueryCache<T> {
  pub fn new(config: CacheConfig) -> Self {
    Self::with_clock(config, Arc::new(SystemClock))
  }

  pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: HashMap::new(),
      config,
      clock,
      next_sequence: 0,
    }
  }

  /// Return the cached payload for `key` if a live entry exists.
  ///
  /// A stale entry found here is removed.
  pub fn get(&mut self, key: &QueryKey) -> Option<T> {
    let cache_key = key.cache_key();
    let now = self.clock.now();

    match self.entries.get(&cache_key) {
      Some(entry) if entry.is_valid(now) => Some(entry.data.clone()),
      Some(_) => {
        self.entries.remove(&cache_key);
        None
      }
      None => None,
    }
  }

  /// Store `data` under `key`, replacing any previous entry.
  ///
  /// `ttl` falls back to the configured default.
  pub fn set(&mut self, key: &QueryKey, data: T, ttl: Option<Duration>) {
    let now = self.clock.now();
    let sequence = self.next_sequence;
    self.next_sequence += 1;

    self.entries.insert(
      key.cache_key(),
      CacheEntry {
        data,
        timestamp: now,
        ttl: ttl.unwrap_or(self.config.default_ttl),
        table: key.table.clone(),
        sequence,
      },
    );

    self.purge_expired();
    self.evict_overflow();
  }

  /// Remove every entry derived from `table`, whatever its limit or filters.
  ///
  /// Returns the number of entries removed.
  pub fn invalidate(&mut self, table: &str) -> usize {
    let before = self.entries.len();
    self.entries.retain(|_, entry| entry.table != table);
    before - self.entries.len()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  /// Snapshot occupancy after purging expired entries.
  pub fn stats(&mut self) -> CacheStats {
    self.purge_expired();

    let entries = self
      .insertion_order()
      .into_iter()
      .map(|(key, _)| key)
      .collect::<Vec<_>>();

    CacheStats {
      size: entries.len(),
      entries,
    }
  }

  /// Number of stored entries, expired or not.
  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn purge_expired(&mut self) {
    let now = self.clock.now();
    self.entries.retain(|_, entry| entry.is_valid(now));
  }

  fn evict_overflow(&mut self) {
    let overflow = self.entries.len().saturating_sub(self.config.max_size);
    if overflow == 0 {
      return;
    }

    for (key, _) in self.insertion_order().into_iter().take(overflow) {
      self.entries.remove(&key);
    }
  }

  /// Keys ordered by `(timestamp, sequence)`, oldest first.
  fn insertion_order(&self) -> Vec<(String, (chrono::DateTime<chrono::Utc>, u64))> {
    let mut order: Vec<_> = self
      .entries
      .iter()
      .map(|(key, entry)| (key.clone(), (entry.timestamp, entry.sequence)))
      .collect();
    order.sort_by_key(|(_, rank)| *rank);
    order
  }
}
