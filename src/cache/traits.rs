//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Source of wall-clock time for expiry checks.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A settable clock for simulating the passage of time.
///
/// Clones share the same instant, so a test can keep one handle and hand
/// another to the cache.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
  now: Arc<Mutex<DateTime<Utc>>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Arc::new(Mutex::new(start)),
    }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// A single cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  pub data: T,
  /// When the entry was stored
  pub timestamp: DateTime<Utc>,
  /// How long the entry stays valid after `timestamp`
  pub ttl: Duration,
  /// Table the entry's key was derived from
  pub table: String,
  /// Insertion counter, breaks timestamp ties during eviction
  pub sequence: u64,
}

impl<T> CacheEntry<T> {
  /// An entry is valid while strictly less than `ttl` has elapsed.
  pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
    now - self.timestamp < self.ttl
  }
}

/// Diagnostic snapshot of cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub size: usize,
  /// Derived keys of live entries, oldest insertion first
  pub entries: Vec<String>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from freshly fetched data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
  /// Fetched from the backing source on a miss
  Network,
  /// Served from a live cache entry
  Cache,
}
