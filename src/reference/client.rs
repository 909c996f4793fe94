//! Cached reference client that wraps SqliteSource with transparent caching.

use chrono::Duration;
use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheConfig, CacheLayer, CacheSource, CacheStats, QueryKey};

use super::source::SqliteSource;
use super::types::Row;

/// Reference-data client with transparent caching support.
///
/// Reads go through the cache; writes go straight to the source and then
/// drop every cached read of the written table.
#[derive(Clone)]
pub struct ReferenceClient {
  inner: Arc<SqliteSource>,
  cache: CacheLayer<Vec<Row>>,
}

impl ReferenceClient {
  pub fn new(source: SqliteSource, cache_config: CacheConfig) -> Self {
    Self::with_cache(source, CacheLayer::new(cache_config))
  }

  pub fn with_cache(source: SqliteSource, cache: CacheLayer<Vec<Row>>) -> Self {
    Self {
      inner: Arc::new(source),
      cache,
    }
  }

  /// Read rows for `key`, from cache when a live entry exists.
  pub async fn rows(&self, key: &QueryKey) -> Result<ReferenceRows> {
    self.read(key, None).await
  }

  /// Like [`rows`](Self::rows), but a fresh read is cached for `ttl`
  /// instead of the configured default.
  pub async fn rows_with_ttl(&self, key: &QueryKey, ttl: Duration) -> Result<ReferenceRows> {
    self.read(key, Some(ttl)).await
  }

  async fn read(&self, key: &QueryKey, ttl: Option<Duration>) -> Result<ReferenceRows> {
    let fetcher = || {
      let inner = Arc::clone(&self.inner);
      let key = key.clone();
      async move { inner.fetch_rows(&key) }
    };

    let result = match ttl {
      Some(ttl) => self.cache.fetch_with_ttl(key, ttl, fetcher).await?,
      None => self.cache.fetch(key, fetcher).await?,
    };

    Ok(ReferenceRows {
      rows: result.data,
      source: result.source,
    })
  }

  /// Insert a row (not cached - write operation).
  pub async fn insert(&self, table: &str, row: &Row) -> Result<i64> {
    self
      .cache
      .mutate(table, || {
        let inner = Arc::clone(&self.inner);
        async move { inner.insert_row(table, row) }
      })
      .await
  }

  /// Drop cached reads of `table`.
  pub fn invalidate(&self, table: &str) -> usize {
    self.cache.invalidate(table)
  }

  /// Drop everything, as on logout.
  pub fn logout(&self) {
    self.cache.clear();
  }

  pub fn stats(&self) -> CacheStats {
    self.cache.stats()
  }

  pub fn seed(&self) -> Result<bool> {
    self.inner.seed()
  }
}

/// Rows returned by [`ReferenceClient::rows`] and where they came from.
#[derive(Debug, Clone)]
pub struct ReferenceRows {
  pub rows: Vec<Row>,
  pub source: CacheSource,
}
