//! Cache layer that orchestrates caching logic with data fetching.

use chrono::Duration;
use color_eyre::Result;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::key::QueryKey;
use super::store::{CacheConfig, QueryCache};
use super::traits::{CacheResult, CacheStats};

/// Cache layer that manages caching logic and fetching.
///
/// One instance is built per application and cloned into every consumer;
/// clones share the same store. The lock is only held for synchronous store
/// operations and never across an `.await`.
pub struct CacheLayer<T> {
  cache: Arc<Mutex<QueryCache<T>>>,
}

impl<T: Clone> CacheLayer<T> {
  pub fn new(config: CacheConfig) -> Self {
    Self::from_cache(QueryCache::new(config))
  }

  #[cfg(test)]
  pub fn with_clock(config: CacheConfig, clock: Arc<dyn super::traits::Clock>) -> Self {
    Self::from_cache(QueryCache::with_clock(config, clock))
  }

  fn from_cache(cache: QueryCache<T>) -> Self {
    Self {
      cache: Arc::new(Mutex::new(cache)),
    }
  }

  /// Store operations never leave it half-updated, so a poisoned lock is still usable.
  fn lock(&self) -> MutexGuard<'_, QueryCache<T>> {
    self.cache.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Fetch with cache-first strategy using the default TTL.
  pub async fn fetch<F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CacheResult<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    self.fetch_inner(key, None, fetcher).await
  }

  /// Fetch with cache-first strategy, storing a miss with `ttl`.
  pub async fn fetch_with_ttl<F, Fut>(
    &self,
    key: &QueryKey,
    ttl: Duration,
    fetcher: F,
  ) -> Result<CacheResult<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    self.fetch_inner(key, Some(ttl), fetcher).await
  }

  /// 1. Check cache - if live, return immediately
  /// 2. On a miss, fetch
  /// 3. Store a successful fetch; errors are returned and nothing is cached
  async fn fetch_inner<F, Fut>(
    &self,
    key: &QueryKey,
    ttl: Option<Duration>,
    fetcher: F,
  ) -> Result<CacheResult<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let cached = self.lock().get(key);
    if let Some(data) = cached {
      debug!(query = %key.description(), "cache hit");
      return Ok(CacheResult::from_cache(data));
    }

    debug!(query = %key.description(), "cache miss");
    let data = fetcher().await?;
    self.lock().set(key, data.clone(), ttl);

    Ok(CacheResult::from_network(data))
  }

  /// Run a write against `table` and invalidate its cached reads on success.
  pub async fn mutate<R, F, Fut>(&self, table: &str, op: F) -> Result<R>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
  {
    let result = op().await?;
    self.invalidate(table);
    Ok(result)
  }

  pub fn invalidate(&self, table: &str) -> usize {
    let removed = self.lock().invalidate(table);
    debug!(table, removed, "invalidated cached queries");
    removed
  }

  pub fn clear(&self) {
    self.lock().clear();
    debug!("cache cleared");
  }

  pub fn stats(&self) -> CacheStats {
    self.lock().stats()
  }
}

impl<T> Clone for CacheLayer<T> {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
    }
  }
}
