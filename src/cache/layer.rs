//! Cache layer that orchestrates caching strategies with network fetching.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::net::{Network, Request, Response};

use super::storage::CacheStorage;
use super::traits::{CacheResult, RequestKey};

/// Applies caching strategies on top of a storage backend and a network.
///
/// Strategies read and write the partition they are given but never delete
/// a partition.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  /// Requests to this origin are keyed origin-relative
  origin: Url,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  /// Create a new cache layer with the given storage backend and network.
  pub fn new(storage: Arc<S>, network: Arc<N>, origin: Url) -> Self {
    Self {
      storage,
      network,
      origin,
    }
  }

  pub fn key_for(&self, request: &Request) -> RequestKey {
    RequestKey::for_request(request, &self.origin)
  }

  /// Cache first, network fallback.
  ///
  /// 1. Check the partition - on a hit, return it without touching the network
  /// 2. On a miss, fetch from network; transport errors go to the caller
  /// 3. Store a copy of a successful response and return the original
  pub async fn cache_first(
    &self,
    request: &Request,
    partition: &str,
  ) -> Result<CacheResult<Response>> {
    let key = self.key_for(request);

    if let Some(cached) = self.storage.get(partition, &key)? {
      debug!(key = %key, partition, "cache hit");
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    debug!(key = %key, partition, "cache miss");
    let res = self.network.fetch(request).await?;

    if res.ok() {
      self.store(partition, &key, &res);
    }

    Ok(CacheResult::from_network(res))
  }

  /// Network first, cache fallback.
  ///
  /// A successful (2xx) response refreshes the cache. A transport error or a
  /// failure status falls back to the stored copy, which may not exist: that
  /// case is `Ok(None)`, not an error.
  pub async fn network_first(
    &self,
    request: &Request,
    partition: &str,
  ) -> Result<Option<CacheResult<Response>>> {
    let key = self.key_for(request);

    match self.network.fetch(request).await {
      Ok(res) if res.ok() => {
        self.store(partition, &key, &res);
        return Ok(Some(CacheResult::from_network(res)));
      }
      Ok(res) => {
        warn!(key = %key, status = res.status(), "network returned failure status, using cache");
      }
      Err(e) => {
        warn!(key = %key, error = %e, "network fetch failed, using cache");
      }
    }

    let cached = self
      .storage
      .get(partition, &key)?
      .map(|entry| CacheResult::offline(entry.response, entry.cached_at));

    if cached.is_none() {
      debug!(key = %key, partition, "no cached fallback");
    }

    Ok(cached)
  }

  /// Store a duplicate of `res`. A failed write is logged; the caller still
  /// gets its response.
  fn store(&self, partition: &str, key: &RequestKey, res: &Response) {
    if let Err(e) = self.storage.put(partition, key, res.duplicate()) {
      warn!(key = %key, partition, error = %e, "failed to update cache");
    }
  }
}

impl<S: CacheStorage, N: Network> Clone for CacheLayer<S, N> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
      origin: self.origin.clone(),
    }
  }
}
