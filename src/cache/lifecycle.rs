//! Versioned shell partition: install, takeover, and garbage collection.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::net::{Network, Request};

use super::storage::CacheStorage;
use super::traits::RequestKey;

/// Prefix shared by every shell partition name.
pub const SHELL_PREFIX: &str = "static-";

/// Name of the shell partition for `version`.
pub fn shell_partition_name(version: &str) -> String {
  format!("{}{}", SHELL_PREFIX, version)
}

/// Outcome of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
  /// Shell partition now in use
  pub partition: String,
  /// Assets fetched into the partition (0 when it was already complete)
  pub installed: usize,
  /// Stale shell partitions that were removed
  pub removed: Vec<String>,
}

/// Owns creation and deletion of the shell partition.
pub struct ShellLifecycle<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  origin: Url,
  version: String,
  manifest: Vec<String>,
}

impl<S: CacheStorage, N: Network> ShellLifecycle<S, N> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    origin: Url,
    version: impl Into<String>,
    manifest: Vec<String>,
  ) -> Self {
    Self {
      storage,
      network,
      origin,
      version: version.into(),
      manifest,
    }
  }

  pub fn partition_name(&self) -> String {
    shell_partition_name(&self.version)
  }

  /// Install, then take over. Both must finish before any fetch is served.
  pub async fn activate(&self) -> Result<Activation> {
    let installed = self.install().await?;
    let removed = self.takeover()?;

    Ok(Activation {
      partition: self.partition_name(),
      installed,
      removed,
    })
  }

  /// Populate the shell partition with every manifest asset.
  ///
  /// All assets are fetched before anything is written, and the write is a
  /// single batch. A failed or non-2xx fetch aborts the install with nothing
  /// stored. A partition that already holds every asset is left as is.
  pub async fn install(&self) -> Result<usize> {
    let name = self.partition_name();

    let requests = self
      .manifest
      .iter()
      .map(|path| {
        self
          .origin
          .join(path)
          .map(Request::get)
          .map_err(|e| eyre!("Invalid manifest path '{}': {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let keys: Vec<RequestKey> = requests
      .iter()
      .map(|req| RequestKey::for_request(req, &self.origin))
      .collect();

    let existing = self.storage.keys(&name)?;
    if keys.iter().all(|k| existing.contains(k)) {
      debug!(partition = %name, "shell partition already installed");
      return Ok(0);
    }

    let responses = try_join_all(requests.iter().map(|req| async move {
      let res = self.network.fetch(req).await.map_err(|e| {
        warn!(url = %req.url, error = %e, "shell asset fetch failed");
        e
      })?;

      if !res.ok() {
        warn!(url = %req.url, status = res.status(), "shell asset fetch failed");
        return Err(eyre!(
          "Shell asset {} returned status {}",
          req.url,
          res.status()
        ));
      }

      Ok::<_, color_eyre::Report>(res)
    }))
    .await
    .map_err(|e| eyre!("Failed to install shell partition {}: {}", name, e))?;

    let count = responses.len();
    self
      .storage
      .put_all(&name, keys.into_iter().zip(responses).collect())?;

    info!(partition = %name, assets = count, "shell partition installed");
    Ok(count)
  }

  /// Delete every shell partition that does not belong to the current version.
  ///
  /// Partitions outside the shell naming scheme are never touched.
  pub fn takeover(&self) -> Result<Vec<String>> {
    let current = self.partition_name();
    let mut removed = Vec::new();

    for name in self.storage.partition_names()? {
      if name != current && name.starts_with(SHELL_PREFIX) {
        self.storage.delete_partition(&name)?;
        info!(partition = %name, "removed stale shell partition");
        removed.push(name);
      }
    }

    Ok(removed)
  }
}
