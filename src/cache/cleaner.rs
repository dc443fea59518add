//! Allow-list pruning of the media partition.

use color_eyre::Result;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

use super::storage::CacheStorage;

/// Partition holding externally fetched media.
pub const MEDIA_PARTITION: &str = "giphy";

/// Delete every entry of `partition` whose URL is not in `allow_list`.
///
/// Allowed entries are left untouched. Returns the number of entries removed.
pub fn prune_partition<S: CacheStorage>(
  storage: &S,
  partition: &str,
  allow_list: &[String],
) -> Result<usize> {
  // Compare in the same normalized form the keys were stored in
  let allowed: HashSet<String> = allow_list
    .iter()
    .map(|raw| match Url::parse(raw) {
      Ok(mut url) => {
        url.set_fragment(None);
        url.to_string()
      }
      Err(_) => raw.clone(),
    })
    .collect();

  // A missing partition lists no keys; nothing here creates one
  let mut removed = 0;

  for key in storage.keys(partition)? {
    if !allowed.contains(&key.url) {
      debug!(key = %key, "pruning cached media");
      if storage.delete(partition, &key)? {
        removed += 1;
      }
    }
  }

  info!(partition, removed, allowed = allowed.len(), "media cache pruned");
  Ok(removed)
}
