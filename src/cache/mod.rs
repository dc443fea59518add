//! Partitioned response cache for offline support.
//!
//! This module provides:
//! - A partitioned storage backend keyed by request identity
//! - Cache-first and network-first strategies over that storage
//! - The versioned shell partition lifecycle (install, takeover)
//! - Allow-list pruning of the media partition

mod cleaner;
mod layer;
mod lifecycle;
mod storage;
mod traits;

pub use cleaner::{prune_partition, MEDIA_PARTITION};
pub use layer::CacheLayer;
pub use lifecycle::{Activation, ShellLifecycle};
pub use storage::{body_digest, CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, RequestKey};
