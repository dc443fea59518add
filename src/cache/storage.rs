//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::net::Response;

use super::traits::RequestKey;

/// A single stored response.
#[derive(Debug)]
pub struct CachedEntry {
  /// The stored response, ready to be handed out
  pub response: Response,
  /// Hex SHA-256 of the body
  pub digest: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Storage is split into named partitions. Reading from or deleting in a
/// partition that does not exist is a miss, and writing to one creates it.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open_partition(&self, name: &str) -> Result<()>;

  /// Names of all existing partitions.
  fn partition_names(&self) -> Result<Vec<String>>;

  /// Drop a partition and all of its entries. Returns false if it did not exist.
  fn delete_partition(&self, name: &str) -> Result<bool>;

  /// Get an entry by request identity.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a response, replacing any previous entry for the same identity.
  fn put(&self, partition: &str, key: &RequestKey, response: Response) -> Result<()>;

  /// Store several responses at once. Either all of them land or none do.
  fn put_all(&self, partition: &str, entries: Vec<(RequestKey, Response)>) -> Result<()> {
    for (key, response) in entries {
      self.put(partition, &key, response)?;
    }
    Ok(())
  }

  /// Remove one entry. Returns false if there was nothing to remove.
  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool>;

  /// Identities stored in a partition, oldest write first.
  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn open_partition(&self, _name: &str) -> Result<()> {
    Ok(())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_partition(&self, _name: &str) -> Result<bool> {
    Ok(false)
  }

  fn get(&self, _partition: &str, _key: &RequestKey) -> Result<Option<CachedEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, _partition: &str, _key: &RequestKey, _response: Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _partition: &str, _key: &RequestKey) -> Result<bool> {
    Ok(false)
  }

  fn keys(&self, _partition: &str) -> Result<Vec<RequestKey>> {
    Ok(Vec::new())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives only as long as the storage.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellproxy").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by partition and request identity
CREATE TABLE IF NOT EXISTS entries (
    partition_name TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    digest TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition_name, method, url)
);

CREATE INDEX IF NOT EXISTS idx_entries_partition ON entries(partition_name);
"#;

/// Insert one entry on an already locked connection.
fn insert_entry(
  conn: &Connection,
  partition: &str,
  key: &RequestKey,
  response: Response,
) -> Result<()> {
  let (status, headers, body) = response.into_parts();
  let digest = body_digest(&body);
  let headers =
    serde_json::to_string(&headers).map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to create partition {}: {}", partition, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (partition_name, method, url, status, headers, body, digest, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![partition, key.method, key.url, status, headers, body, digest],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", key, partition, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, name: &str) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open partition {}: {}", name, e))?;
    Ok(())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn delete_partition(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let deleted = conn
      .execute("DELETE FROM entries WHERE partition_name = ?", params![name])
      .and_then(|_| conn.execute("DELETE FROM partitions WHERE name = ?", params![name]));

    match deleted {
      Ok(rows) => {
        conn
          .execute("COMMIT", [])
          .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
        Ok(rows > 0)
      }
      Err(e) => {
        let _ = conn.execute("ROLLBACK", []);
        Err(eyre!("Failed to delete partition {}: {}", name, e))
      }
    }
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT status, headers, body, digest, cached_at FROM entries
         WHERE partition_name = ? AND method = ? AND url = ?",
        params![partition, key.method, key.url],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {} from {}: {}", key, partition, e))?;

    match row {
      Some((status, headers, body, digest, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntry {
          response: Response::new(status, headers, body),
          digest,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, key: &RequestKey, response: Response) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, partition, key, response)
  }

  fn put_all(&self, partition: &str, entries: Vec<(RequestKey, Response)>) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      if let Err(e) = insert_entry(&conn, partition, &key, response) {
        let _ = conn.execute("ROLLBACK", []);
        return Err(e);
      }
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let rows = self
      .lock()?
      .execute(
        "DELETE FROM entries WHERE partition_name = ? AND method = ? AND url = ?",
        params![partition, key.method, key.url],
      )
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", key, partition, e))?;

    Ok(rows > 0)
  }

  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT method, url FROM entries WHERE partition_name = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![partition], |row| {
        Ok(RequestKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", partition, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}

/// Hex-encoded SHA-256 of a response body.
pub fn body_digest(body: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body);
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(url: &str) -> RequestKey {
    RequestKey::new("GET", url)
  }

  fn response(body: &str) -> Response {
    Response::new(
      200,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  #[test]
  fn test_missing_partition_is_a_miss() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage.get("nope", &key("/a")).unwrap().is_none());
    assert!(storage.keys("nope").unwrap().is_empty());
    assert!(storage.partition_names().unwrap().is_empty());
  }

  #[test]
  fn test_put_then_get() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("giphy", &key("/a"), response("alpha")).unwrap();

    let entry = storage.get("giphy", &key("/a")).unwrap().unwrap();
    assert_eq!(entry.response.status(), 200);
    assert_eq!(entry.response.header("Content-Type"), Some("text/plain"));
    assert_eq!(entry.digest, body_digest(b"alpha"));
    assert_eq!(entry.response.into_body(), b"alpha");
    assert_eq!(storage.partition_names().unwrap(), vec!["giphy"]);
  }

  #[test]
  fn test_put_overwrites_same_identity() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("giphy", &key("/a"), response("old")).unwrap();
    storage.put("giphy", &key("/a"), response("new")).unwrap();

    assert_eq!(storage.keys("giphy").unwrap().len(), 1);
    let entry = storage.get("giphy", &key("/a")).unwrap().unwrap();
    assert_eq!(entry.response.into_body(), b"new");
  }

  #[test]
  fn test_partitions_are_isolated() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("static-1.0", &key("/a"), response("shell")).unwrap();

    assert!(storage.get("giphy", &key("/a")).unwrap().is_none());
    assert_eq!(storage.keys("static-1.0").unwrap(), vec![key("/a")]);
  }

  #[test]
  fn test_open_creates_empty_partition() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_partition("giphy").unwrap();
    storage.open_partition("giphy").unwrap();

    assert!(storage.keys("giphy").unwrap().is_empty());
    assert_eq!(storage.partition_names().unwrap(), vec!["giphy"]);
  }

  #[test]
  fn test_delete_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("giphy", &key("/a"), response("a")).unwrap();
    storage.put("giphy", &key("/b"), response("b")).unwrap();

    assert!(storage.delete("giphy", &key("/a")).unwrap());
    assert!(!storage.delete("giphy", &key("/a")).unwrap());
    assert_eq!(storage.keys("giphy").unwrap(), vec![key("/b")]);
  }

  #[test]
  fn test_delete_from_missing_partition_creates_nothing() {
    let storage = SqliteStorage::open_in_memory().unwrap();

    assert!(!storage.delete("giphy", &key("/a")).unwrap());
    assert!(storage.partition_names().unwrap().is_empty());
  }

  #[test]
  fn test_delete_partition_drops_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("static-1.0", &key("/a"), response("a")).unwrap();
    storage.put("giphy", &key("/a"), response("a")).unwrap();

    assert!(storage.delete_partition("static-1.0").unwrap());
    assert!(!storage.delete_partition("static-1.0").unwrap());

    assert_eq!(storage.partition_names().unwrap(), vec!["giphy"]);
    assert!(storage.get("static-1.0", &key("/a")).unwrap().is_none());
    assert!(storage.get("giphy", &key("/a")).unwrap().is_some());
  }

  #[test]
  fn test_put_all_stores_every_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put_all(
        "static-1.1",
        vec![(key("/index.html"), response("i")), (key("/app.js"), response("j"))],
      )
      .unwrap();

    assert_eq!(
      storage.keys("static-1.1").unwrap(),
      vec![key("/index.html"), key("/app.js")]
    );
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.put("giphy", &key("/a"), response("a")).unwrap();
    assert!(storage.get("giphy", &key("/a")).unwrap().is_none());
    assert!(storage.partition_names().unwrap().is_empty());
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
