//! SQLite-backed local store.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{LocalStore, StorageKey};

/// Schema for the key/value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Durable key/value store on SQLite.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open local store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fitsync").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

#[async_trait]
impl LocalStore for SqliteStore {
  async fn get_item(&self, key: StorageKey) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let value: Option<String> = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key.as_str()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))?;

    Ok(value)
  }

  async fn set_item(&self, key: StorageKey, value: String) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key.as_str(), value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_set_then_get_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("store.db")).unwrap();

    store
      .set_item(StorageKey::Profile, r#"[{"uid":"u1"}]"#.to_string())
      .await
      .unwrap();

    let value = store.get_item(StorageKey::Profile).await.unwrap();
    assert_eq!(value.as_deref(), Some(r#"[{"uid":"u1"}]"#));
  }

  #[tokio::test]
  async fn test_unwritten_key_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("store.db")).unwrap();

    assert_eq!(store.get_item(StorageKey::WeightLog).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_set_is_idempotent_and_replaces() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("store.db")).unwrap();

    store
      .set_item(StorageKey::WorkoutHistory, "[]".to_string())
      .await
      .unwrap();
    store
      .set_item(StorageKey::WorkoutHistory, r#"[{"id":"w1"}]"#.to_string())
      .await
      .unwrap();

    let value = store.get_item(StorageKey::WorkoutHistory).await.unwrap();
    assert_eq!(value.as_deref(), Some(r#"[{"id":"w1"}]"#));
  }

  #[tokio::test]
  async fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store
        .set_item(StorageKey::WorkoutPlans, r#"[{"id":"p1"}]"#.to_string())
        .await
        .unwrap();
    }

    let reopened = SqliteStore::open_at(&path).unwrap();
    let value = reopened.get_item(StorageKey::WorkoutPlans).await.unwrap();
    assert_eq!(value.as_deref(), Some(r#"[{"id":"p1"}]"#));
  }
}
