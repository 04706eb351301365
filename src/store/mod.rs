//! Durable local key/value storage.
//!
//! The local store is the source of truth on the device. It holds one JSON
//! array per entity kind under a fixed, enumerable key set; each array
//! contains every user's records and is filtered by user id at read time.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

/// The complete set of local storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
  Profile,
  WeightLog,
  WorkoutHistory,
  WorkoutPlans,
  CacheMetadata,
}

impl StorageKey {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Profile => "profile",
      Self::WeightLog => "weight-log",
      Self::WorkoutHistory => "workout-history",
      Self::WorkoutPlans => "workout-plans",
      Self::CacheMetadata => "cache-metadata",
    }
  }
}

impl std::fmt::Display for StorageKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Bookkeeping for the periodic cache sweep. Lives under
/// [`StorageKey::CacheMetadata`] and is read by nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
  #[serde(default)]
  pub last_sweep_at: Option<String>,
  #[serde(default)]
  pub swept_entries: u64,
}

/// Trait for durable key/value storage backends.
///
/// Both operations are idempotent. Values are serialized JSON and must
/// round-trip structurally identical data.
#[async_trait]
pub trait LocalStore: Send + Sync {
  /// Read the raw value for a key, `None` if never written.
  async fn get_item(&self, key: StorageKey) -> Result<Option<String>>;

  /// Write the raw value for a key, replacing any existing value.
  async fn set_item(&self, key: StorageKey, value: String) -> Result<()>;
}
