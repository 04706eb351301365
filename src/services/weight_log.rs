//! Body-weight log service.
//!
//! Entries are keyed by calendar date: logging twice on the same day
//! overwrites rather than duplicates, and the `change` field (delta from the
//! chronologically preceding entry) is computed once, at write time.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::api::{ApiError, ApiResult};
use crate::remote::user_collection;
use crate::store::StorageKey;
use crate::sync::SyncService;
use crate::types::{now_timestamp, WeightLogEntry};

fn weight_log_cache_key(user_id: &str) -> String {
  format!("weight-log:{}", user_id)
}

fn weight_log_collection(user_id: &str) -> String {
  user_collection(user_id, "weight-log")
}

/// Derived id: one record per calendar date.
fn date_record_id(date: &str) -> String {
  format!("wl-{}", date)
}

/// CRUD over the weight log.
#[derive(Clone)]
pub struct WeightLogService {
  service: Arc<SyncService>,
}

impl WeightLogService {
  pub fn new(service: Arc<SyncService>) -> Self {
    Self { service }
  }

  fn validate(entry: &WeightLogEntry) -> ApiResult<()> {
    if entry.user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }
    if entry.date.is_empty() {
      return Err(ApiError::missing_field("date"));
    }
    if NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").is_err() {
      return Err(ApiError::validation("date must be formatted YYYY-MM-DD"));
    }
    if !(entry.weight > 0.0 && entry.weight < 1000.0) {
      return Err(ApiError::validation("weight is out of range"));
    }
    Ok(())
  }

  /// Log a weight measurement. An entry for the same user and date is
  /// replaced, whatever id it carried, so the one-entry-per-date invariant
  /// holds at the write boundary.
  pub async fn log_weight(&self, entry: WeightLogEntry, online: bool) -> ApiResult<WeightLogEntry> {
    Self::validate(&entry)?;
    self.write_entry(entry, online).await
  }

  /// Update an entry by explicit id. Same-date replacement rules apply.
  pub async fn update_entry(&self, entry: WeightLogEntry, online: bool) -> ApiResult<WeightLogEntry> {
    if entry.id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }
    Self::validate(&entry)?;
    self.write_entry(entry, online).await
  }

  async fn write_entry(&self, mut entry: WeightLogEntry, online: bool) -> ApiResult<WeightLogEntry> {
    if entry.id.is_empty() {
      entry.id = date_record_id(&entry.date);
    }

    let now = now_timestamp();
    if entry.created_at.is_empty() {
      entry.created_at = now.clone();
    }
    entry.updated_at = now;

    let mut all: Vec<WeightLogEntry> = self.service.load_records(StorageKey::WeightLog).await;

    // Same user, same date, different id: superseded. Remember the ids so
    // the remote copies can be cleaned up too.
    let superseded: Vec<String> = all
      .iter()
      .filter(|e| e.user_id == entry.user_id && e.date == entry.date && e.id != entry.id)
      .map(|e| e.id.clone())
      .collect();
    all.retain(|e| !(e.user_id == entry.user_id && e.date == entry.date && e.id != entry.id));

    // Delta against the chronologically preceding entry. The entry being
    // overwritten has the same date, so it can never be its own baseline.
    entry.change = all
      .iter()
      .filter(|e| e.user_id == entry.user_id && e.date.as_str() < entry.date.as_str())
      .max_by(|a, b| a.date.cmp(&b.date))
      .map(|prev| entry.weight - prev.weight)
      .unwrap_or(0.0);

    match all
      .iter()
      .position(|e| e.user_id == entry.user_id && e.id == entry.id)
    {
      Some(idx) => all[idx] = entry.clone(),
      None => all.push(entry.clone()),
    }

    self.service.store_records(StorageKey::WeightLog, &all).await?;
    self
      .service
      .cache()
      .invalidate(&weight_log_cache_key(&entry.user_id));

    if self.service.remote_available(online) {
      let collection = weight_log_collection(&entry.user_id);
      for old_id in &superseded {
        self.service.push_delete(&collection, old_id).await;
      }
      match serde_json::to_value(&entry) {
        Ok(value) => self.service.push_document(&collection, &entry.id, &value).await,
        Err(e) => tracing::warn!(error = %e, "failed to serialize weight entry for remote push"),
      }
    }

    Ok(entry)
  }

  /// The user's full log, oldest first.
  pub async fn get_weight_log(&self, user_id: &str, online: bool) -> ApiResult<Vec<WeightLogEntry>> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }

    let service = self.service.clone();
    let collection = weight_log_collection(user_id);
    let mut entries = self
      .service
      .cached_read_list(
        &weight_log_cache_key(user_id),
        StorageKey::WeightLog,
        online,
        user_id,
        || async move { service.remote_get_collection(&collection, &[]).await },
      )
      .await?;

    entries.sort_by(|a: &WeightLogEntry, b| a.date.cmp(&b.date));
    Ok(entries)
  }

  /// Delete an entry locally, and remotely when online.
  pub async fn delete_entry(&self, user_id: &str, id: &str, online: bool) -> ApiResult<()> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }
    if id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }

    self
      .service
      .delete_record::<WeightLogEntry>(
        StorageKey::WeightLog,
        &[weight_log_cache_key(user_id)],
        online,
        &weight_log_collection(user_id),
        user_id,
        id,
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ErrorCode;
  use crate::cache::CacheManager;
  use crate::remote::{MockRemoteGateway, RetryPolicy};
  use crate::store::MemoryStore;

  fn setup() -> (WeightLogService, Arc<MockRemoteGateway>) {
    let remote = Arc::new(MockRemoteGateway::new());
    let service = Arc::new(SyncService::with_parts(
      Arc::new(CacheManager::new()),
      Arc::new(MemoryStore::new()),
      remote.clone(),
      RetryPolicy::new(1, std::time::Duration::ZERO),
      true,
    ));
    (WeightLogService::new(service), remote)
  }

  fn entry(user: &str, date: &str, weight: f64) -> WeightLogEntry {
    WeightLogEntry {
      user_id: user.to_string(),
      date: date.to_string(),
      weight,
      ..WeightLogEntry::default()
    }
  }

  #[tokio::test]
  async fn test_id_is_derived_from_date() {
    let (log, _remote) = setup();
    let saved = log.log_weight(entry("u1", "2024-01-01", 80.0), false).await.unwrap();
    assert_eq!(saved.id, "wl-2024-01-01");
  }

  #[tokio::test]
  async fn test_malformed_date_is_rejected() {
    let (log, _remote) = setup();
    let err = log
      .log_weight(entry("u1", "01/01/2024", 80.0), false)
      .await
      .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);
  }

  #[tokio::test]
  async fn test_same_day_logging_overwrites() {
    let (log, _remote) = setup();
    log.log_weight(entry("u1", "2023-12-25", 79.0), false).await.unwrap();
    log.log_weight(entry("u1", "2024-01-01", 80.0), false).await.unwrap();
    let second = log.log_weight(entry("u1", "2024-01-01", 81.0), false).await.unwrap();

    let entries = log.get_weight_log("u1", false).await.unwrap();
    let jan_first: Vec<_> = entries.iter().filter(|e| e.date == "2024-01-01").collect();
    assert_eq!(jan_first.len(), 1);
    assert_eq!(jan_first[0].weight, 81.0);
    // Delta is against Dec 25, not the overwritten 80.0 entry.
    assert_eq!(second.change, 2.0);
  }

  #[tokio::test]
  async fn test_explicit_id_for_same_date_still_replaces() {
    let (log, remote) = setup();
    log.log_weight(entry("u1", "2024-01-01", 80.0), true).await.unwrap();

    let mut explicit = entry("u1", "2024-01-01", 82.0);
    explicit.id = "custom-id".into();
    log.update_entry(explicit, true).await.unwrap();

    let entries = log.get_weight_log("u1", false).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "custom-id");
    // The superseded derived-id document was cleaned up remotely too.
    assert!(remote.document("users/u1/weight-log", "wl-2024-01-01").is_none());
    assert!(remote.document("users/u1/weight-log", "custom-id").is_some());
  }

  #[tokio::test]
  async fn test_change_tracks_preceding_entry() {
    let (log, _remote) = setup();
    let first = log.log_weight(entry("u1", "2024-01-01", 80.0), false).await.unwrap();
    let second = log.log_weight(entry("u1", "2024-01-08", 78.5), false).await.unwrap();

    assert_eq!(first.change, 0.0);
    assert!((second.change - (-1.5)).abs() < f64::EPSILON);
  }

  #[tokio::test]
  async fn test_entries_are_scoped_per_user() {
    let (log, _remote) = setup();
    log.log_weight(entry("u1", "2024-01-01", 80.0), false).await.unwrap();
    log.log_weight(entry("u2", "2024-01-01", 95.0), false).await.unwrap();

    let u1 = log.get_weight_log("u1", false).await.unwrap();
    assert_eq!(u1.len(), 1);
    assert_eq!(u1[0].weight, 80.0);
  }

  #[tokio::test]
  async fn test_online_log_pushes_to_remote() {
    let (log, remote) = setup();
    log.log_weight(entry("u1", "2024-01-01", 80.0), true).await.unwrap();

    let doc = remote
      .document("users/u1/weight-log", "wl-2024-01-01")
      .expect("entry pushed");
    assert_eq!(doc["weight"], 80.0);
  }

  #[tokio::test]
  async fn test_delete_entry() {
    let (log, _remote) = setup();
    let saved = log.log_weight(entry("u1", "2024-01-01", 80.0), false).await.unwrap();
    log.delete_entry("u1", &saved.id, false).await.unwrap();
    assert!(log.get_weight_log("u1", false).await.unwrap().is_empty());
  }
}
