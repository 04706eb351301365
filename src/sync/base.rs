//! Base synchronization service.
//!
//! Composes the cache manager, local store, remote gateway and retry
//! executor into the canonical read and write paths every entity service
//! builds on:
//!
//! - reads go cache → remote-if-online → local-fallback → cache-fill and
//!   never fail due to connectivity
//! - writes validate, persist locally first, then attempt the remote write
//!   best-effort; a write is never lost for lack of connectivity

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ApiError, ApiResult};
use crate::cache::{CacheManager, SWEEP_INTERVAL};
use crate::remote::{with_retry, Filter, RemoteError, RemoteGateway, RetryPolicy};
use crate::store::{CacheMetadata, LocalStore, StorageKey};
use crate::sync::merge::{merge_data, merge_with_policy, MergePolicy};
use crate::sync::sanitize::{normalize_timestamps, sanitize_into};
use crate::types::{now_timestamp, parse_timestamp, SyncRecord};

/// Outcome of a full-collection reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Local-only records pushed to the remote store.
  pub pushed: usize,
  /// Remote-only records pulled into the local store.
  pub pulled: usize,
  /// Records where the remote copy was newer and replaced the local one.
  pub updated_local: usize,
  /// Records where the local copy was newer and was pushed.
  pub updated_remote: usize,
  /// Pushes that failed after retries (left for a later pass).
  pub push_failures: usize,
  /// True when the pass did nothing because the remote was unavailable.
  pub remote_unavailable: bool,
}

/// Shared plumbing for all entity services.
pub struct SyncService {
  cache: Arc<CacheManager>,
  store: Arc<dyn LocalStore>,
  remote: Arc<dyn RemoteGateway>,
  retry: RetryPolicy,
  remote_reachable: AtomicBool,
}

impl SyncService {
  /// Wire up the service and establish remote reachability with a probe.
  pub async fn connect(
    cache: Arc<CacheManager>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    retry: RetryPolicy,
  ) -> Self {
    let reachable = remote.probe().await;
    if !reachable {
      warn!("remote store unreachable, starting in local-only mode");
    }
    Self {
      cache,
      store,
      remote,
      retry,
      remote_reachable: AtomicBool::new(reachable),
    }
  }

  /// Construct without probing. Used by tests.
  pub fn with_parts(
    cache: Arc<CacheManager>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    retry: RetryPolicy,
    remote_reachable: bool,
  ) -> Self {
    Self {
      cache,
      store,
      remote,
      retry,
      remote_reachable: AtomicBool::new(remote_reachable),
    }
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  /// Whether a remote round-trip may be attempted: the caller must report
  /// being online and the construction-time probe must have succeeded.
  pub fn remote_available(&self, online: bool) -> bool {
    online && self.remote_reachable.load(Ordering::SeqCst)
  }

  // ==========================================================================
  // Local store primitives
  // ==========================================================================

  /// Load all records under a storage key. A read failure or corrupt payload
  /// degrades to "no data"; it never fails the calling operation.
  pub async fn load_records<T: DeserializeOwned>(&self, key: StorageKey) -> Vec<T> {
    match self.store.get_item(key).await {
      Ok(Some(raw)) => match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(e) => {
          warn!(key = %key, error = %e, "local payload corrupt, treating as empty");
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(key = %key, error = %e, "local read failed, treating as empty");
        Vec::new()
      }
    }
  }

  /// Persist all records under a storage key. A failure here is fatal for
  /// the calling write: durability is the one guarantee the write path makes.
  pub async fn store_records<T: Serialize>(&self, key: StorageKey, records: &[T]) -> ApiResult<()> {
    let raw = serde_json::to_string(records)
      .map_err(|e| ApiError::operation_failed(format!("failed to serialize {}: {}", key, e)))?;

    self
      .store
      .set_item(key, raw)
      .await
      .map_err(|e| ApiError::operation_failed(format!("local write to {} failed: {}", key, e)))
  }

  /// Persist on a read path, where failure only costs the merged copy.
  async fn store_records_best_effort<T: Serialize>(&self, key: StorageKey, records: &[T]) {
    if let Err(e) = self.store_records(key, records).await {
      warn!(key = %key, error = %e, "failed to write merged records back");
    }
  }

  // ==========================================================================
  // Remote primitives (retry-wrapped, timestamps normalized)
  // ==========================================================================

  pub async fn remote_get_document(
    &self,
    collection: &str,
    id: &str,
  ) -> Result<Option<Value>, RemoteError> {
    with_retry(&self.retry, || self.remote.get_document(collection, id))
      .await
      .map(|doc| doc.map(normalize_timestamps))
  }

  pub async fn remote_get_collection(
    &self,
    collection: &str,
    filters: &[Filter],
  ) -> Result<Vec<Value>, RemoteError> {
    with_retry(&self.retry, || self.remote.get_collection(collection, filters))
      .await
      .map(|docs| docs.into_iter().map(normalize_timestamps).collect())
  }

  pub async fn remote_set_document(
    &self,
    collection: &str,
    id: &str,
    data: &Value,
  ) -> Result<(), RemoteError> {
    with_retry(&self.retry, || self.remote.set_document(collection, id, data)).await
  }

  pub async fn remote_update_document(
    &self,
    collection: &str,
    id: &str,
    patch: &Value,
  ) -> Result<(), RemoteError> {
    with_retry(&self.retry, || {
      self.remote.update_document(collection, id, patch)
    })
    .await
  }

  pub async fn remote_delete_document(
    &self,
    collection: &str,
    id: &str,
  ) -> Result<(), RemoteError> {
    with_retry(&self.retry, || self.remote.delete_document(collection, id)).await
  }

  pub async fn remote_add_document(
    &self,
    collection: &str,
    data: &Value,
  ) -> Result<String, RemoteError> {
    with_retry(&self.retry, || self.remote.add_document(collection, data)).await
  }

  /// Best-effort remote replace: failures are logged and swallowed, because
  /// the local write already succeeded and a later sync pass catches up.
  pub async fn push_document(&self, collection: &str, id: &str, data: &Value) {
    if let Err(e) = self.remote_set_document(collection, id, data).await {
      warn!(collection, id, error = %e, "remote write failed, keeping local copy");
    }
  }

  /// Best-effort remote delete. A failed remote deletion is not queued.
  pub async fn push_delete(&self, collection: &str, id: &str) {
    if let Err(e) = self.remote_delete_document(collection, id).await {
      warn!(collection, id, error = %e, "remote delete failed, not retried");
    }
  }

  // ==========================================================================
  // Canonical read paths
  // ==========================================================================

  /// Cached single-record read: cache → remote → local fallback.
  ///
  /// On a remote hit the document is merged with the local copy under the
  /// entity's policy and the merged record is written back to the local
  /// store and the cache. Connectivity problems degrade to the local copy;
  /// "no data yet" is `Ok(None)`, never an error.
  pub async fn cached_read_one<T, M, F, Fut>(
    &self,
    cache_key: &str,
    storage_key: StorageKey,
    online: bool,
    policy: &MergePolicy,
    matches: M,
    fetch: F,
  ) -> ApiResult<Option<T>>
  where
    T: SyncRecord,
    M: Fn(&T) -> bool,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<Value>, RemoteError>>,
  {
    if let Some(hit) = self.cache.get::<T>(cache_key) {
      return Ok(Some(hit));
    }

    if self.remote_available(online) {
      match fetch().await {
        Ok(Some(remote_doc)) => {
          let mut records: Vec<T> = self.load_records(storage_key).await;
          let local_value = records
            .iter()
            .find(|r| matches(r))
            .and_then(|r| serde_json::to_value(r).ok());

          let merged_value = match &local_value {
            Some(local) => merge_with_policy(local, &remote_doc, policy),
            None => remote_doc,
          };

          if let Some(merged) = sanitize_into::<T>(merged_value) {
            match records.iter().position(|r| matches(r)) {
              Some(idx) => records[idx] = merged.clone(),
              None => records.push(merged.clone()),
            }
            self.store_records_best_effort(storage_key, &records).await;
            self.cache.put(cache_key, &merged, None);
            return Ok(Some(merged));
          }
          // Unshapeable remote document; fall through to the local copy.
        }
        Ok(None) => {
          // Absent remotely. The local copy (e.g. created offline and not
          // yet pushed) still counts.
        }
        Err(e) => {
          warn!(cache_key, error = %e, "remote read failed, falling back to local");
        }
      }
    }

    let records: Vec<T> = self.load_records(storage_key).await;
    match records.into_iter().find(|r| matches(r)) {
      Some(found) => {
        self.cache.put(cache_key, &found, None);
        Ok(Some(found))
      }
      None => Ok(None),
    }
  }

  /// Cached per-user list read: cache → remote → local fallback.
  ///
  /// A remote hit is merged record-wise with the local copy: union by id,
  /// the side with the newer `updated_at` wins, ties go to remote, and
  /// records that exist only locally (offline creations) are preserved.
  pub async fn cached_read_list<T, F, Fut>(
    &self,
    cache_key: &str,
    storage_key: StorageKey,
    online: bool,
    user_id: &str,
    fetch: F,
  ) -> ApiResult<Vec<T>>
  where
    T: SyncRecord,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Value>, RemoteError>>,
  {
    if let Some(hit) = self.cache.get::<Vec<T>>(cache_key) {
      return Ok(hit);
    }

    if self.remote_available(online) {
      match fetch().await {
        Ok(remote_docs) => {
          let remote_records: Vec<T> = remote_docs
            .into_iter()
            .filter_map(sanitize_into)
            .collect();

          let mut all: Vec<T> = self.load_records(storage_key).await;
          let local_user: Vec<T> = all
            .iter()
            .filter(|r| r.user_id() == user_id)
            .cloned()
            .collect();

          let merged = merge_record_sets(local_user, remote_records);

          all.retain(|r| r.user_id() != user_id);
          all.extend(merged.iter().cloned());
          self.store_records_best_effort(storage_key, &all).await;

          self.cache.put(cache_key, &merged, None);
          return Ok(merged);
        }
        Err(e) => {
          warn!(cache_key, error = %e, "remote list failed, falling back to local");
        }
      }
    }

    let all: Vec<T> = self.load_records(storage_key).await;
    let user_records: Vec<T> = all
      .into_iter()
      .filter(|r| r.user_id() == user_id)
      .collect();

    if !user_records.is_empty() {
      self.cache.put(cache_key, &user_records, None);
    }
    Ok(user_records)
  }

  // ==========================================================================
  // Canonical write paths
  // ==========================================================================

  /// Assign an identity to a record that does not have one yet.
  ///
  /// When the remote is available the id comes from the gateway
  /// (`add_document`); otherwise, or when the gateway fails, a locally
  /// generated `local-` id is used. Either way the id is permanent.
  pub async fn ensure_record_id<T: SyncRecord>(
    &self,
    record: &mut T,
    remote_collection: &str,
    online: bool,
  ) {
    if !record.record_id().is_empty() {
      return;
    }

    if self.remote_available(online) {
      if let Ok(value) = serde_json::to_value(&*record) {
        match self.remote_add_document(remote_collection, &value).await {
          Ok(id) => {
            record.set_record_id(id);
            return;
          }
          Err(e) => {
            warn!(collection = remote_collection, error = %e, "remote id assignment failed");
          }
        }
      }
    }

    record.set_record_id(crate::types::local_record_id(record.user_id()));
  }

  /// Local-first record write. The incoming record is overlaid on any
  /// existing record with the same identity (incoming non-null fields win),
  /// persisted unconditionally, and then pushed to the remote store
  /// best-effort when it is available.
  pub async fn write_record<T: SyncRecord>(
    &self,
    storage_key: StorageKey,
    cache_keys: &[String],
    online: bool,
    record: T,
    remote_collection: &str,
  ) -> ApiResult<T> {
    let mut all: Vec<T> = self.load_records(storage_key).await;

    let existing = all
      .iter()
      .position(|r| r.user_id() == record.user_id() && r.record_id() == record.record_id());

    let merged = match existing {
      Some(idx) => {
        let merged = overlay_record(&record, &all[idx]);
        all[idx] = merged.clone();
        merged
      }
      None => {
        all.push(record.clone());
        record
      }
    };

    self.store_records(storage_key, &all).await?;

    for key in cache_keys {
      self.cache.invalidate(key);
    }

    if self.remote_available(online) {
      match serde_json::to_value(&merged) {
        Ok(value) => self.push_document(remote_collection, merged.record_id(), &value).await,
        Err(e) => warn!(error = %e, "failed to serialize record for remote push"),
      }
    }

    Ok(merged)
  }

  /// Remove a record locally and delete it remotely best-effort.
  pub async fn delete_record<T: SyncRecord>(
    &self,
    storage_key: StorageKey,
    cache_keys: &[String],
    online: bool,
    remote_collection: &str,
    user_id: &str,
    id: &str,
  ) -> ApiResult<()> {
    let mut all: Vec<T> = self.load_records(storage_key).await;
    let found = all
      .iter()
      .position(|r| r.user_id() == user_id && r.record_id() == id);

    match found {
      Some(idx) => {
        all.remove(idx);
        self.store_records(storage_key, &all).await?;
        for key in cache_keys {
          self.cache.invalidate(key);
        }
        if self.remote_available(online) {
          self.push_delete(remote_collection, id).await;
        }
        Ok(())
      }
      None => {
        // Unknown locally. If the remote is reachable the record may still
        // exist there; otherwise there is nothing to delete anywhere.
        if self.remote_available(online) {
          match self.remote_delete_document(remote_collection, id).await {
            Ok(()) => {
              for key in cache_keys {
                self.cache.invalidate(key);
              }
              Ok(())
            }
            Err(_) => Err(ApiError::not_found(format!("{}/{}", remote_collection, id))),
          }
        } else {
          Err(ApiError::not_found(format!("{}/{}", remote_collection, id)))
        }
      }
    }
  }

  // ==========================================================================
  // Full-collection reconciliation
  // ==========================================================================

  /// Reconcile one user's records with the remote collection.
  ///
  /// Per-record last-writer-wins on `updated_at` (tie → remote). Local-only
  /// records are pushed with their current ids, remote-only records are
  /// pulled. Does nothing when the remote is unavailable.
  pub async fn sync_user_collection<T: SyncRecord>(
    &self,
    storage_key: StorageKey,
    cache_key: &str,
    online: bool,
    user_id: &str,
    remote_collection: &str,
  ) -> ApiResult<SyncReport> {
    if !self.remote_available(online) {
      debug!(collection = remote_collection, "sync skipped, remote unavailable");
      return Ok(SyncReport {
        remote_unavailable: true,
        ..SyncReport::default()
      });
    }

    let remote_docs = match self.remote_get_collection(remote_collection, &[]).await {
      Ok(docs) => docs,
      Err(e) => {
        warn!(collection = remote_collection, error = %e, "sync aborted, remote fetch failed");
        return Ok(SyncReport {
          remote_unavailable: true,
          ..SyncReport::default()
        });
      }
    };

    let mut remote_by_id: HashMap<String, T> = remote_docs
      .into_iter()
      .filter_map(sanitize_into::<T>)
      .map(|r| (r.record_id().to_string(), r))
      .collect();

    let mut all: Vec<T> = self.load_records(storage_key).await;
    let local_user: Vec<T> = all
      .iter()
      .filter(|r| r.user_id() == user_id)
      .cloned()
      .collect();

    let mut report = SyncReport::default();
    let mut merged: Vec<T> = Vec::with_capacity(local_user.len());

    for local in local_user {
      match remote_by_id.remove(local.record_id()) {
        None => {
          // Only known locally: push it, keeping its id (including ids
          // generated offline).
          if self.push_record(remote_collection, &local).await {
            report.pushed += 1;
          } else {
            report.push_failures += 1;
          }
          merged.push(local);
        }
        Some(remote) => {
          if local_is_newer(&local, &remote) {
            if self.push_record(remote_collection, &local).await {
              report.updated_remote += 1;
            } else {
              report.push_failures += 1;
            }
            merged.push(local);
          } else {
            if remote.updated_at() != local.updated_at() {
              report.updated_local += 1;
            }
            merged.push(remote);
          }
        }
      }
    }

    // Whatever remains was only known remotely.
    for (_, remote) in remote_by_id {
      report.pulled += 1;
      merged.push(remote);
    }

    all.retain(|r| r.user_id() != user_id);
    all.extend(merged);
    self.store_records(storage_key, &all).await?;
    self.cache.invalidate(cache_key);

    debug!(
      collection = remote_collection,
      pushed = report.pushed,
      pulled = report.pulled,
      "sync pass complete"
    );
    Ok(report)
  }

  async fn push_record<T: SyncRecord>(&self, collection: &str, record: &T) -> bool {
    let value = match serde_json::to_value(record) {
      Ok(v) => v,
      Err(e) => {
        warn!(error = %e, "failed to serialize record for sync push");
        return false;
      }
    };
    match self.remote_set_document(collection, record.record_id(), &value).await {
      Ok(()) => true,
      Err(e) => {
        warn!(collection, id = record.record_id(), error = %e, "sync push failed");
        false
      }
    }
  }

  // ==========================================================================
  // Maintenance
  // ==========================================================================

  /// Spawn the periodic cache sweep. Each pass evicts expired entries and
  /// records its bookkeeping under the cache-metadata storage key.
  pub fn start_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
    let service = Arc::clone(self);
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(SWEEP_INTERVAL);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick completes immediately.
      interval.tick().await;

      loop {
        interval.tick().await;
        let swept = service.cache.sweep();
        if swept > 0 {
          debug!(swept, "cache sweep evicted expired entries");
        }

        let metadata = CacheMetadata {
          last_sweep_at: Some(now_timestamp()),
          swept_entries: swept as u64,
        };
        match serde_json::to_string(&metadata) {
          Ok(raw) => {
            if let Err(e) = service.store.set_item(StorageKey::CacheMetadata, raw).await {
              debug!(error = %e, "failed to persist sweep metadata");
            }
          }
          Err(e) => debug!(error = %e, "failed to serialize sweep metadata"),
        }
      }
    })
  }
}

/// Overlay `incoming` on `existing`: incoming non-null fields win, missing
/// fields are filled from the stored record.
fn overlay_record<T: SyncRecord>(incoming: &T, existing: &T) -> T {
  match (serde_json::to_value(incoming), serde_json::to_value(existing)) {
    (Ok(i), Ok(e)) => sanitize_into(merge_data(&i, &e)).unwrap_or_else(|| incoming.clone()),
    _ => incoming.clone(),
  }
}

fn local_is_newer<T: SyncRecord>(local: &T, remote: &T) -> bool {
  match (
    parse_timestamp(local.updated_at()),
    parse_timestamp(remote.updated_at()),
  ) {
    (Some(l), Some(r)) => l > r,
    (Some(_), None) => true,
    _ => false,
  }
}

/// Union two record sets by id: both-sides conflicts go to the newer
/// `updated_at` (tie → remote), local-only records are kept, remote-only
/// records are appended.
fn merge_record_sets<T: SyncRecord>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
  let mut remote_by_id: HashMap<String, T> = remote
    .into_iter()
    .map(|r| (r.record_id().to_string(), r))
    .collect();

  let mut merged: Vec<T> = Vec::new();
  for local_record in local {
    match remote_by_id.remove(local_record.record_id()) {
      Some(remote_record) => {
        if local_is_newer(&local_record, &remote_record) {
          merged.push(local_record);
        } else {
          merged.push(remote_record);
        }
      }
      None => merged.push(local_record),
    }
  }

  merged.extend(remote_by_id.into_values());
  merged
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheManager;
  use crate::remote::{MockRemoteGateway, RemoteErrorKind};
  use crate::store::MemoryStore;
  use crate::sync::merge::FieldRule;
  use crate::types::{UserProfile, Workout};
  use serde_json::json;

  struct Harness {
    service: Arc<SyncService>,
    store: Arc<MemoryStore>,
    remote: Arc<MockRemoteGateway>,
  }

  fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemoteGateway::new());
    let service = Arc::new(SyncService::with_parts(
      Arc::new(CacheManager::new()),
      store.clone(),
      remote.clone(),
      RetryPolicy::new(1, std::time::Duration::ZERO),
      true,
    ));
    Harness {
      service,
      store,
      remote,
    }
  }

  fn workout(id: &str, user: &str, name: &str, updated_at: &str) -> Workout {
    Workout {
      id: id.to_string(),
      user_id: user.to_string(),
      name: name.to_string(),
      updated_at: updated_at.to_string(),
      ..Workout::default()
    }
  }

  const PROFILE_POLICY: MergePolicy = MergePolicy {
    rules: &[
      ("username", FieldRule::RemoteWins),
      ("weight", FieldRule::LocalWins),
      ("height", FieldRule::LocalWins),
    ],
  };

  async fn read_profile(h: &Harness, uid: &str, online: bool) -> Option<UserProfile> {
    let service = h.service.clone();
    let uid_owned = uid.to_string();
    h.service
      .cached_read_one(
        &format!("profile:{}", uid),
        StorageKey::Profile,
        online,
        &PROFILE_POLICY,
        |p: &UserProfile| p.uid == uid,
        || async move { service.remote_get_document("users", &uid_owned).await },
      )
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_cache_hit_skips_remote_and_store() {
    let h = harness();
    let profile = UserProfile {
      uid: "u1".into(),
      email: "a@b.c".into(),
      username: "ann".into(),
      ..UserProfile::default()
    };
    h.service.cache().put("profile:u1", &profile, None);

    // Both collaborators would fail if touched.
    h.remote.fail_next(10, RemoteErrorKind::Server);
    h.store.fail_reads(true);

    let got = read_profile(&h, "u1", true).await;
    assert_eq!(got.unwrap().username, "ann");
  }

  #[tokio::test]
  async fn test_remote_read_merges_and_fills_cache_and_store() {
    let h = harness();
    // Device-entered weight on the local copy.
    let local = UserProfile {
      uid: "u1".into(),
      email: "a@b.c".into(),
      username: "device-name".into(),
      weight: Some(82.0),
      height: Some(180.0),
      ..UserProfile::default()
    };
    h.store
      .set_item(
        StorageKey::Profile,
        serde_json::to_string(&vec![&local]).unwrap(),
      )
      .await
      .unwrap();

    h.remote.insert(
      "users",
      "u1",
      json!({"uid": "u1", "email": "a@b.c", "username": "remote", "weight": 81.0}),
    );

    let got = read_profile(&h, "u1", true).await.unwrap();
    assert_eq!(got.username, "remote");
    assert_eq!(got.weight, Some(82.0));
    assert_eq!(got.height, Some(180.0));

    // Cache was filled: a second read works with the remote failing.
    h.remote.fail_next(10, RemoteErrorKind::Server);
    let cached = read_profile(&h, "u1", true).await.unwrap();
    assert_eq!(cached.username, "remote");
  }

  #[tokio::test]
  async fn test_offline_read_falls_back_to_local() {
    let h = harness();
    let local = UserProfile {
      uid: "u1".into(),
      email: "a@b.c".into(),
      username: "ann".into(),
      ..UserProfile::default()
    };
    h.store
      .set_item(
        StorageKey::Profile,
        serde_json::to_string(&vec![&local]).unwrap(),
      )
      .await
      .unwrap();

    let got = read_profile(&h, "u1", false).await;
    assert_eq!(got.unwrap().username, "ann");
  }

  #[tokio::test]
  async fn test_remote_failure_degrades_to_local() {
    let h = harness();
    let local = UserProfile {
      uid: "u1".into(),
      email: "a@b.c".into(),
      username: "ann".into(),
      ..UserProfile::default()
    };
    h.store
      .set_item(
        StorageKey::Profile,
        serde_json::to_string(&vec![&local]).unwrap(),
      )
      .await
      .unwrap();
    h.remote.fail_next(10, RemoteErrorKind::Server);

    let got = read_profile(&h, "u1", true).await;
    assert_eq!(got.unwrap().username, "ann");
  }

  #[tokio::test]
  async fn test_absent_everywhere_is_none_not_error() {
    let h = harness();
    assert!(read_profile(&h, "nobody", true).await.is_none());
  }

  #[tokio::test]
  async fn test_local_read_failure_is_treated_as_no_data() {
    let h = harness();
    h.store.fail_reads(true);
    assert!(read_profile(&h, "u1", false).await.is_none());
  }

  #[tokio::test]
  async fn test_write_offline_persists_locally() {
    let h = harness();
    let w = workout("w1", "u1", "Push day", "2024-01-01T00:00:00.000Z");

    let saved = h
      .service
      .write_record(
        StorageKey::WorkoutHistory,
        &["workouts:u1".to_string()],
        false,
        w,
        "users/u1/workouts",
      )
      .await
      .unwrap();
    assert_eq!(saved.id, "w1");

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    assert_eq!(stored.len(), 1);
    // Nothing reached the remote store.
    assert_eq!(h.remote.count("users/u1/workouts"), 0);
  }

  #[tokio::test]
  async fn test_write_remote_failure_is_swallowed() {
    let h = harness();
    h.remote.fail_next(10, RemoteErrorKind::Server);
    let w = workout("w1", "u1", "Push day", "2024-01-01T00:00:00.000Z");

    let result = h
      .service
      .write_record(
        StorageKey::WorkoutHistory,
        &[],
        true,
        w,
        "users/u1/workouts",
      )
      .await;
    assert!(result.is_ok());

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    assert_eq!(stored.len(), 1);
  }

  #[tokio::test]
  async fn test_write_local_failure_is_fatal() {
    let h = harness();
    h.store.fail_writes(true);
    let w = workout("w1", "u1", "Push day", "2024-01-01T00:00:00.000Z");

    let err = h
      .service
      .write_record(
        StorageKey::WorkoutHistory,
        &[],
        false,
        w,
        "users/u1/workouts",
      )
      .await
      .unwrap_err();
    assert_eq!(err.code, crate::api::ErrorCode::OperationFailed);
  }

  #[tokio::test]
  async fn test_write_overlays_existing_record() {
    let h = harness();
    let mut original = workout("w1", "u1", "Push day", "2024-01-01T00:00:00.000Z");
    original.notes = Some("felt strong".into());
    h.service
      .write_record(
        StorageKey::WorkoutHistory,
        &[],
        false,
        original,
        "users/u1/workouts",
      )
      .await
      .unwrap();

    // Same identity, no notes: the stored notes survive the overlay.
    let update = workout("w1", "u1", "Push day (heavy)", "2024-01-02T00:00:00.000Z");
    let merged = h
      .service
      .write_record(
        StorageKey::WorkoutHistory,
        &[],
        false,
        update,
        "users/u1/workouts",
      )
      .await
      .unwrap();

    assert_eq!(merged.name, "Push day (heavy)");
    assert_eq!(merged.notes, Some("felt strong".into()));

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    assert_eq!(stored.len(), 1);
  }

  #[tokio::test]
  async fn test_delete_unknown_offline_is_not_found() {
    let h = harness();
    let err = h
      .service
      .delete_record::<Workout>(
        StorageKey::WorkoutHistory,
        &[],
        false,
        "users/u1/workouts",
        "u1",
        "missing",
      )
      .await
      .unwrap_err();
    assert_eq!(err.code, crate::api::ErrorCode::NotFound);
  }

  #[tokio::test]
  async fn test_delete_removes_locally_and_remotely() {
    let h = harness();
    let w = workout("w1", "u1", "Push day", "2024-01-01T00:00:00.000Z");
    h.service
      .write_record(
        StorageKey::WorkoutHistory,
        &[],
        true,
        w,
        "users/u1/workouts",
      )
      .await
      .unwrap();
    assert_eq!(h.remote.count("users/u1/workouts"), 1);

    h.service
      .delete_record::<Workout>(
        StorageKey::WorkoutHistory,
        &[],
        true,
        "users/u1/workouts",
        "u1",
        "w1",
      )
      .await
      .unwrap();

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    assert!(stored.is_empty());
    assert_eq!(h.remote.count("users/u1/workouts"), 0);
  }

  #[tokio::test]
  async fn test_sync_pushes_local_only_and_pulls_remote_only() {
    let h = harness();
    let local_only = workout("w-local", "u1", "Offline workout", "2024-01-02T00:00:00.000Z");
    h.store
      .set_item(
        StorageKey::WorkoutHistory,
        serde_json::to_string(&vec![&local_only]).unwrap(),
      )
      .await
      .unwrap();
    h.remote.insert(
      "users/u1/workouts",
      "w-remote",
      serde_json::to_value(workout(
        "w-remote",
        "u1",
        "Server workout",
        "2024-01-03T00:00:00.000Z",
      ))
      .unwrap(),
    );

    let report = h
      .service
      .sync_user_collection::<Workout>(
        StorageKey::WorkoutHistory,
        "workouts:u1",
        true,
        "u1",
        "users/u1/workouts",
      )
      .await
      .unwrap();

    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 1);
    assert!(h.remote.document("users/u1/workouts", "w-local").is_some());

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    assert_eq!(stored.len(), 2);
  }

  #[tokio::test]
  async fn test_sync_last_writer_wins_with_remote_on_tie() {
    let h = harness();
    let stale_local = workout("w1", "u1", "Old name", "2024-01-01T00:00:00.000Z");
    let fresh_local = workout("w2", "u1", "Renamed locally", "2024-03-01T00:00:00.000Z");
    h.store
      .set_item(
        StorageKey::WorkoutHistory,
        serde_json::to_string(&vec![&stale_local, &fresh_local]).unwrap(),
      )
      .await
      .unwrap();

    h.remote.insert(
      "users/u1/workouts",
      "w1",
      serde_json::to_value(workout("w1", "u1", "New name", "2024-02-01T00:00:00.000Z")).unwrap(),
    );
    h.remote.insert(
      "users/u1/workouts",
      "w2",
      serde_json::to_value(workout("w2", "u1", "Old remote", "2024-02-01T00:00:00.000Z")).unwrap(),
    );

    let report = h
      .service
      .sync_user_collection::<Workout>(
        StorageKey::WorkoutHistory,
        "workouts:u1",
        true,
        "u1",
        "users/u1/workouts",
      )
      .await
      .unwrap();

    assert_eq!(report.updated_local, 1);
    assert_eq!(report.updated_remote, 1);

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    let w1 = stored.iter().find(|w| w.id == "w1").unwrap();
    assert_eq!(w1.name, "New name");
    let remote_w2 = h.remote.document("users/u1/workouts", "w2").unwrap();
    assert_eq!(remote_w2["name"], "Renamed locally");
  }

  #[tokio::test]
  async fn test_sync_offline_reports_remote_unavailable() {
    let h = harness();
    let report = h
      .service
      .sync_user_collection::<Workout>(
        StorageKey::WorkoutHistory,
        "workouts:u1",
        false,
        "u1",
        "users/u1/workouts",
      )
      .await
      .unwrap();
    assert!(report.remote_unavailable);
    assert_eq!(report.pushed, 0);
  }

  #[tokio::test]
  async fn test_sync_does_not_touch_other_users_records() {
    let h = harness();
    let mine = workout("w1", "u1", "Mine", "2024-01-01T00:00:00.000Z");
    let theirs = workout("w1", "u2", "Theirs", "2024-01-01T00:00:00.000Z");
    h.store
      .set_item(
        StorageKey::WorkoutHistory,
        serde_json::to_string(&vec![&mine, &theirs]).unwrap(),
      )
      .await
      .unwrap();

    h.service
      .sync_user_collection::<Workout>(
        StorageKey::WorkoutHistory,
        "workouts:u1",
        true,
        "u1",
        "users/u1/workouts",
      )
      .await
      .unwrap();

    let stored: Vec<Workout> = h.service.load_records(StorageKey::WorkoutHistory).await;
    assert!(stored.iter().any(|w| w.user_id == "u2" && w.name == "Theirs"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_maintenance_sweeps_and_persists_metadata() {
    let h = harness();
    // Already expired: only the sweep can evict it.
    h.service.cache().put(
      "short-lived",
      &"v",
      Some(chrono::Duration::milliseconds(-1)),
    );

    let handle = h.service.start_maintenance();
    tokio::time::sleep(SWEEP_INTERVAL + std::time::Duration::from_secs(1)).await;
    handle.abort();

    assert!(h.service.cache().is_empty());
    let raw = h
      .store
      .get_item(StorageKey::CacheMetadata)
      .await
      .unwrap()
      .expect("sweep metadata written");
    let metadata: CacheMetadata = serde_json::from_str(&raw).unwrap();
    assert!(metadata.last_sweep_at.is_some());
    assert_eq!(metadata.swept_entries, 1);
  }
}
