//! User profile service.

use std::sync::Arc;

use crate::api::{ApiError, ApiResult};
use crate::store::StorageKey;
use crate::sync::{FieldRule, MergePolicy, SyncService};
use crate::types::{now_timestamp, UserProfile};

/// Collection holding profile documents, keyed by uid.
const USERS_COLLECTION: &str = "users";

/// Field precedence when a remote profile meets the local copy.
///
/// The last authenticated write is authoritative for identity-facing fields,
/// while device-entered biometrics are trusted over whatever the server has
/// (a previous sync may have been slow or partial).
pub const PROFILE_MERGE_POLICY: MergePolicy = MergePolicy {
  rules: &[
    ("username", FieldRule::RemoteWins),
    ("weight", FieldRule::LocalWins),
    ("height", FieldRule::LocalWins),
  ],
};

fn profile_cache_key(uid: &str) -> String {
  format!("profile:{}", uid)
}

/// CRUD over user profiles.
#[derive(Clone)]
pub struct ProfileService {
  service: Arc<SyncService>,
}

impl ProfileService {
  pub fn new(service: Arc<SyncService>) -> Self {
    Self { service }
  }

  fn validate(profile: &UserProfile) -> ApiResult<()> {
    if profile.uid.is_empty() {
      return Err(ApiError::missing_field("uid"));
    }
    if profile.email.is_empty() {
      return Err(ApiError::missing_field("email"));
    }
    if !profile.email.contains('@') {
      return Err(ApiError::validation("email is not well-formed"));
    }
    if matches!(profile.weight, Some(w) if w <= 0.0) {
      return Err(ApiError::validation("weight must be positive"));
    }
    if matches!(profile.height, Some(h) if h <= 0.0) {
      return Err(ApiError::validation("height must be positive"));
    }
    if matches!(profile.age, Some(a) if a == 0 || a > 130) {
      return Err(ApiError::validation("age is out of range"));
    }
    Ok(())
  }

  /// Save the profile locally and push it to the remote store best-effort.
  pub async fn save_profile(&self, mut profile: UserProfile, online: bool) -> ApiResult<UserProfile> {
    Self::validate(&profile)?;

    let now = now_timestamp();
    if profile.created_at.is_empty() {
      profile.created_at = now.clone();
    }
    profile.updated_at = now;

    let cache_key = profile_cache_key(&profile.uid);
    self
      .service
      .write_record(
        StorageKey::Profile,
        &[cache_key],
        online,
        profile,
        USERS_COLLECTION,
      )
      .await
  }

  /// Fetch a profile: cache → remote (merged under the profile policy) →
  /// local fallback. `Ok(None)` means "no profile yet", never a
  /// connectivity problem.
  pub async fn get_profile(&self, uid: &str, online: bool) -> ApiResult<Option<UserProfile>> {
    if uid.is_empty() {
      return Err(ApiError::missing_field("uid"));
    }

    let service = self.service.clone();
    let uid_owned = uid.to_string();
    self
      .service
      .cached_read_one(
        &profile_cache_key(uid),
        StorageKey::Profile,
        online,
        &PROFILE_MERGE_POLICY,
        |p: &UserProfile| p.uid == uid,
        || async move {
          service
            .remote_get_document(USERS_COLLECTION, &uid_owned)
            .await
        },
      )
      .await
  }

  /// Remove the profile locally and delete it remotely when online.
  pub async fn delete_profile(&self, uid: &str, online: bool) -> ApiResult<()> {
    if uid.is_empty() {
      return Err(ApiError::missing_field("uid"));
    }

    self
      .service
      .delete_record::<UserProfile>(
        StorageKey::Profile,
        &[profile_cache_key(uid)],
        online,
        USERS_COLLECTION,
        uid,
        uid,
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
  use crate::store::{LocalStore, MemoryStore};
  use serde_json::json;

  fn setup() -> (ProfileService, Arc<MemoryStore>, Arc<MockRemoteGateway>) {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemoteGateway::new());
    let service = Arc::new(SyncService::with_parts(
      Arc::new(CacheManager::new()),
      store.clone(),
      remote.clone(),
      RetryPolicy::new(1, std::time::Duration::ZERO),
      true,
    ));
    (ProfileService::new(service), store, remote)
  }

  fn profile(uid: &str) -> UserProfile {
    UserProfile {
      uid: uid.to_string(),
      email: format!("{}@example.com", uid),
      username: uid.to_string(),
      ..UserProfile::default()
    }
  }

  #[tokio::test]
  async fn test_save_requires_uid_and_touches_no_storage() {
    let (profiles, store, remote) = setup();
    let mut bad = profile("");
    bad.email = "a@b.c".into();

    let err = profiles.save_profile(bad, true).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingRequiredField);
    assert_eq!(store.get_item(StorageKey::Profile).await.unwrap(), None);
    assert_eq!(remote.count("users"), 0);
  }

  #[tokio::test]
  async fn test_save_rejects_malformed_email() {
    let (profiles, _store, _remote) = setup();
    let mut bad = profile("u1");
    bad.email = "not-an-email".into();

    let err = profiles.save_profile(bad, true).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);
  }

  #[tokio::test]
  async fn test_save_online_reaches_remote() {
    let (profiles, _store, remote) = setup();
    let saved = profiles.save_profile(profile("u1"), true).await.unwrap();
    assert!(!saved.created_at.is_empty());
    assert!(remote.document("users", "u1").is_some());
  }

  #[tokio::test]
  async fn test_save_offline_then_get_offline() {
    let (profiles, _store, remote) = setup();
    profiles.save_profile(profile("u1"), false).await.unwrap();
    assert_eq!(remote.count("users"), 0);

    let got = profiles.get_profile("u1", false).await.unwrap().unwrap();
    assert_eq!(got.uid, "u1");
  }

  #[tokio::test]
  async fn test_merge_precedence_local_biometrics_remote_username() {
    let (profiles, _store, remote) = setup();
    let mut local = profile("u1");
    local.weight = Some(82.0);
    local.height = Some(180.0);
    profiles.save_profile(local, false).await.unwrap();

    remote.insert(
      "users",
      "u1",
      json!({"uid": "u1", "email": "u1@example.com", "username": "remote", "weight": 81.0}),
    );

    // Cache was invalidated by the save, so this read goes to the remote.
    let merged = profiles.get_profile("u1", true).await.unwrap().unwrap();
    assert_eq!(merged.weight, Some(82.0));
    assert_eq!(merged.height, Some(180.0));
    assert_eq!(merged.username, "remote");
  }

  #[tokio::test]
  async fn test_delete_profile_removes_everywhere() {
    let (profiles, _store, remote) = setup();
    profiles.save_profile(profile("u1"), true).await.unwrap();

    profiles.delete_profile("u1", true).await.unwrap();
    assert!(profiles.get_profile("u1", false).await.unwrap().is_none());
    assert!(remote.document("users", "u1").is_none());
  }

  #[tokio::test]
  async fn test_delete_unknown_profile_is_not_found() {
    let (profiles, _store, _remote) = setup();
    let err = profiles.delete_profile("ghost", false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
  }
}
