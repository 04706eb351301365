//! Friend-graph service.
//!
//! Friend requests are a two-party negotiation: stale pending/rejected state
//! is actively misleading, so request reads have no cache and no local
//! fallback, and every mutation requires connectivity. Only the accepted
//! friends list is cached.

use serde_json::json;
use std::sync::Arc;

use crate::api::{ApiError, ApiResult};
use crate::remote::{user_collection, Filter};
use crate::sync::{sanitize_into, SyncService};
use crate::types::{now_timestamp, Friend, FriendRequest, FriendRequestStatus};

/// Top-level collection of friend requests.
const REQUESTS_COLLECTION: &str = "friend-requests";

fn friends_cache_key(uid: &str) -> String {
  format!("friends:{}", uid)
}

fn friends_collection(uid: &str) -> String {
  user_collection(uid, "friends")
}

fn status_name(status: FriendRequestStatus) -> &'static str {
  match status {
    FriendRequestStatus::Pending => "pending",
    FriendRequestStatus::Accepted => "accepted",
    FriendRequestStatus::Rejected => "rejected",
  }
}

/// Friend requests and the materialized friend list.
#[derive(Clone)]
pub struct FriendService {
  service: Arc<SyncService>,
}

impl FriendService {
  pub fn new(service: Arc<SyncService>) -> Self {
    Self { service }
  }

  /// Create a pending request from `from_uid` to `to_uid`.
  pub async fn send_request(
    &self,
    from_uid: &str,
    to_uid: &str,
    online: bool,
  ) -> ApiResult<FriendRequest> {
    if from_uid.is_empty() {
      return Err(ApiError::missing_field("from_uid"));
    }
    if to_uid.is_empty() {
      return Err(ApiError::missing_field("to_uid"));
    }
    if from_uid == to_uid {
      return Err(ApiError::validation("cannot send a friend request to yourself"));
    }
    if !self.service.remote_available(online) {
      return Err(ApiError::offline("Sending a friend request"));
    }

    let pending = self
      .service
      .remote_get_collection(
        REQUESTS_COLLECTION,
        &[
          Filter::eq("from_uid", from_uid),
          Filter::eq("to_uid", to_uid),
          Filter::eq("status", "pending"),
        ],
      )
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to check existing requests: {}", e)))?;
    if !pending.is_empty() {
      return Err(ApiError::validation("a pending request already exists"));
    }

    let now = now_timestamp();
    let mut request = FriendRequest {
      id: String::new(),
      from_uid: from_uid.to_string(),
      to_uid: to_uid.to_string(),
      status: FriendRequestStatus::Pending,
      created_at: now.clone(),
      updated_at: now,
    };

    let value = serde_json::to_value(&request)
      .map_err(|e| ApiError::operation_failed(format!("failed to serialize request: {}", e)))?;
    let id = self
      .service
      .remote_add_document(REQUESTS_COLLECTION, &value)
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to create request: {}", e)))?;
    request.id = id.clone();

    // Embed the id so filtered listings carry it. The document exists either
    // way, so a failure here only costs the embedded field.
    if let Err(e) = self
      .service
      .remote_update_document(REQUESTS_COLLECTION, &id, &json!({ "id": id }))
      .await
    {
      tracing::warn!(id = %id, error = %e, "failed to embed request id");
    }

    Ok(request)
  }

  /// Pending requests addressed to `uid`. Online-only, uncached.
  pub async fn list_incoming_requests(
    &self,
    uid: &str,
    online: bool,
  ) -> ApiResult<Vec<FriendRequest>> {
    if uid.is_empty() {
      return Err(ApiError::missing_field("uid"));
    }
    if !self.service.remote_available(online) {
      return Err(ApiError::offline("Listing friend requests"));
    }

    let docs = self
      .service
      .remote_get_collection(
        REQUESTS_COLLECTION,
        &[Filter::eq("to_uid", uid), Filter::eq("status", "pending")],
      )
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to list requests: {}", e)))?;

    Ok(docs.into_iter().filter_map(sanitize_into).collect())
  }

  async fn load_request(&self, request_id: &str) -> ApiResult<FriendRequest> {
    let doc = self
      .service
      .remote_get_document(REQUESTS_COLLECTION, request_id)
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to load request: {}", e)))?
      .ok_or_else(|| ApiError::not_found(format!("friend request {}", request_id)))?;

    let mut request: FriendRequest = sanitize_into(doc)
      .ok_or_else(|| ApiError::operation_failed("friend request document is malformed"))?;
    if request.id.is_empty() {
      request.id = request_id.to_string();
    }
    Ok(request)
  }

  /// Guard shared by accept and reject: connectivity, recipient-only,
  /// pending-only.
  async fn load_transition_target(
    &self,
    request_id: &str,
    acting_uid: &str,
    online: bool,
    operation: &'static str,
  ) -> ApiResult<FriendRequest> {
    if request_id.is_empty() {
      return Err(ApiError::missing_field("request_id"));
    }
    if acting_uid.is_empty() {
      return Err(ApiError::missing_field("acting_uid"));
    }
    if !self.service.remote_available(online) {
      return Err(ApiError::offline(operation));
    }

    let request = self.load_request(request_id).await?;
    if request.to_uid != acting_uid {
      return Err(ApiError::validation(
        "only the recipient may respond to a friend request",
      ));
    }
    if request.status != FriendRequestStatus::Pending {
      return Err(ApiError::validation(format!(
        "friend request is already {}",
        status_name(request.status)
      )));
    }
    Ok(request)
  }

  /// Accept a pending request: marks it accepted and materializes the
  /// friendship as two one-directional records, one per participant.
  pub async fn accept_request(
    &self,
    request_id: &str,
    acting_uid: &str,
    online: bool,
  ) -> ApiResult<()> {
    let request = self
      .load_transition_target(request_id, acting_uid, online, "Accepting a friend request")
      .await?;

    let now = now_timestamp();
    self
      .service
      .remote_update_document(
        REQUESTS_COLLECTION,
        request_id,
        &json!({ "status": "accepted", "updated_at": now }),
      )
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to accept request: {}", e)))?;

    let from_name = self.lookup_username(&request.from_uid).await;
    let to_name = self.lookup_username(&request.to_uid).await;

    let for_recipient = Friend {
      uid: request.from_uid.clone(),
      username: from_name,
      since: now.clone(),
    };
    let for_sender = Friend {
      uid: request.to_uid.clone(),
      username: to_name,
      since: now,
    };

    self
      .write_friend(&request.to_uid, &for_recipient)
      .await?;
    self.write_friend(&request.from_uid, &for_sender).await?;

    self
      .service
      .cache()
      .invalidate(&friends_cache_key(&request.from_uid));
    self
      .service
      .cache()
      .invalidate(&friends_cache_key(&request.to_uid));

    Ok(())
  }

  /// Reject a pending request. Terminal; no friend records are created.
  pub async fn reject_request(
    &self,
    request_id: &str,
    acting_uid: &str,
    online: bool,
  ) -> ApiResult<()> {
    self
      .load_transition_target(request_id, acting_uid, online, "Rejecting a friend request")
      .await?;

    let now = now_timestamp();
    self
      .service
      .remote_update_document(
        REQUESTS_COLLECTION,
        request_id,
        &json!({ "status": "rejected", "updated_at": now }),
      )
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to reject request: {}", e)))
  }

  /// The user's friends: cache → remote → empty. Friends have no local
  /// storage key, so an offline cold read is simply empty.
  pub async fn get_friends(&self, uid: &str, online: bool) -> ApiResult<Vec<Friend>> {
    if uid.is_empty() {
      return Err(ApiError::missing_field("uid"));
    }

    let cache_key = friends_cache_key(uid);
    if let Some(hit) = self.service.cache().get::<Vec<Friend>>(&cache_key) {
      return Ok(hit);
    }

    if self.service.remote_available(online) {
      match self
        .service
        .remote_get_collection(&friends_collection(uid), &[])
        .await
      {
        Ok(docs) => {
          let friends: Vec<Friend> = docs.into_iter().filter_map(sanitize_into).collect();
          self.service.cache().put(&cache_key, &friends, None);
          return Ok(friends);
        }
        Err(e) => {
          tracing::warn!(uid, error = %e, "failed to fetch friends, serving empty list");
        }
      }
    }

    Ok(Vec::new())
  }

  /// Remove a friendship in both directions.
  pub async fn remove_friend(&self, uid: &str, friend_uid: &str, online: bool) -> ApiResult<()> {
    if uid.is_empty() {
      return Err(ApiError::missing_field("uid"));
    }
    if friend_uid.is_empty() {
      return Err(ApiError::missing_field("friend_uid"));
    }
    if !self.service.remote_available(online) {
      return Err(ApiError::offline("Removing a friend"));
    }

    match self
      .service
      .remote_delete_document(&friends_collection(uid), friend_uid)
      .await
    {
      Ok(()) => {}
      Err(e) if e.kind == crate::remote::RemoteErrorKind::NotFound => {
        return Err(ApiError::not_found(format!("friend {}", friend_uid)));
      }
      Err(e) => {
        return Err(ApiError::operation_failed(format!(
          "failed to remove friend: {}",
          e
        )));
      }
    }

    // The reverse direction is best-effort; a missed delete leaves a
    // dangling record on the other side, which the other participant's
    // own removal can clean up.
    if let Err(e) = self
      .service
      .remote_delete_document(&friends_collection(friend_uid), uid)
      .await
    {
      tracing::warn!(uid, friend_uid, error = %e, "failed to remove reverse friend record");
    }

    self.service.cache().invalidate(&friends_cache_key(uid));
    self.service.cache().invalidate(&friends_cache_key(friend_uid));
    Ok(())
  }

  async fn lookup_username(&self, uid: &str) -> String {
    match self.service.remote_get_document("users", uid).await {
      Ok(Some(doc)) => doc
        .get("username")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string(),
      _ => String::new(),
    }
  }

  async fn write_friend(&self, owner_uid: &str, friend: &Friend) -> ApiResult<()> {
    let value = serde_json::to_value(friend)
      .map_err(|e| ApiError::operation_failed(format!("failed to serialize friend: {}", e)))?;
    self
      .service
      .remote_set_document(&friends_collection(owner_uid), &friend.uid, &value)
      .await
      .map_err(|e| ApiError::operation_failed(format!("failed to record friendship: {}", e)))
  }
}
