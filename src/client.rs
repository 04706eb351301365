//! Client facade aggregating all entity services.

use chrono::Duration;
use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::api::ApiResult;
use crate::cache::CacheManager;
use crate::config::Config;
use crate::remote::{HttpRemoteGateway, RemoteGateway, RetryPolicy};
use crate::services::{FriendService, ProfileService, WeightLogService, WorkoutService};
use crate::store::{LocalStore, SqliteStore};
use crate::sync::{SyncReport, SyncService};
use crate::types::{
  Friend, FriendRequest, UserProfile, WeightLogEntry, Workout, WorkoutPlan,
};

/// Offline-first fitness data client.
///
/// Wraps one shared synchronization service and exposes one method per
/// entity operation. Every method takes the caller's connectivity signal;
/// the remote store is only contacted when the caller reports being online
/// and the construction-time reachability probe succeeded.
pub struct FitClient {
  profile: ProfileService,
  workouts: WorkoutService,
  weight_log: WeightLogService,
  friends: FriendService,
  maintenance: tokio::task::JoinHandle<()>,
}

impl FitClient {
  /// Build the client from configuration: SQLite local store, HTTP remote
  /// gateway, connectivity probe, and the periodic cache sweep.
  pub async fn connect(config: &Config) -> Result<Self> {
    let data_dir = config.resolve_data_dir()?;
    let store = Arc::new(SqliteStore::open_at(&data_dir.join("store.db"))?);
    let remote = Arc::new(HttpRemoteGateway::new(
      &config.remote.url,
      Config::get_api_token().ok(),
    )?);
    let cache = Arc::new(
      CacheManager::new().with_default_ttl(Duration::minutes(config.cache.ttl_minutes)),
    );
    let retry = RetryPolicy::new(
      config.retry.max_attempts,
      StdDuration::from_millis(config.retry.base_delay_ms),
    );

    let service = Arc::new(SyncService::connect(cache, store, remote, retry).await);
    Ok(Self::from_service(service))
  }

  /// Build the client from explicit collaborators. Used by tests and
  /// embedders that bring their own storage or gateway.
  pub async fn with_parts(
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    cache: Arc<CacheManager>,
    retry: RetryPolicy,
  ) -> Self {
    let service = Arc::new(SyncService::connect(cache, store, remote, retry).await);
    Self::from_service(service)
  }

  fn from_service(service: Arc<SyncService>) -> Self {
    let maintenance = service.start_maintenance();
    Self {
      profile: ProfileService::new(service.clone()),
      workouts: WorkoutService::new(service.clone()),
      weight_log: WeightLogService::new(service.clone()),
      friends: FriendService::new(service),
      maintenance,
    }
  }

  // --- profile ---

  pub async fn save_profile(&self, profile: UserProfile, online: bool) -> ApiResult<UserProfile> {
    self.profile.save_profile(profile, online).await
  }

  pub async fn get_profile(&self, uid: &str, online: bool) -> ApiResult<Option<UserProfile>> {
    self.profile.get_profile(uid, online).await
  }

  pub async fn delete_profile(&self, uid: &str, online: bool) -> ApiResult<()> {
    self.profile.delete_profile(uid, online).await
  }

  // --- weight log ---

  pub async fn log_weight(&self, entry: WeightLogEntry, online: bool) -> ApiResult<WeightLogEntry> {
    self.weight_log.log_weight(entry, online).await
  }

  pub async fn get_weight_log(
    &self,
    user_id: &str,
    online: bool,
  ) -> ApiResult<Vec<WeightLogEntry>> {
    self.weight_log.get_weight_log(user_id, online).await
  }

  pub async fn update_weight_entry(
    &self,
    entry: WeightLogEntry,
    online: bool,
  ) -> ApiResult<WeightLogEntry> {
    self.weight_log.update_entry(entry, online).await
  }

  pub async fn delete_weight_entry(
    &self,
    user_id: &str,
    id: &str,
    online: bool,
  ) -> ApiResult<()> {
    self.weight_log.delete_entry(user_id, id, online).await
  }

  // --- workouts ---

  pub async fn save_workout(&self, workout: Workout, online: bool) -> ApiResult<Workout> {
    self.workouts.save_workout(workout, online).await
  }

  pub async fn get_workouts(&self, user_id: &str, online: bool) -> ApiResult<Vec<Workout>> {
    self.workouts.get_workouts(user_id, online).await
  }

  pub async fn get_workout(
    &self,
    user_id: &str,
    id: &str,
    online: bool,
  ) -> ApiResult<Option<Workout>> {
    self.workouts.get_workout(user_id, id, online).await
  }

  pub async fn update_workout(&self, workout: Workout, online: bool) -> ApiResult<Workout> {
    self.workouts.update_workout(workout, online).await
  }

  pub async fn delete_workout(&self, user_id: &str, id: &str, online: bool) -> ApiResult<()> {
    self.workouts.delete_workout(user_id, id, online).await
  }

  pub async fn sync_workouts(&self, user_id: &str, online: bool) -> ApiResult<SyncReport> {
    self.workouts.sync_workouts(user_id, online).await
  }

  // --- workout plans ---

  pub async fn save_workout_plan(&self, plan: WorkoutPlan, online: bool) -> ApiResult<WorkoutPlan> {
    self.workouts.save_plan(plan, online).await
  }

  pub async fn get_workout_plans(
    &self,
    user_id: &str,
    online: bool,
  ) -> ApiResult<Vec<WorkoutPlan>> {
    self.workouts.get_plans(user_id, online).await
  }

  pub async fn update_workout_plan(
    &self,
    plan: WorkoutPlan,
    online: bool,
  ) -> ApiResult<WorkoutPlan> {
    self.workouts.update_plan(plan, online).await
  }

  pub async fn delete_workout_plan(&self, user_id: &str, id: &str, online: bool) -> ApiResult<()> {
    self.workouts.delete_plan(user_id, id, online).await
  }

  pub async fn sync_workout_plans(&self, user_id: &str, online: bool) -> ApiResult<SyncReport> {
    self.workouts.sync_plans(user_id, online).await
  }

  // --- friend graph ---

  pub async fn send_friend_request(
    &self,
    from_uid: &str,
    to_uid: &str,
    online: bool,
  ) -> ApiResult<FriendRequest> {
    self.friends.send_request(from_uid, to_uid, online).await
  }

  pub async fn accept_friend_request(
    &self,
    request_id: &str,
    acting_uid: &str,
    online: bool,
  ) -> ApiResult<()> {
    self.friends.accept_request(request_id, acting_uid, online).await
  }

  pub async fn reject_friend_request(
    &self,
    request_id: &str,
    acting_uid: &str,
    online: bool,
  ) -> ApiResult<()> {
    self.friends.reject_request(request_id, acting_uid, online).await
  }

  pub async fn list_friend_requests(
    &self,
    uid: &str,
    online: bool,
  ) -> ApiResult<Vec<FriendRequest>> {
    self.friends.list_incoming_requests(uid, online).await
  }

  pub async fn get_friends(&self, uid: &str, online: bool) -> ApiResult<Vec<Friend>> {
    self.friends.get_friends(uid, online).await
  }

  pub async fn remove_friend(
    &self,
    uid: &str,
    friend_uid: &str,
    online: bool,
  ) -> ApiResult<()> {
    self.friends.remove_friend(uid, friend_uid, online).await
  }
}

impl Drop for FitClient {
  fn drop(&mut self) {
    self.maintenance.abort();
  }
}
