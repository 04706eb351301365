//! Workout and workout-plan service.
//!
//! Both entities live in per-user subcollections and share the same
//! lifecycle: local-first writes, record-wise merged reads, and an explicit
//! reconciliation pass that pushes offline work and pulls remote changes.

use std::sync::Arc;

use crate::api::{ApiError, ApiResult};
use crate::remote::user_collection;
use crate::store::StorageKey;
use crate::sync::{SyncReport, SyncService};
use crate::types::{now_timestamp, parse_timestamp, Workout, WorkoutPlan};

fn workouts_cache_key(user_id: &str) -> String {
  format!("workouts:{}", user_id)
}

fn plans_cache_key(user_id: &str) -> String {
  format!("workout-plans:{}", user_id)
}

fn workouts_collection(user_id: &str) -> String {
  user_collection(user_id, "workouts")
}

fn plans_collection(user_id: &str) -> String {
  user_collection(user_id, "workout-plans")
}

/// CRUD and reconciliation for workouts and workout plans.
#[derive(Clone)]
pub struct WorkoutService {
  service: Arc<SyncService>,
}

impl WorkoutService {
  pub fn new(service: Arc<SyncService>) -> Self {
    Self { service }
  }

  fn validate_workout(workout: &Workout) -> ApiResult<()> {
    if workout.user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }
    if workout.name.is_empty() {
      return Err(ApiError::missing_field("name"));
    }
    for exercise in &workout.exercises {
      if exercise.name.is_empty() {
        return Err(ApiError::validation("exercise name must not be empty"));
      }
      for set in &exercise.sets {
        if set.reps == 0 {
          return Err(ApiError::validation("set reps must be positive"));
        }
        if set.weight < 0.0 {
          return Err(ApiError::validation("set weight must not be negative"));
        }
      }
    }
    Ok(())
  }

  fn validate_plan(plan: &WorkoutPlan) -> ApiResult<()> {
    if plan.user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }
    if plan.name.is_empty() {
      return Err(ApiError::missing_field("name"));
    }
    for exercise in &plan.exercises {
      if exercise.name.is_empty() {
        return Err(ApiError::validation("exercise name must not be empty"));
      }
      if exercise.sets == 0 || exercise.reps == 0 {
        return Err(ApiError::validation("planned sets and reps must be positive"));
      }
    }
    Ok(())
  }

  // ==========================================================================
  // Workouts
  // ==========================================================================

  /// Save a workout. New workouts get their id from the remote gateway when
  /// online, or a locally generated id otherwise.
  pub async fn save_workout(&self, mut workout: Workout, online: bool) -> ApiResult<Workout> {
    Self::validate_workout(&workout)?;

    let now = now_timestamp();
    if workout.performed_at.is_empty() {
      workout.performed_at = now.clone();
    }
    if workout.created_at.is_empty() {
      workout.created_at = now.clone();
    }
    workout.updated_at = now;

    let collection = workouts_collection(&workout.user_id);
    self
      .service
      .ensure_record_id(&mut workout, &collection, online)
      .await;

    let cache_key = workouts_cache_key(&workout.user_id);
    self
      .service
      .write_record(
        StorageKey::WorkoutHistory,
        &[cache_key],
        online,
        workout,
        &collection,
      )
      .await
  }

  /// Update an existing workout. The identity must already be known locally.
  pub async fn update_workout(&self, mut workout: Workout, online: bool) -> ApiResult<Workout> {
    if workout.id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }
    Self::validate_workout(&workout)?;

    let existing: Vec<Workout> = self.service.load_records(StorageKey::WorkoutHistory).await;
    if !existing
      .iter()
      .any(|w| w.user_id == workout.user_id && w.id == workout.id)
    {
      return Err(ApiError::not_found(format!("workout {}", workout.id)));
    }

    workout.updated_at = now_timestamp();
    let collection = workouts_collection(&workout.user_id);
    let cache_key = workouts_cache_key(&workout.user_id);
    self
      .service
      .write_record(
        StorageKey::WorkoutHistory,
        &[cache_key],
        online,
        workout,
        &collection,
      )
      .await
  }

  /// All of a user's workouts, newest first.
  pub async fn get_workouts(&self, user_id: &str, online: bool) -> ApiResult<Vec<Workout>> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }

    let service = self.service.clone();
    let collection = workouts_collection(user_id);
    let mut workouts = self
      .service
      .cached_read_list(
        &workouts_cache_key(user_id),
        StorageKey::WorkoutHistory,
        online,
        user_id,
        || async move { service.remote_get_collection(&collection, &[]).await },
      )
      .await?;

    workouts.sort_by(|a: &Workout, b| {
      let a_ts = parse_timestamp(&a.performed_at);
      let b_ts = parse_timestamp(&b.performed_at);
      b_ts.cmp(&a_ts)
    });
    Ok(workouts)
  }

  /// A single workout by id.
  pub async fn get_workout(
    &self,
    user_id: &str,
    id: &str,
    online: bool,
  ) -> ApiResult<Option<Workout>> {
    if id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }
    let workouts = self.get_workouts(user_id, online).await?;
    Ok(workouts.into_iter().find(|w| w.id == id))
  }

  /// Delete a workout locally, and remotely when online.
  pub async fn delete_workout(&self, user_id: &str, id: &str, online: bool) -> ApiResult<()> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }
    if id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }

    self
      .service
      .delete_record::<Workout>(
        StorageKey::WorkoutHistory,
        &[workouts_cache_key(user_id)],
        online,
        &workouts_collection(user_id),
        user_id,
        id,
      )
      .await
  }

  /// Reconcile the user's workout history with the remote store.
  pub async fn sync_workouts(&self, user_id: &str, online: bool) -> ApiResult<SyncReport> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }

    self
      .service
      .sync_user_collection::<Workout>(
        StorageKey::WorkoutHistory,
        &workouts_cache_key(user_id),
        online,
        user_id,
        &workouts_collection(user_id),
      )
      .await
  }

  // ==========================================================================
  // Workout plans
  // ==========================================================================

  /// Save a workout plan. Id assignment follows the workout rules.
  pub async fn save_plan(&self, mut plan: WorkoutPlan, online: bool) -> ApiResult<WorkoutPlan> {
    Self::validate_plan(&plan)?;

    let now = now_timestamp();
    if plan.created_at.is_empty() {
      plan.created_at = now.clone();
    }
    plan.updated_at = now;

    let collection = plans_collection(&plan.user_id);
    self
      .service
      .ensure_record_id(&mut plan, &collection, online)
      .await;

    let cache_key = plans_cache_key(&plan.user_id);
    self
      .service
      .write_record(
        StorageKey::WorkoutPlans,
        &[cache_key],
        online,
        plan,
        &collection,
      )
      .await
  }

  /// Update an existing plan.
  pub async fn update_plan(&self, mut plan: WorkoutPlan, online: bool) -> ApiResult<WorkoutPlan> {
    if plan.id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }
    Self::validate_plan(&plan)?;

    let existing: Vec<WorkoutPlan> = self.service.load_records(StorageKey::WorkoutPlans).await;
    if !existing
      .iter()
      .any(|p| p.user_id == plan.user_id && p.id == plan.id)
    {
      return Err(ApiError::not_found(format!("workout plan {}", plan.id)));
    }

    plan.updated_at = now_timestamp();
    let collection = plans_collection(&plan.user_id);
    let cache_key = plans_cache_key(&plan.user_id);
    self
      .service
      .write_record(
        StorageKey::WorkoutPlans,
        &[cache_key],
        online,
        plan,
        &collection,
      )
      .await
  }

  /// All of a user's plans.
  pub async fn get_plans(&self, user_id: &str, online: bool) -> ApiResult<Vec<WorkoutPlan>> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }

    let service = self.service.clone();
    let collection = plans_collection(user_id);
    self
      .service
      .cached_read_list(
        &plans_cache_key(user_id),
        StorageKey::WorkoutPlans,
        online,
        user_id,
        || async move { service.remote_get_collection(&collection, &[]).await },
      )
      .await
  }

  /// Delete a plan locally, and remotely when online.
  pub async fn delete_plan(&self, user_id: &str, id: &str, online: bool) -> ApiResult<()> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }
    if id.is_empty() {
      return Err(ApiError::missing_field("id"));
    }

    self
      .service
      .delete_record::<WorkoutPlan>(
        StorageKey::WorkoutPlans,
        &[plans_cache_key(user_id)],
        online,
        &plans_collection(user_id),
        user_id,
        id,
      )
      .await
  }

  /// Reconcile the user's plans with the remote store.
  pub async fn sync_plans(&self, user_id: &str, online: bool) -> ApiResult<SyncReport> {
    if user_id.is_empty() {
      return Err(ApiError::missing_field("user_id"));
    }

    self
      .service
      .sync_user_collection::<WorkoutPlan>(
        StorageKey::WorkoutPlans,
        &plans_cache_key(user_id),
        online,
        user_id,
        &plans_collection(user_id),
      )
      .await
  }
}
