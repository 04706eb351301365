//! Domain entities for the fitness tracker.
//!
//! All timestamps are canonical RFC 3339 strings in UTC; remote documents are
//! normalized to this form before they reach these types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for entities persisted in the local store and reconciled with the
/// remote document store.
pub trait SyncRecord: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this record within its collection.
  fn record_id(&self) -> &str;

  /// Owning user id.
  fn user_id(&self) -> &str;

  /// Last modification timestamp (RFC 3339).
  fn updated_at(&self) -> &str;

  /// Assign the identity. Called exactly once, on first write.
  fn set_record_id(&mut self, id: String);

  /// Record type name for storage organization and logging (e.g., "workout").
  fn record_type() -> &'static str;
}

/// Current time as a canonical RFC 3339 string.
pub fn now_timestamp() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a canonical timestamp, returning None for anything malformed.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

static LOCAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate an id for a record created while offline.
///
/// The id is permanent: reconciliation pushes it verbatim, so callers holding
/// it never see it rewritten. SHA-256 over (uid, clock nanos, counter) keeps
/// ids stable-length and collision-resistant across restarts.
pub fn local_record_id(uid: &str) -> String {
  let counter = LOCAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
  let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

  let mut hasher = Sha256::new();
  hasher.update(uid.as_bytes());
  hasher.update(nanos.to_le_bytes());
  hasher.update(counter.to_le_bytes());
  let digest = hasher.finalize();

  format!("local-{}", &hex::encode(digest)[..16])
}

// ============================================================================
// Profile
// ============================================================================

/// User-tunable settings carried on the profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
  /// "metric" or "imperial"
  #[serde(default)]
  pub unit_system: Option<String>,
  #[serde(default)]
  pub notifications_enabled: Option<bool>,
}

/// A user's profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub uid: String,
  pub email: String,
  pub username: String,
  #[serde(default)]
  pub profile_image: Option<String>,
  /// Body weight in kilograms.
  #[serde(default)]
  pub weight: Option<f64>,
  /// Height in centimeters.
  #[serde(default)]
  pub height: Option<f64>,
  #[serde(default)]
  pub age: Option<u32>,
  #[serde(default)]
  pub gender: Option<String>,
  #[serde(default)]
  pub settings: UserSettings,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

impl SyncRecord for UserProfile {
  fn record_id(&self) -> &str {
    &self.uid
  }

  fn user_id(&self) -> &str {
    &self.uid
  }

  fn updated_at(&self) -> &str {
    &self.updated_at
  }

  fn set_record_id(&mut self, id: String) {
    self.uid = id;
  }

  fn record_type() -> &'static str {
    "profile"
  }
}

// ============================================================================
// Workouts
// ============================================================================

/// One set within a performed exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
  pub weight: f64,
  pub reps: u32,
}

/// An exercise performed during a workout, with its sets in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformedExercise {
  pub exercise_id: String,
  pub name: String,
  pub sets: Vec<ExerciseSet>,
}

/// A completed workout session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workout {
  #[serde(default)]
  pub id: String,
  pub user_id: String,
  pub name: String,
  #[serde(default)]
  pub exercises: Vec<PerformedExercise>,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub performed_at: String,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

impl SyncRecord for Workout {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn user_id(&self) -> &str {
    &self.user_id
  }

  fn updated_at(&self) -> &str {
    &self.updated_at
  }

  fn set_record_id(&mut self, id: String) {
    self.id = id;
  }

  fn record_type() -> &'static str {
    "workout"
  }
}

/// A planned exercise inside a workout template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedExercise {
  pub exercise_id: String,
  pub name: String,
  pub sets: u32,
  pub reps: u32,
}

/// A reusable workout template. Carries no performance data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
  #[serde(default)]
  pub id: String,
  pub user_id: String,
  pub name: String,
  #[serde(default)]
  pub exercises: Vec<PlannedExercise>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

impl SyncRecord for WorkoutPlan {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn user_id(&self) -> &str {
    &self.user_id
  }

  fn updated_at(&self) -> &str {
    &self.updated_at
  }

  fn set_record_id(&mut self, id: String) {
    self.id = id;
  }

  fn record_type() -> &'static str {
    "workout_plan"
  }
}

// ============================================================================
// Weight log
// ============================================================================

/// One body-weight measurement. One entry per calendar date per user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightLogEntry {
  #[serde(default)]
  pub id: String,
  pub user_id: String,
  /// Calendar date, `YYYY-MM-DD`.
  pub date: String,
  /// Body weight in kilograms.
  pub weight: f64,
  /// Delta from the chronologically preceding entry, computed at write time.
  #[serde(default)]
  pub change: f64,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

impl SyncRecord for WeightLogEntry {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn user_id(&self) -> &str {
    &self.user_id
  }

  fn updated_at(&self) -> &str {
    &self.updated_at
  }

  fn set_record_id(&mut self, id: String) {
    self.id = id;
  }

  fn record_type() -> &'static str {
    "weight_log_entry"
  }
}

// ============================================================================
// Friend graph
// ============================================================================

/// Status of a friend request. Terminal once non-pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
  Pending,
  Accepted,
  Rejected,
}

/// A one-directional friend request from `from_uid` to `to_uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
  #[serde(default)]
  pub id: String,
  pub from_uid: String,
  pub to_uid: String,
  pub status: FriendRequestStatus,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

/// One direction of a friendship, stored under the owning user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
  pub uid: String,
  #[serde(default)]
  pub username: String,
  /// When the friendship was established (RFC 3339).
  #[serde(default)]
  pub since: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_local_record_ids_are_unique_and_prefixed() {
    let a = local_record_id("u1");
    let b = local_record_id("u1");
    assert!(a.starts_with("local-"));
    assert!(b.starts_with("local-"));
    assert_ne!(a, b);
    assert_eq!(a.len(), "local-".len() + 16);
  }

  #[test]
  fn test_timestamp_roundtrip() {
    let ts = now_timestamp();
    let parsed = parse_timestamp(&ts).expect("canonical timestamp should parse");
    assert_eq!(
      parsed.to_rfc3339_opts(SecondsFormat::Millis, true),
      ts
    );
  }

  #[test]
  fn test_workout_serde_defaults() {
    let json = r#"{"user_id": "u1", "name": "Push day"}"#;
    let workout: Workout = serde_json::from_str(json).unwrap();
    assert_eq!(workout.id, "");
    assert!(workout.exercises.is_empty());
    assert_eq!(workout.user_id, "u1");
  }

  #[test]
  fn test_friend_request_status_serializes_lowercase() {
    let status = serde_json::to_value(FriendRequestStatus::Pending).unwrap();
    assert_eq!(status, "pending");
  }
}
