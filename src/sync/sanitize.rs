//! Sanitization of untrusted remote documents.
//!
//! Remote documents arrive as loose JSON. Before they touch the cache or the
//! local store, structured timestamp representations are normalized to
//! canonical RFC 3339 strings and unknown fields are dropped by
//! round-tripping through the typed entity.

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Recursively replace `{seconds, nanoseconds}`-shaped objects with RFC 3339
/// strings. Handles the `nanos` and underscore-prefixed spellings some
/// document stores emit.
pub fn normalize_timestamps(value: Value) -> Value {
  match value {
    Value::Object(map) => {
      if let Some(ts) = timestamp_from_map(&map) {
        return Value::String(ts);
      }
      Value::Object(
        map
          .into_iter()
          .map(|(k, v)| (k, normalize_timestamps(v)))
          .collect(),
      )
    }
    Value::Array(items) => {
      Value::Array(items.into_iter().map(normalize_timestamps).collect())
    }
    other => other,
  }
}

const TIMESTAMP_KEYS: [&str; 5] = [
  "seconds",
  "nanoseconds",
  "nanos",
  "_seconds",
  "_nanoseconds",
];

fn timestamp_from_map(map: &serde_json::Map<String, Value>) -> Option<String> {
  // Only a pure timestamp object qualifies; anything with other keys is a
  // regular document that happens to contain a "seconds" field.
  if map.is_empty() || !map.keys().all(|k| TIMESTAMP_KEYS.contains(&k.as_str())) {
    return None;
  }

  let seconds = field_i64(map, &["seconds", "_seconds"])?;
  let nanos = field_i64(map, &["nanoseconds", "nanos", "_nanoseconds"]).unwrap_or(0);

  Utc
    .timestamp_opt(seconds, nanos.clamp(0, 999_999_999) as u32)
    .single()
    .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn field_i64(map: &serde_json::Map<String, Value>, names: &[&str]) -> Option<i64> {
  names.iter().find_map(|n| map.get(*n).and_then(Value::as_i64))
}

/// Normalize a remote document and deserialize it into its entity type,
/// dropping any fields the entity does not carry. Returns `None` (and logs)
/// when the document cannot be shaped into the entity at all.
pub fn sanitize_into<T: DeserializeOwned>(value: Value) -> Option<T> {
  let normalized = normalize_timestamps(value);
  match serde_json::from_value(normalized) {
    Ok(entity) => Some(entity),
    Err(e) => {
      warn!(error = %e, "discarding malformed remote document");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::WeightLogEntry;
  use serde_json::json;

  #[test]
  fn test_timestamp_objects_become_rfc3339_strings() {
    let doc = json!({
      "id": "w1",
      "updated_at": {"seconds": 1704067200, "nanoseconds": 0},
      "nested": {"created_at": {"_seconds": 1704067200, "_nanoseconds": 500000000}}
    });

    let normalized = normalize_timestamps(doc);
    assert_eq!(normalized["updated_at"], "2024-01-01T00:00:00.000Z");
    assert_eq!(normalized["nested"]["created_at"], "2024-01-01T00:00:00.500Z");
  }

  #[test]
  fn test_documents_with_extra_keys_are_left_alone() {
    let doc = json!({"seconds": 30, "reps": 10, "name": "plank"});
    assert_eq!(normalize_timestamps(doc.clone()), doc);
  }

  #[test]
  fn test_string_timestamps_pass_through() {
    let doc = json!({"updated_at": "2024-01-01T00:00:00.000Z"});
    assert_eq!(normalize_timestamps(doc.clone()), doc);
  }

  #[test]
  fn test_sanitize_drops_unknown_fields() {
    let doc = json!({
      "id": "wl-2024-01-01",
      "user_id": "u1",
      "date": "2024-01-01",
      "weight": 80.0,
      "__internal_marker": true
    });

    let entry: WeightLogEntry = sanitize_into(doc).unwrap();
    assert_eq!(entry.weight, 80.0);
    let back = serde_json::to_value(&entry).unwrap();
    assert!(back.get("__internal_marker").is_none());
  }

  #[test]
  fn test_unshapeable_document_is_discarded() {
    let doc = json!({"user_id": "u1"});
    // Missing required `date`/`weight` fields.
    assert!(sanitize_into::<WeightLogEntry>(doc).is_none());
  }
}
