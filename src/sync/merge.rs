//! Merging of local and remote document values.
//!
//! Two layers: a generic overlay merge (`merge_data`) and a declarative
//! per-field policy table that entity services use to pin precedence for
//! specific fields. Production and test code share the same tables; merge
//! outcomes never depend on which environment is running.

use serde_json::{Map, Value};

use crate::types::parse_timestamp;

/// Shallow-merge `local` over `remote`.
///
/// Objects recurse; any other local value that is defined (non-null) wins
/// wholesale, including arrays (no element-wise merging).
pub fn merge_data(local: &Value, remote: &Value) -> Value {
  match (local, remote) {
    (Value::Object(l), Value::Object(r)) => {
      let mut merged: Map<String, Value> = r.clone();
      for (key, local_value) in l {
        if local_value.is_null() {
          continue;
        }
        let next = match merged.get(key) {
          Some(remote_value) if local_value.is_object() && remote_value.is_object() => {
            merge_data(local_value, remote_value)
          }
          _ => local_value.clone(),
        };
        merged.insert(key.clone(), next);
      }
      Value::Object(merged)
    }
    (Value::Null, _) => remote.clone(),
    (local, _) => local.clone(),
  }
}

/// Precedence rule for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
  /// The device-entered value is trusted over the server's.
  LocalWins,
  /// The server's value is authoritative.
  RemoteWins,
  /// The side whose record carries the newer `updated_at` wins.
  NewestWins,
}

/// Per-field merge precedence for one entity. Fields without a rule follow
/// the default local-overlay-on-remote behavior of [`merge_data`].
#[derive(Debug, Clone, Copy)]
pub struct MergePolicy {
  pub rules: &'static [(&'static str, FieldRule)],
}

impl MergePolicy {
  /// No per-field rules; plain overlay.
  pub const DEFAULT: MergePolicy = MergePolicy { rules: &[] };
}

/// Merge two records of the same identity under a policy.
///
/// `local` and `remote` are whole-record values; `NewestWins` compares their
/// top-level `updated_at` fields.
pub fn merge_with_policy(local: &Value, remote: &Value, policy: &MergePolicy) -> Value {
  let mut merged = merge_data(local, remote);
  let local_newer = record_is_newer(local, remote);

  if let Value::Object(ref mut merged_map) = merged {
    for (field, rule) in policy.rules {
      let winner = match rule {
        FieldRule::LocalWins => defined(local.get(*field)).or_else(|| defined(remote.get(*field))),
        FieldRule::RemoteWins => {
          defined(remote.get(*field)).or_else(|| defined(local.get(*field)))
        }
        FieldRule::NewestWins => {
          let (newer, older) = if local_newer {
            (local, remote)
          } else {
            (remote, local)
          };
          defined(newer.get(*field)).or_else(|| defined(older.get(*field)))
        }
      };

      match winner {
        Some(value) => {
          merged_map.insert((*field).to_string(), value.clone());
        }
        None => {
          merged_map.remove(*field);
        }
      }
    }
  }

  merged
}

/// True when `local`'s `updated_at` is strictly newer. Ties and unparseable
/// timestamps fall to remote.
pub fn record_is_newer(local: &Value, remote: &Value) -> bool {
  let local_ts = local
    .get("updated_at")
    .and_then(Value::as_str)
    .and_then(parse_timestamp);
  let remote_ts = remote
    .get("updated_at")
    .and_then(Value::as_str)
    .and_then(parse_timestamp);

  match (local_ts, remote_ts) {
    (Some(l), Some(r)) => l > r,
    (Some(_), None) => true,
    _ => false,
  }
}

fn defined(value: Option<&Value>) -> Option<&Value> {
  value.filter(|v| !v.is_null())
}
