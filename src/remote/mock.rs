//! In-memory remote gateway for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{Filter, RemoteError, RemoteErrorKind, RemoteGateway};

/// Remote gateway backed by nested maps, with failure injection.
pub struct MockRemoteGateway {
  collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
  next_id: AtomicU64,
  reachable: AtomicBool,
  /// Remaining calls that will fail with the configured kind.
  failures: Mutex<(u32, RemoteErrorKind)>,
}

impl MockRemoteGateway {
  pub fn new() -> Self {
    Self {
      collections: Mutex::new(HashMap::new()),
      next_id: AtomicU64::new(1),
      reachable: AtomicBool::new(true),
      failures: Mutex::new((0, RemoteErrorKind::Network)),
    }
  }

  /// Control what the construction-time probe reports.
  pub fn set_reachable(&self, reachable: bool) {
    self.reachable.store(reachable, Ordering::SeqCst);
  }

  /// Make the next `count` operations fail with the given kind.
  pub fn fail_next(&self, count: u32, kind: RemoteErrorKind) {
    let mut failures = self.failures.lock().expect("mock lock poisoned");
    *failures = (count, kind);
  }

  /// Seed a document directly, bypassing failure injection.
  pub fn insert(&self, collection: &str, id: &str, value: Value) {
    let mut collections = self.collections.lock().expect("mock lock poisoned");
    collections
      .entry(collection.to_string())
      .or_default()
      .insert(id.to_string(), value);
  }

  /// Inspect a document directly.
  pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
    let collections = self.collections.lock().expect("mock lock poisoned");
    collections.get(collection)?.get(id).cloned()
  }

  /// Number of documents in a collection.
  pub fn count(&self, collection: &str) -> usize {
    let collections = self.collections.lock().expect("mock lock poisoned");
    collections.get(collection).map_or(0, |c| c.len())
  }

  fn check_failure(&self) -> Result<(), RemoteError> {
    let mut failures = self.failures.lock().expect("mock lock poisoned");
    if failures.0 > 0 {
      failures.0 -= 1;
      return Err(RemoteError::new(failures.1, "injected failure"));
    }
    Ok(())
  }

  fn matches(doc: &Value, filters: &[Filter]) -> bool {
    filters
      .iter()
      .all(|f| doc.get(&f.field) == Some(&f.value))
  }
}

#[async_trait]
impl RemoteGateway for MockRemoteGateway {
  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
    self.check_failure()?;
    Ok(self.document(collection, id))
  }

  async fn get_collection(
    &self,
    collection: &str,
    filters: &[Filter],
  ) -> Result<Vec<Value>, RemoteError> {
    self.check_failure()?;
    let collections = self.collections.lock().expect("mock lock poisoned");
    let docs = collections
      .get(collection)
      .map(|c| {
        c.values()
          .filter(|doc| Self::matches(doc, filters))
          .cloned()
          .collect()
      })
      .unwrap_or_default();
    Ok(docs)
  }

  async fn set_document(
    &self,
    collection: &str,
    id: &str,
    data: &Value,
  ) -> Result<(), RemoteError> {
    self.check_failure()?;
    self.insert(collection, id, data.clone());
    Ok(())
  }

  async fn update_document(
    &self,
    collection: &str,
    id: &str,
    patch: &Value,
  ) -> Result<(), RemoteError> {
    self.check_failure()?;
    let mut collections = self.collections.lock().expect("mock lock poisoned");
    let doc = collections
      .get_mut(collection)
      .and_then(|c| c.get_mut(id))
      .ok_or_else(|| RemoteError::not_found(format!("{}/{}", collection, id)))?;

    if let (Some(doc_map), Some(patch_map)) = (doc.as_object_mut(), patch.as_object()) {
      for (k, v) in patch_map {
        doc_map.insert(k.clone(), v.clone());
      }
    }
    Ok(())
  }

  async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
    self.check_failure()?;
    let mut collections = self.collections.lock().expect("mock lock poisoned");
    let removed = collections
      .get_mut(collection)
      .and_then(|c| c.remove(id));
    match removed {
      Some(_) => Ok(()),
      None => Err(RemoteError::not_found(format!("{}/{}", collection, id))),
    }
  }

  async fn add_document(&self, collection: &str, data: &Value) -> Result<String, RemoteError> {
    self.check_failure()?;
    let id = format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst));
    self.insert(collection, &id, data.clone());
    Ok(id)
  }

  async fn probe(&self) -> bool {
    self.reachable.load(Ordering::SeqCst)
  }
}
