//! Remote document store access.
//!
//! The gateway abstracts a document store addressed by collection path and
//! document id. Per-user data lives under `users/{uid}/{subcollection}`.

mod http;
mod mock;
mod retry;

pub use http::HttpRemoteGateway;
pub use mock::MockRemoteGateway;
pub use retry::{with_retry, RetryPolicy};

use async_trait::async_trait;
use serde_json::Value;

/// Classification of a remote failure, driving retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
  /// Connection-level failure (DNS, refused, reset).
  Network,
  /// The request timed out.
  Timeout,
  /// Server-side failure (HTTP 5xx).
  Server,
  /// The document or collection does not exist.
  NotFound,
  /// The request was rejected (HTTP 4xx other than 404).
  Rejected,
  /// The response could not be decoded.
  Decode,
}

/// Error from a remote gateway operation.
#[derive(Debug, Clone)]
pub struct RemoteError {
  pub kind: RemoteErrorKind,
  pub message: String,
}

impl RemoteError {
  pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::Network, message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::NotFound, message)
  }

  /// Whether the failure is worth retrying.
  pub fn is_transient(&self) -> bool {
    matches!(
      self.kind,
      RemoteErrorKind::Network | RemoteErrorKind::Timeout | RemoteErrorKind::Server
    )
  }
}

impl std::fmt::Display for RemoteError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}: {}", self.kind, self.message)
  }
}

impl std::error::Error for RemoteError {}

/// Equality filter for collection queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub field: String,
  pub value: Value,
}

impl Filter {
  pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self {
      field: field.into(),
      value: value.into(),
    }
  }
}

/// Trait for remote document store backends.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
  /// Fetch a single document, `None` if absent.
  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError>;

  /// Fetch all documents in a collection matching every filter.
  async fn get_collection(
    &self,
    collection: &str,
    filters: &[Filter],
  ) -> Result<Vec<Value>, RemoteError>;

  /// Create or fully replace a document under a known id.
  async fn set_document(&self, collection: &str, id: &str, data: &Value)
    -> Result<(), RemoteError>;

  /// Apply a partial update to an existing document.
  async fn update_document(
    &self,
    collection: &str,
    id: &str,
    patch: &Value,
  ) -> Result<(), RemoteError>;

  /// Delete a document.
  async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

  /// Create a document with a store-generated id, returning the id.
  async fn add_document(&self, collection: &str, data: &Value) -> Result<String, RemoteError>;

  /// Cheap reachability check, run once at service construction.
  async fn probe(&self) -> bool;
}

/// Collection path for a user's subcollection.
pub fn user_collection(user_id: &str, subcollection: &str) -> String {
  format!("users/{}/{}", user_id, subcollection)
}
