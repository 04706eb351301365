//! Result types returned across the service boundary.
//!
//! Every facade and entity-service operation returns [`ApiResult`]. Transport
//! and storage failures are mapped into an [`ApiError`] with a stable code;
//! nothing below the facade panics or leaks a raw transport error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type for every public service operation.
pub type ApiResult<T> = Result<T, ApiError>;

/// Stable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
  /// A required input field was absent or empty.
  MissingRequiredField,
  /// Input was present but failed validation (shape, range, or state).
  ValidationFailed,
  /// The requested identity exists in neither cache nor local store.
  NotFound,
  /// The operation intrinsically requires connectivity and none was available.
  OfflineWriteRejected,
  /// Catch-all wrapping an underlying storage or transport failure.
  OperationFailed,
}

/// Error surfaced by a service operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
  pub code: ErrorCode,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<Value>,
}

impl ApiError {
  pub fn missing_field(field: &str) -> Self {
    Self {
      code: ErrorCode::MissingRequiredField,
      message: format!("Missing required field: {}", field),
      details: None,
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self {
      code: ErrorCode::ValidationFailed,
      message: message.into(),
      details: None,
    }
  }

  pub fn not_found(what: impl Into<String>) -> Self {
    Self {
      code: ErrorCode::NotFound,
      message: format!("Not found: {}", what.into()),
      details: None,
    }
  }

  pub fn offline(operation: &str) -> Self {
    Self {
      code: ErrorCode::OfflineWriteRejected,
      message: format!("{} requires an active connection", operation),
      details: None,
    }
  }

  pub fn operation_failed(message: impl Into<String>) -> Self {
    Self {
      code: ErrorCode::OperationFailed,
      message: message.into(),
      details: None,
    }
  }

  /// Attach structured context to the error.
  pub fn with_details(mut self, details: Value) -> Self {
    self.details = Some(details);
    self
  }
}

impl std::fmt::Display for ApiError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl std::error::Error for ApiError {}
