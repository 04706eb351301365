//! Bounded retry with exponential backoff for transient remote failures.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::RemoteError;

/// Retry budget for remote operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub max_attempts: u32,
  /// Base backoff delay; the delay before retry `n` is `base * 2^n`.
  pub base_delay: Duration,
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts,
      base_delay,
    }
  }

  /// Delay before the given retry (1-indexed; the first attempt has none).
  pub fn delay_for_retry(&self, retry: u32) -> Duration {
    if retry == 0 {
      return Duration::ZERO;
    }
    self.base_delay * 2u32.saturating_pow(retry)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(3, Duration::from_millis(200))
  }
}

/// Run an operation, retrying transient failures up to the policy's budget.
///
/// Non-transient errors propagate immediately. After the budget is exhausted
/// the last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RemoteError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, RemoteError>>,
{
  let mut attempt = 0u32;

  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
        attempt += 1;
        let delay = policy.delay_for_retry(attempt);
        debug!(
          retry = attempt,
          delay_ms = delay.as_millis() as u64,
          error = %e,
          "transient remote failure, backing off"
        );
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}
