//! Injectable time source for deterministic cache expiry in tests.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Time source used by the cache manager for all expiry decisions.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Manually advanced clock for tests.
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  /// Move time forward.
  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().expect("clock lock poisoned");
    *now += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().expect("clock lock poisoned")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_manual_clock_advances() {
    let clock = ManualClock::new(Utc::now());
    let before = clock.now();
    clock.advance(Duration::minutes(5));
    assert_eq!(clock.now() - before, Duration::minutes(5));
  }
}
