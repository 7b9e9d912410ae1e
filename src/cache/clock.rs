//! Time source used by the response cache.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
  use super::Clock;
  use chrono::{DateTime, Duration, Utc};
  use std::sync::{Mutex, PoisonError};

  /// Clock that only moves when told to.
  #[derive(Debug)]
  pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
  }

  impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
      Self {
        now: Mutex::new(start),
      }
    }

    pub fn advance(&self, by: Duration) {
      let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
      *now += by;
    }
  }

  impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
      *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
  }
}
