//! Clock abstraction so stores can be driven with controlled time.
//!
//! Every instant handed out is truncated to microseconds, the precision the
//! SQLite backend persists. Comparisons made in memory and comparisons made in
//! SQL therefore see identical values.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Source of "now" for reading transitions, watermarks and item timestamps.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
  current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { current: Arc::new(Mutex::new(start.trunc_subsecs(6))) }
  }

  /// Move the clock forward by `by`.
  pub fn advance(&self, by: Duration) {
    let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
    *current = (*current + by).trunc_subsecs(6);
  }

  /// Jump to `at`, which may lie in the past.
  pub fn set(&self, at: DateTime<Utc>) {
    let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
    *current = at.trunc_subsecs(6);
  }
}

impl Default for ManualClock {
  fn default() -> Self { Self::new(Utc::now()) }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.current.lock().unwrap_or_else(|e| e.into_inner())
  }
}
