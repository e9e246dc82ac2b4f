//! Time source for record timestamps and election windows.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        // A poisoned lock still holds a valid timestamp.
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = time;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
