//! Wall-clock abstraction so timestamp defaulting is testable.

use std::ops::Add;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use crate::model::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> Timestamp {
        self.now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// The system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually-advanced clock for deterministic tests.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap()
    }
}

impl MockClock {
    /// Creates a clock frozen at the given time.
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    /// Creates a clock frozen at the given millisecond timestamp.
    pub fn at_millis(millis: Timestamp) -> Self {
        Self::with_time(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap();
        *now = now.add(duration);
    }
}
