//! Wall-clock access for retry gating.
//!
//! Production code reads [SystemClock]. Tests use [ManualClock], which starts paused at the unix epoch and only moves
//! when told to, so that retry windows can be crossed deterministically.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A fake clock. Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Offset from the `UNIX_EPOCH`.
    current: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Create a clock paused at the unix epoch.
    pub fn pause_at_epoch() -> Self {
        ManualClock {
            current: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the fake time by this duration.
    pub fn advance(&self, delta: Duration) {
        *self.current.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + *self.current.lock()
    }
}
