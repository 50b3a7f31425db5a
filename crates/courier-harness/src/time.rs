//! Manual clock for deterministic tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use courier_core::{TimeSource, Timestamp};

/// Time source that only moves when told to
///
/// Clones share the same clock, so a test can keep one copy and hand another
/// to the event loop.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    current_time: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(millis: u64) -> Self {
        Self {
            current_time: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Advance time by the specified number of milliseconds
    pub fn advance(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}
