use candela_core::TimestampMs;
use candela_ports::Clock;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Clock that stands still until told otherwise.
///
/// Cloning shares the underlying time, so a test can keep one handle and
/// give another to the code under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
        }
    }

    /// Start at an epoch-millisecond timestamp. Out-of-range values start at the epoch.
    pub fn at_ms(ts: TimestampMs) -> Self {
        Self::new(DateTime::from_timestamp_millis(ts).unwrap_or(DateTime::UNIX_EPOCH))
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write();
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.write() = to;
    }

    pub fn set_ms(&self, ts: TimestampMs) {
        if let Some(dt) = DateTime::from_timestamp_millis(ts) {
            self.set(dt);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
