use candela_core::TimestampMs;
use chrono::{DateTime, Utc};

/// Port for time abstraction
///
/// This allows the system to use different time sources:
/// - Real system time for production
/// - Fixed or manually advanced time for deterministic tests
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> DateTime<Utc>;

    /// Current time as epoch milliseconds
    fn now_ms(&self) -> TimestampMs {
        self.now().timestamp_millis()
    }

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
