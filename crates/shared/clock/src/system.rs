use candela_ports::Clock;
use chrono::{DateTime, Utc};

/// Real system clock for production use
///
/// This simply returns the current wall-clock time.
/// Use this in production where you want real-time behavior.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::thread;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let time1 = clock.now();
        thread::sleep(std::time::Duration::from_millis(10));
        let time2 = clock.now();

        assert!(time2 > time1);
        let diff = time2 - time1;
        assert!(diff >= Duration::milliseconds(9));
    }

    #[test]
    fn test_now_ms_matches_now() {
        let clock = SystemClock::new();
        let ms = clock.now_ms();
        let dt = clock.now();
        assert!(dt.timestamp_millis() >= ms);
    }
}
