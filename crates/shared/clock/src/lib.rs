//! Candela Clock Infrastructure
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: frozen time that only moves when a test says so
//!
//! ```ignore
//! use candela_clock::ManualClock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::at_ms(1_700_000_000_000);
//! clock.advance(Duration::minutes(5));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use candela_ports::Clock;
