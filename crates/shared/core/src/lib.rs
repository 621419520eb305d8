//! Candela Core Domain
//!
//! Exchange-independent market data types: the unified candle, timeframes,
//! quotes and trade prints.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod error;
pub mod exchange;
pub mod timeframe;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{Ticker, Trade, UnifiedCandle, change_from_percent};
pub use error::{CoreError, CoreResult};
pub use exchange::{CandleKey, ExchangeId};
pub use timeframe::Timeframe;
pub use values::{MINUTE_MS, Price, Quantity, Symbol, TimestampMs, format_ms, parse_rfc3339_ms};
