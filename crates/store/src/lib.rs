//! Candela Store
//!
//! In-memory implementations of the cache and bus ports, used by the
//! single-process runner and by tests across the workspace.
//!
//! - [`InMemoryCandleCache`]: versioned candle series plus TTL-bound tickers
//! - [`BroadcastBus`]: channel-name keyed `tokio::sync::broadcast` fan-out

mod bus;
mod cache;

pub use bus::BroadcastBus;
pub use cache::InMemoryCandleCache;
