//! Exchange adapters
//!
//! Each adapter pairs an exchange-specific [`ProtocolHandler`] with the
//! shared [`ConnectionCore`], plus a REST client for history.
//!
//! [`ProtocolHandler`]: crate::domain::ProtocolHandler
//! [`ConnectionCore`]: crate::application::ConnectionCore

pub mod binance;
pub mod coinbase;

pub use binance::{BinanceAdapter, BinanceConfig, BinanceRestClient};
pub use coinbase::{ClosePayload, CoinbaseAdapter, CoinbaseConfig, CoinbaseRestClient};
