//! Candela Gateway
//!
//! Exchange adapter framework for real-time candle ingestion. Provides:
//! - A connection lifecycle core (reconnect with backoff, watchdog, keep-alive)
//! - Protocol handlers for Binance and Coinbase
//! - Trade-to-candle aggregation and sequence gap tracking
//! - A bounded persistence queue feeding the cache and event bus
//!
//! ## Architecture
//!
//! ```text
//! Exchange WebSocket (Binance, Coinbase)
//!         │
//!    ┌────▼──────────┐
//!    │ConnectionCore │  one session task per adapter
//!    │ + Protocol    │
//!    └──┬─────────┬──┘
//!       │         │ AdapterEvent broadcast
//!       │         │ (connected, candle close, ...)
//!  PersistQueue   ▼
//!       │    Reconciliation
//!  ┌────▼────┐
//!  │ Cache + │  channels: candles:{exchange}:{symbol}:{timeframe}
//!  │  Bus    │            ticker:{exchange}:{symbol}
//!  └─────────┘
//! ```
//!
//! ## Transport
//!
//! Sockets are opened through the [`SocketConnector`] trait. Production uses
//! [`WsClient`] over tokio-tungstenite; tests plug in in-process connectors.

pub mod adapters;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types
pub use adapters::{
    BinanceAdapter, BinanceConfig, BinanceRestClient, ClosePayload, CoinbaseAdapter,
    CoinbaseConfig, CoinbaseRestClient,
};
pub use application::{
    ConnectionConfig, ConnectionCore, ExchangeAdapter, PersistConfig, PersistJob, PersistQueue,
};
pub use domain::{
    AdapterEvent, Backoff, ConnectedInfo, ConnectionState, Frame, MarketUpdate, Outbound,
    ProtocolHandler, SocketConnector, SocketSession, SubscribeMode, Subscription,
};
pub use error::{GatewayError, GatewayResult, TransportError};
pub use infrastructure::{HmacTokenProvider, RestClient, RestError, StaticTokenProvider, WsClient};
pub use presentation::{CandlePublisher, ChannelTemplate};
