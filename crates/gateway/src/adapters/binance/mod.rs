//! Binance spot adapter
//!
//! Streams are addressed through the combined-stream endpoint, so every
//! subscription change reconnects with a new stream list.

mod handler;
mod messages;
mod rest;

pub use handler::BinanceHandler;
pub use rest::BinanceRestClient;

use std::sync::Arc;
use std::time::Duration;

use crate::application::{ConnectionConfig, ConnectionCore, ExchangeAdapter, PersistQueue};
use crate::domain::SocketConnector;

pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443";
pub const DEFAULT_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// Base WebSocket URL without the `/stream` path
    pub ws_url: String,
    /// Minimum time without a finalized bar before the stream is stale
    pub freshness_window: Duration,
    /// Also stream the 24h ticker for each subscribed symbol
    pub include_ticker: bool,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        BinanceConfig {
            ws_url: DEFAULT_WS_URL.to_string(),
            freshness_window: Duration::from_secs(180),
            include_ticker: true,
        }
    }
}

pub struct BinanceAdapter {
    core: ConnectionCore,
}

impl BinanceAdapter {
    pub fn new(
        config: BinanceConfig,
        connector: Arc<dyn SocketConnector>,
        connection: ConnectionConfig,
        queue: PersistQueue,
    ) -> Self {
        let core = ConnectionCore::spawn(BinanceHandler::new(config), connector, connection, queue);
        BinanceAdapter { core }
    }
}

impl ExchangeAdapter for BinanceAdapter {
    fn core(&self) -> &ConnectionCore {
        &self.core
    }
}
