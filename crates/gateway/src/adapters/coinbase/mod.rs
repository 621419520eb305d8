//! Coinbase Advanced Trade adapter
//!
//! Subscriptions are managed with signed control frames over one socket.
//! Five-minute bars come from the native `candles` channel and one-minute
//! bars are aggregated from `market_trades`.

mod handler;
mod messages;
mod rest;

pub use handler::CoinbaseHandler;
pub use rest::{CoinbaseRestClient, granularity};

use candela_ports::TokenProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::{ConnectionConfig, ConnectionCore, ExchangeAdapter, PersistQueue};
use crate::domain::SocketConnector;

pub const DEFAULT_WS_URL: &str = "wss://advanced-trade-ws.coinbase.com";
pub const DEFAULT_REST_URL: &str = "https://api.coinbase.com";

/// Which bar a timestamp-advance close event carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePayload {
    /// The newly arrived bar; the prior bar is still written as finalized
    #[default]
    Incoming,
    /// The last tracked values of the bar that just ended
    TrackedPrior,
}

#[derive(Debug, Clone)]
pub struct CoinbaseConfig {
    pub ws_url: String,
    pub close_payload: ClosePayload,
    /// Also subscribe the `ticker` channel
    pub include_ticker: bool,
}

impl Default for CoinbaseConfig {
    fn default() -> Self {
        CoinbaseConfig {
            ws_url: DEFAULT_WS_URL.to_string(),
            close_payload: ClosePayload::default(),
            include_ticker: true,
        }
    }
}

pub struct CoinbaseAdapter {
    core: ConnectionCore,
}

impl CoinbaseAdapter {
    pub fn new(
        config: CoinbaseConfig,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn SocketConnector>,
        connection: ConnectionConfig,
        queue: PersistQueue,
    ) -> Self {
        let handler = CoinbaseHandler::new(config, tokens);
        let core = ConnectionCore::spawn(handler, connector, connection, queue);
        CoinbaseAdapter { core }
    }
}

impl ExchangeAdapter for CoinbaseAdapter {
    fn core(&self) -> &ConnectionCore {
        &self.core
    }
}
