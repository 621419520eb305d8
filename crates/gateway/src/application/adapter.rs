use async_trait::async_trait;
use candela_core::{ExchangeId, Timeframe};
use tokio::sync::broadcast;

use super::connection::ConnectionCore;
use crate::domain::{AdapterEvent, ConnectionState};
use crate::error::GatewayResult;

/// Public lifecycle contract shared by every exchange adapter
///
/// Concrete adapters only supply [`ExchangeAdapter::core`]; everything else
/// delegates to the shared [`ConnectionCore`].
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn core(&self) -> &ConnectionCore;

    fn exchange(&self) -> ExchangeId {
        self.core().exchange().clone()
    }

    async fn connect(&self) -> GatewayResult<()> {
        self.core().connect().await
    }

    async fn disconnect(&self) {
        self.core().disconnect().await
    }

    /// Fails with `NotConnected` unless a socket is open
    async fn subscribe(&self, symbols: &[String], timeframe: Timeframe) -> GatewayResult<()> {
        self.core().subscribe(symbols, timeframe).await
    }

    async fn unsubscribe(&self, symbols: &[String], timeframe: Timeframe) -> GatewayResult<()> {
        self.core().unsubscribe(symbols, timeframe).await
    }

    fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    fn state(&self) -> ConnectionState {
        self.core().state()
    }

    fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.core().events()
    }
}
