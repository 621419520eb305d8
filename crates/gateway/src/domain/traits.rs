use async_trait::async_trait;
use candela_core::{ExchangeId, Timeframe};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::events::{Frame, MarketUpdate, Outbound};
use super::subscription::SubscriptionSet;
use crate::error::{GatewayResult, TransportError};

/// How subscription changes reach the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    /// Send a control frame over the live socket
    ControlFrame,
    /// Streams are part of the endpoint; changing them means reconnecting
    Reconnect,
}

/// Exchange-specific half of an adapter
///
/// Implementations are owned by one session task and never shared, so
/// per-symbol state can live in plain maps.
pub trait ProtocolHandler: Send + 'static {
    fn exchange(&self) -> ExchangeId;

    fn subscribe_mode(&self) -> SubscribeMode;

    /// Endpoint for a new socket given the current subscriptions
    fn endpoint(&self, subscriptions: &SubscriptionSet) -> String;

    /// Canonical form of a caller-supplied symbol
    fn normalize_symbol(&self, symbol: &str) -> String {
        symbol.trim().to_string()
    }

    /// Whether this exchange can stream `timeframe`
    fn supports(&self, _timeframe: Timeframe) -> bool {
        true
    }

    /// Control frames subscribing `symbols`. Only called in `ControlFrame` mode.
    fn subscribe_frames(
        &mut self,
        _symbols: &[String],
        _timeframe: Timeframe,
    ) -> GatewayResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Control frames unsubscribing `symbols`. `remaining` is the set left
    /// after removal. Only called in `ControlFrame` mode.
    fn unsubscribe_frames(
        &mut self,
        _symbols: &[String],
        _timeframe: Timeframe,
        _remaining: &SubscriptionSet,
    ) -> GatewayResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// A new socket is up. Per-connection state resets here.
    fn on_connected(&mut self, subscriptions: &SubscriptionSet, now: Instant);

    /// Parse one text frame. Malformed input yields no updates.
    fn handle_text(&mut self, text: &str, now: Instant) -> Vec<MarketUpdate>;

    /// True when the stream looks alive but has stopped delivering data
    fn is_stale(&self, _now: Instant) -> bool {
        false
    }

    /// Whether a gap was seen since the last call. Clears the flag.
    fn take_gap_detected(&mut self) -> bool {
        false
    }

    /// Emit any aggregated gap statistics
    fn report_gaps(&mut self) {}
}

/// Live socket as seen by the connection session
pub struct SocketSession {
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<Frame>,
}

/// Opens sockets. Returns only after the transport handshake completed.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<SocketSession, TransportError>;
}
