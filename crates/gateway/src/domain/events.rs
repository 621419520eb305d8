use candela_core::{ExchangeId, Ticker, UnifiedCandle};
use std::time::Duration;

use super::subscription::Subscription;

/// Details attached to every successful (re)connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedInfo {
    pub exchange: ExchangeId,
    /// The connection followed one or more failed attempts
    pub reconnected: bool,
    /// A sequence gap was observed on the previous connection
    pub gap_detected: bool,
    pub subscriptions: Vec<Subscription>,
}

impl ConnectedInfo {
    /// Whether history around the outage should be re-fetched
    pub fn needs_backfill(&self) -> bool {
        self.reconnected || self.gap_detected
    }
}

/// Event surface exposed by every adapter
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    Connected(ConnectedInfo),
    Disconnected { reason: String },
    Error { message: String, fatal: bool },
    Reconnecting { attempt: u32, delay: Duration },
    CandleClose(UnifiedCandle),
}

/// What a protocol handler extracts from one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum MarketUpdate {
    /// Versioned write only
    Candle(UnifiedCandle),
    /// Versioned write, publish, and a `CandleClose` event
    CandleClosed(UnifiedCandle),
    Ticker(Ticker),
}

/// Inbound transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Pong,
    Close(Option<String>),
    Error(String),
}

/// Outbound transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}
