//! Error types for the gateway crate

use candela_core::Timeframe;
use candela_ports::PortError;
use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout waiting for handshake")]
    Timeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Connection(e.to_string())
    }
}

/// Gateway-level errors (adapter operations)
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Not connected")]
    NotConnected,

    #[error("Timeframe {0} is not streamed by this exchange")]
    UnsupportedTimeframe(Timeframe),

    #[error("Token error: {0}")]
    Token(#[from] PortError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    #[error("Adapter task stopped")]
    Stopped,
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
