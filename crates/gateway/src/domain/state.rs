use std::fmt;

/// Connection lifecycle of one adapter
///
/// ```text
/// Idle → Connecting → Connected → (Disconnected → Reconnecting → Connecting)* → Closed
///                                                        └── attempts exhausted → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected
    #[default]
    Idle,
    /// Handshake in progress
    Connecting,
    /// Socket open and streaming
    Connected,
    /// Lost the socket unexpectedly, reconnect not yet scheduled
    Disconnected,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting,
    /// Closed on request; no automatic reconnect
    Closed,
    /// Reconnect attempts exhausted
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Terminal states never reconnect on their own
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
