use thiserror::Error;

/// Errors surfaced by cache, bus and token collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Token issuance failed: {0}")]
    Token(String),
}

pub type PortResult<T> = std::result::Result<T, PortError>;

/// Domain-level errors for REST history fetches
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_ms:?} ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Unsupported timeframe {0} for this exchange")]
    UnsupportedTimeframe(String),
}
