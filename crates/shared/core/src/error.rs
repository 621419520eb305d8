use thiserror::Error;

/// Errors raised by pure domain conversions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
