use candela_core::Timeframe;
use candela_ports::{FetchError, PortError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Fetch failed for {symbol} {timeframe}: {source}")]
    Fetch {
        symbol: String,
        timeframe: Timeframe,
        #[source]
        source: FetchError,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] PortError),
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
