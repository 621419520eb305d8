use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timeframe::Timeframe;
use crate::values::TimestampMs;

/// Unique identifier for an exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(id: impl Into<String>) -> Self {
        ExchangeId(id.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        ExchangeId::new(s)
    }
}

impl From<String> for ExchangeId {
    fn from(s: String) -> Self {
        ExchangeId::new(s)
    }
}

/// Well-known exchange identifiers
impl ExchangeId {
    pub fn binance() -> Self {
        ExchangeId::new("binance")
    }

    pub fn coinbase() -> Self {
        ExchangeId::new("coinbase")
    }
}

/// Storage identity of a candle: one logical bar per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandleKey {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: TimestampMs,
}

impl CandleKey {
    pub fn new(
        exchange: impl Into<ExchangeId>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        timestamp: TimestampMs,
    ) -> Self {
        CandleKey {
            exchange: exchange.into(),
            symbol: symbol.into(),
            timeframe,
            timestamp,
        }
    }
}

impl fmt::Display for CandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.exchange, self.symbol, self.timeframe, self.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id() {
        let id = ExchangeId::new("Binance");
        assert_eq!(id.as_str(), "binance");
        assert_eq!(id, ExchangeId::binance());
    }

    #[test]
    fn test_candle_key_display() {
        let key = CandleKey::new("coinbase", "BTC-USD", Timeframe::M5, 1_700_000_100_000);
        assert_eq!(key.to_string(), "coinbase:BTC-USD:5m:1700000100000");
    }
}
