use serde::{Deserialize, Serialize};

use crate::exchange::ExchangeId;
use crate::values::{Price, Quantity, TimestampMs};

/// One public trade print. Input to aggregation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub price: Price,
    pub size: Quantity,
    pub timestamp: TimestampMs,
    pub trade_id: Option<String>,
}

impl Trade {
    pub fn new(
        exchange: impl Into<ExchangeId>,
        symbol: impl Into<String>,
        price: Price,
        size: Quantity,
        timestamp: TimestampMs,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            price,
            size,
            timestamp,
            trade_id: None,
        }
    }

    pub fn with_id(mut self, trade_id: impl Into<String>) -> Self {
        self.trade_id = Some(trade_id.into());
        self
    }
}
