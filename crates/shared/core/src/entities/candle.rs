use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::exchange::{CandleKey, ExchangeId};
use crate::timeframe::Timeframe;
use crate::values::{Price, Quantity, TimestampMs};

/// One OHLCV bar in the exchange-independent schema.
///
/// `timestamp` is the period start in epoch milliseconds, already floored to
/// the timeframe. `sequence_number` is a wire-protocol counter scoped to one
/// exchange and takes no part in identity; see [`CandleKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedCandle {
    pub timestamp: TimestampMs,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub exchange: ExchangeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    /// Finalized bar. In-progress updates carry `false`.
    #[serde(default)]
    pub is_closed: bool,
}

impl UnifiedCandle {
    /// Seed a bar from a single price. O=H=L=C=`price`.
    pub fn from_price(
        exchange: impl Into<ExchangeId>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        timestamp: TimestampMs,
        price: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            timestamp: timeframe.floor(timestamp),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            symbol: symbol.into(),
            timeframe,
            exchange: exchange.into(),
            sequence_number: None,
            is_closed: false,
        }
    }

    pub fn key(&self) -> CandleKey {
        CandleKey {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            timestamp: self.timestamp,
        }
    }

    pub fn with_sequence(mut self, sequence_number: u64) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn closed(mut self) -> Self {
        self.is_closed = true;
        self
    }

    /// Timestamp at which this bar's period ends (exclusive)
    pub fn end_time(&self) -> TimestampMs {
        self.timestamp + self.timeframe.duration_ms()
    }

    /// Whether the bar's period has fully elapsed at `now`
    pub fn period_elapsed(&self, now: TimestampMs) -> bool {
        now >= self.end_time()
    }

    /// Fold one trade print into the bar
    pub fn apply_trade(&mut self, price: Price, size: Quantity) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += size;
    }

    /// Authority ordering used by the versioned write.
    ///
    /// Finalized beats in-progress, then the higher sequence number (any
    /// sequence beats none), then volume, then close/high/low/open as
    /// deterministic tie-breakers.
    pub fn authority_cmp(&self, other: &Self) -> Ordering {
        self.is_closed
            .cmp(&other.is_closed)
            .then_with(|| self.sequence_number.cmp(&other.sequence_number))
            .then_with(|| self.volume.cmp(&other.volume))
            .then_with(|| self.close.cmp(&other.close))
            .then_with(|| self.high.cmp(&other.high))
            .then_with(|| self.low.cmp(&other.low))
            .then_with(|| self.open.cmp(&other.open))
    }

    /// True when this candle should replace `other` in storage.
    /// Equal candles never replace each other.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.authority_cmp(other) == Ordering::Greater
    }
}
