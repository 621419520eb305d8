use async_trait::async_trait;
use candela_core::{ExchangeId, Ticker, Timeframe, TimestampMs, UnifiedCandle};
use std::time::Duration;

use crate::PortResult;

/// Versioned candle storage shared by every adapter
#[async_trait]
pub trait CandleCache: Send + Sync {
    /// Store `candle` unless the stored candle for the same key is at least
    /// as authoritative (see [`UnifiedCandle::supersedes`]).
    ///
    /// Must be idempotent and independent of arrival order. Returns whether
    /// the write took effect.
    async fn add_candle_if_newer(&self, candle: &UnifiedCandle) -> PortResult<bool>;

    /// Most recent candle by timestamp
    async fn get_latest_candle(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        timeframe: Timeframe,
    ) -> PortResult<Option<UnifiedCandle>>;

    /// Candles with `from <= timestamp <= to`, ascending
    async fn get_candles(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        timeframe: Timeframe,
        from: TimestampMs,
        to: TimestampMs,
    ) -> PortResult<Vec<UnifiedCandle>>;

    async fn set_ticker(&self, ticker: &Ticker, ttl: Duration) -> PortResult<()>;

    async fn get_ticker(&self, exchange: &ExchangeId, symbol: &str) -> PortResult<Option<Ticker>>;
}
