use async_trait::async_trait;
use candela_core::{ExchangeId, Ticker, Timeframe, TimestampMs, UnifiedCandle};
use candela_ports::{CandleCache, PortResult};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type SeriesKey = (ExchangeId, String, Timeframe);
type TickerKey = (ExchangeId, String);

struct StoredTicker {
    ticker: Ticker,
    expires_at: Instant,
}

/// In-memory versioned candle cache
///
/// One ordered series per (exchange, symbol, timeframe). The compare and
/// the write happen under the series' shard lock, so concurrent writers
/// converge on the most authoritative candle regardless of arrival order.
pub struct InMemoryCandleCache {
    series: Arc<DashMap<SeriesKey, BTreeMap<TimestampMs, UnifiedCandle>>>,
    tickers: Arc<DashMap<TickerKey, StoredTicker>>,
    /// Oldest bars are evicted past this many per series
    max_candles_per_series: usize,
}

impl InMemoryCandleCache {
    pub fn new() -> Self {
        Self::with_retention(10_000)
    }

    pub fn with_retention(max_candles_per_series: usize) -> Self {
        InMemoryCandleCache {
            series: Arc::new(DashMap::new()),
            tickers: Arc::new(DashMap::new()),
            max_candles_per_series: max_candles_per_series.max(1),
        }
    }

    /// Stored candle for an exact key (sync)
    pub fn get(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        timeframe: Timeframe,
        timestamp: TimestampMs,
    ) -> Option<UnifiedCandle> {
        self.series
            .get(&(exchange.clone(), symbol.to_string(), timeframe))
            .and_then(|s| s.get(&timestamp).cloned())
    }

    /// Number of bars stored for a series (sync)
    pub fn len(&self, exchange: &ExchangeId, symbol: &str, timeframe: Timeframe) -> usize {
        self.series
            .get(&(exchange.clone(), symbol.to_string(), timeframe))
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.value().is_empty())
    }

    fn write(&self, candle: &UnifiedCandle) -> bool {
        let key = (
            candle.exchange.clone(),
            candle.symbol.clone(),
            candle.timeframe,
        );
        let mut series = self.series.entry(key).or_default();

        if let Some(existing) = series.get(&candle.timestamp)
            && !candle.supersedes(existing)
        {
            return false;
        }

        series.insert(candle.timestamp, candle.clone());
        while series.len() > self.max_candles_per_series {
            series.pop_first();
        }
        true
    }
}

impl Default for InMemoryCandleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryCandleCache {
    fn clone(&self) -> Self {
        InMemoryCandleCache {
            series: Arc::clone(&self.series),
            tickers: Arc::clone(&self.tickers),
            max_candles_per_series: self.max_candles_per_series,
        }
    }
}

#[async_trait]
impl CandleCache for InMemoryCandleCache {
    async fn add_candle_if_newer(&self, candle: &UnifiedCandle) -> PortResult<bool> {
        Ok(self.write(candle))
    }

    async fn get_latest_candle(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        timeframe: Timeframe,
    ) -> PortResult<Option<UnifiedCandle>> {
        Ok(self
            .series
            .get(&(exchange.clone(), symbol.to_string(), timeframe))
            .and_then(|s| s.last_key_value().map(|(_, c)| c.clone())))
    }

    async fn get_candles(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        timeframe: Timeframe,
        from: TimestampMs,
        to: TimestampMs,
    ) -> PortResult<Vec<UnifiedCandle>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .series
            .get(&(exchange.clone(), symbol.to_string(), timeframe))
            .map(|s| s.range(from..=to).map(|(_, c)| c.clone()).collect())
            .unwrap_or_default())
    }

    async fn set_ticker(&self, ticker: &Ticker, ttl: Duration) -> PortResult<()> {
        self.tickers.insert(
            (ticker.exchange.clone(), ticker.symbol.clone()),
            StoredTicker {
                ticker: ticker.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_ticker(&self, exchange: &ExchangeId, symbol: &str) -> PortResult<Option<Ticker>> {
        let key = (exchange.clone(), symbol.to_string());
        let expired = match self.tickers.get(&key) {
            Some(stored) if stored.expires_at > Instant::now() => {
                return Ok(Some(stored.ticker.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.tickers.remove(&key);
        }
        Ok(None)
    }
}
