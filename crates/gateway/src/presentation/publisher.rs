//! Candle Publisher
//!
//! Writes candles and tickers through the versioned cache and publishes
//! finalized candles and ticker updates to their configured output channels.

use candela_core::{Ticker, UnifiedCandle};
use candela_ports::{CandleCache, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::persist_queue::PersistJob;

/// Default output channel for ticker updates
pub const DEFAULT_TICKER_CHANNEL: &str = "ticker:{exchange}:{symbol}";

/// Output channel name with `{exchange}`, `{symbol}` and `{timeframe}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTemplate(String);

impl ChannelTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        ChannelTemplate(template.into())
    }

    pub fn render(&self, candle: &UnifiedCandle) -> String {
        self.0
            .replace("{exchange}", candle.exchange.as_str())
            .replace("{symbol}", &candle.symbol)
            .replace("{timeframe}", candle.timeframe.as_str())
    }

    /// Tickers have no timeframe; that placeholder is left as is
    pub fn render_ticker(&self, ticker: &Ticker) -> String {
        self.0
            .replace("{exchange}", ticker.exchange.as_str())
            .replace("{symbol}", &ticker.symbol)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Publisher for candle and ticker updates to the cache and bus
pub struct CandlePublisher {
    cache: Arc<dyn CandleCache>,
    bus: Arc<dyn EventBus>,
    channels: Vec<ChannelTemplate>,
    ticker_channels: Vec<ChannelTemplate>,
    ticker_ttl: Duration,
}

impl CandlePublisher {
    pub fn new(
        cache: Arc<dyn CandleCache>,
        bus: Arc<dyn EventBus>,
        channels: Vec<String>,
        ticker_ttl: Duration,
    ) -> Self {
        CandlePublisher {
            cache,
            bus,
            channels: channels.into_iter().map(ChannelTemplate::new).collect(),
            ticker_channels: vec![ChannelTemplate::new(DEFAULT_TICKER_CHANNEL)],
            ticker_ttl,
        }
    }

    /// Replace the ticker output channels. An empty list keeps tickers cache-only.
    pub fn with_ticker_channels(mut self, channels: Vec<String>) -> Self {
        self.ticker_channels = channels.into_iter().map(ChannelTemplate::new).collect();
        self
    }

    pub fn channels(&self) -> &[ChannelTemplate] {
        &self.channels
    }

    pub fn ticker_channels(&self) -> &[ChannelTemplate] {
        &self.ticker_channels
    }

    pub async fn process(&self, job: PersistJob) {
        match job {
            PersistJob::Candle(candle) => {
                self.write_candle(&candle).await;
            }
            PersistJob::CandleClosed(candle) => {
                self.write_candle(&candle).await;
                self.publish_candle(&candle).await;
            }
            PersistJob::Ticker(ticker) => {
                self.write_ticker(&ticker).await;
                self.publish_ticker(&ticker).await;
            }
        }
    }

    /// Versioned write. Returns whether the stored candle changed.
    pub async fn write_candle(&self, candle: &UnifiedCandle) -> bool {
        match self.cache.add_candle_if_newer(candle).await {
            Ok(written) => written,
            Err(e) => {
                warn!(key = %candle.key(), "candle write failed: {}", e);
                false
            }
        }
    }

    /// Publish to every output channel. Failures are logged, never retried.
    pub async fn publish_candle(&self, candle: &UnifiedCandle) {
        let payload = match serde_json::to_string(candle) {
            Ok(p) => p,
            Err(e) => {
                warn!(key = %candle.key(), "candle serialization failed: {}", e);
                return;
            }
        };

        for template in &self.channels {
            let channel = template.render(candle);
            if let Err(e) = self.bus.publish(&channel, &payload).await {
                warn!(channel = %channel, "publish failed: {}", e);
            } else {
                debug!(channel = %channel, ts = candle.timestamp, "candle published");
            }
        }
    }

    pub async fn write_ticker(&self, ticker: &Ticker) {
        if let Err(e) = self.cache.set_ticker(ticker, self.ticker_ttl).await {
            warn!(
                exchange = %ticker.exchange,
                symbol = %ticker.symbol,
                "ticker write failed: {}",
                e
            );
        }
    }

    pub async fn publish_ticker(&self, ticker: &Ticker) {
        if self.ticker_channels.is_empty() {
            return;
        }
        let payload = match serde_json::to_string(ticker) {
            Ok(p) => p,
            Err(e) => {
                warn!(exchange = %ticker.exchange, symbol = %ticker.symbol, "ticker serialization failed: {}", e);
                return;
            }
        };

        for template in &self.ticker_channels {
            let channel = template.render_ticker(ticker);
            if let Err(e) = self.bus.publish(&channel, &payload).await {
                warn!(channel = %channel, "publish failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candela_core::{ExchangeId, Timeframe};
    use candela_store::{BroadcastBus, InMemoryCandleCache};
    use rust_decimal_macros::dec;

    fn candle() -> UnifiedCandle {
        UnifiedCandle::from_price(
            ExchangeId::coinbase(),
            "BTC-USD",
            Timeframe::M5,
            300_000,
            dec!(100),
            dec!(1),
        )
        .closed()
    }

    #[test]
    fn test_template_render() {
        let template = ChannelTemplate::new("candles:{exchange}:{symbol}:{timeframe}");
        assert_eq!(template.render(&candle()), "candles:coinbase:BTC-USD:5m");
    }

    #[tokio::test]
    async fn test_closed_candle_goes_to_every_channel() {
        let cache = Arc::new(InMemoryCandleCache::new());
        let bus = Arc::new(BroadcastBus::new(16));
        let mut legacy = bus.subscribe("candle:BTC-USD:5m");
        let mut current = bus.subscribe("candles:coinbase:BTC-USD:5m");

        let publisher = CandlePublisher::new(
            cache.clone(),
            bus.clone(),
            vec![
                "candle:{symbol}:{timeframe}".to_string(),
                "candles:{exchange}:{symbol}:{timeframe}".to_string(),
            ],
            Duration::from_secs(60),
        );

        publisher.process(PersistJob::CandleClosed(candle())).await;

        let a: UnifiedCandle = serde_json::from_str(&legacy.recv().await.unwrap()).unwrap();
        let b: UnifiedCandle = serde_json::from_str(&current.recv().await.unwrap()).unwrap();
        assert_eq!(a, candle());
        assert_eq!(b, candle());
        assert!(cache
            .get(&ExchangeId::coinbase(), "BTC-USD", Timeframe::M5, 300_000)
            .is_some());
    }

    #[tokio::test]
    async fn test_in_progress_candle_is_not_published() {
        let cache = Arc::new(InMemoryCandleCache::new());
        let bus = Arc::new(BroadcastBus::new(16));
        let mut rx = bus.subscribe("candles:coinbase:BTC-USD:5m");
        let publisher = CandlePublisher::new(
            cache.clone(),
            bus.clone(),
            vec!["candles:{exchange}:{symbol}:{timeframe}".to_string()],
            Duration::from_secs(60),
        );

        publisher.process(PersistJob::Candle(candle())).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(cache.len(&ExchangeId::coinbase(), "BTC-USD", Timeframe::M5), 1);
    }

    fn ticker() -> Ticker {
        Ticker {
            exchange: ExchangeId::binance(),
            symbol: "BTCUSDT".to_string(),
            price: dec!(37010.50),
            change_24h: dec!(-250.50),
            change_percent_24h: dec!(-0.672),
            volume_24h: dec!(25000.1),
            high_24h: dec!(37400),
            low_24h: dec!(36800),
            updated_at: 1_700_000_000_123,
        }
    }

    #[tokio::test]
    async fn test_ticker_is_cached_and_published() {
        let cache = Arc::new(InMemoryCandleCache::new());
        let bus = Arc::new(BroadcastBus::new(16));
        let mut rx = bus.subscribe("ticker:binance:BTCUSDT");
        let publisher = CandlePublisher::new(
            cache.clone(),
            bus.clone(),
            vec!["candles:{exchange}:{symbol}:{timeframe}".to_string()],
            Duration::from_secs(60),
        );

        publisher.process(PersistJob::Ticker(ticker())).await;

        let published: Ticker = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(published, ticker());
        assert_eq!(bus.delivered_count(), 1);
        let cached = cache.get_ticker(&ExchangeId::binance(), "BTCUSDT").await.unwrap();
        assert_eq!(cached, Some(ticker()));
    }

    #[tokio::test]
    async fn test_ticker_channels_are_configurable() {
        let cache = Arc::new(InMemoryCandleCache::new());
        let bus = Arc::new(BroadcastBus::new(16));
        let mut quotes = bus.subscribe("quotes.BTCUSDT");
        let mut default = bus.subscribe("ticker:binance:BTCUSDT");
        let publisher = CandlePublisher::new(cache, bus.clone(), Vec::new(), Duration::from_secs(60))
            .with_ticker_channels(vec!["quotes.{symbol}".to_string()]);

        publisher.process(PersistJob::Ticker(ticker())).await;

        assert!(quotes.recv().await.is_ok());
        assert!(default.try_recv().is_err());
    }
}
