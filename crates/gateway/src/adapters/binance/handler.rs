use candela_core::{ExchangeId, Ticker, Timeframe, UnifiedCandle};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::BinanceConfig;
use super::messages::{CombinedStreamMessage, KlineEvent, Ticker24h};
use crate::domain::{MarketUpdate, ProtocolHandler, SubscribeMode, SubscriptionSet};

/// Slack added to the finest subscribed period before a stream counts as stale
const FRESHNESS_SLACK: Duration = Duration::from_secs(60);

/// Binance kline/ticker protocol
///
/// Close detection uses the kline's explicit `x` flag. There is no wire
/// sequence, so liveness of the data itself is checked by a freshness
/// window over finalized bars.
pub struct BinanceHandler {
    exchange: ExchangeId,
    config: BinanceConfig,
    last_close: Option<Instant>,
    freshness_window: Option<Duration>,
}

impl BinanceHandler {
    pub fn new(config: BinanceConfig) -> Self {
        BinanceHandler {
            exchange: ExchangeId::binance(),
            config,
            last_close: None,
            freshness_window: None,
        }
    }

    fn handle_kline(&mut self, data: serde_json::Value, now: Instant) -> Option<MarketUpdate> {
        let event: KlineEvent = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(e) => {
                debug!("malformed kline: {}", e);
                return None;
            }
        };
        let Ok(timeframe) = event.kline.interval.parse::<Timeframe>() else {
            debug!(interval = %event.kline.interval, "unsupported kline interval");
            return None;
        };

        let k = event.kline;
        let candle = UnifiedCandle {
            timestamp: timeframe.floor(k.open_time),
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
            symbol: event.symbol,
            timeframe,
            exchange: self.exchange.clone(),
            sequence_number: None,
            is_closed: k.is_closed,
        };

        if k.is_closed {
            self.last_close = Some(now);
            Some(MarketUpdate::CandleClosed(candle))
        } else {
            Some(MarketUpdate::Candle(candle))
        }
    }

    fn handle_ticker(&self, data: serde_json::Value) -> Option<MarketUpdate> {
        match serde_json::from_value::<Ticker24h>(data) {
            Ok(t) => Some(MarketUpdate::Ticker(Ticker {
                exchange: self.exchange.clone(),
                symbol: t.symbol,
                price: t.last_price,
                change_24h: t.price_change,
                change_percent_24h: t.price_change_percent,
                volume_24h: t.volume,
                high_24h: t.high,
                low_24h: t.low,
                updated_at: t.event_time,
            })),
            Err(e) => {
                debug!("malformed ticker: {}", e);
                None
            }
        }
    }
}

impl ProtocolHandler for BinanceHandler {
    fn exchange(&self) -> ExchangeId {
        self.exchange.clone()
    }

    fn subscribe_mode(&self) -> SubscribeMode {
        SubscribeMode::Reconnect
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    fn endpoint(&self, subscriptions: &SubscriptionSet) -> String {
        let base = self.config.ws_url.trim_end_matches('/');
        let mut streams: Vec<String> = subscriptions
            .groups()
            .flat_map(|(tf, symbols)| {
                symbols
                    .into_iter()
                    .map(move |s| format!("{}@kline_{}", s.to_lowercase(), tf))
            })
            .collect();
        if self.config.include_ticker {
            streams.extend(
                subscriptions
                    .symbols()
                    .iter()
                    .map(|s| format!("{}@ticker", s.to_lowercase())),
            );
        }

        if streams.is_empty() {
            format!("{}/stream", base)
        } else {
            format!("{}/stream?streams={}", base, streams.join("/"))
        }
    }

    fn on_connected(&mut self, subscriptions: &SubscriptionSet, now: Instant) {
        self.last_close = Some(now);
        self.freshness_window = subscriptions
            .finest_timeframe()
            .map(|tf| self.config.freshness_window.max(tf.duration() + FRESHNESS_SLACK));
    }

    fn handle_text(&mut self, text: &str, now: Instant) -> Vec<MarketUpdate> {
        let msg: CombinedStreamMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(_) => {
                // Subscription acks and other control replies
                trace!(text, "ignoring non-stream message");
                return Vec::new();
            }
        };

        let update = if msg.stream.contains("@kline_") {
            self.handle_kline(msg.data, now)
        } else if msg.stream.ends_with("@ticker") {
            self.handle_ticker(msg.data)
        } else {
            trace!(stream = %msg.stream, "unhandled stream");
            None
        };
        update.into_iter().collect()
    }

    fn is_stale(&self, now: Instant) -> bool {
        match (self.last_close, self.freshness_window) {
            (Some(last), Some(window)) => now.duration_since(last) > window,
            _ => false,
        }
    }
}
