use candela_core::{
    ExchangeId, Ticker, Timeframe, Trade, UnifiedCandle, change_from_percent, parse_rfc3339_ms,
};
use candela_ports::TokenProvider;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::messages::{
    CandlesEvent, ChannelMessage, ControlFrame, TickerEvent, TradesEvent, WireCandle,
};
use super::{ClosePayload, CoinbaseConfig};
use crate::domain::{
    AggregateOutcome, MarketUpdate, ProtocolHandler, SequenceTracker, SubscribeMode,
    SubscriptionSet, TradeAggregator,
};
use crate::error::GatewayResult;

const CANDLES: &str = "candles";
const MARKET_TRADES: &str = "market_trades";
const TICKER: &str = "ticker";
const HEARTBEATS: &str = "heartbeats";

/// Native period of the `candles` channel
const NATIVE_TIMEFRAME: Timeframe = Timeframe::M5;
/// Period synthesized from `market_trades`
const AGGREGATED_TIMEFRAME: Timeframe = Timeframe::M1;

/// Coinbase Advanced Trade protocol
///
/// Close detection on the `candles` channel is by timestamp advance on
/// real-time updates. One-minute bars are built from trade prints. Every
/// message carries a connection-scoped sequence number used for gap
/// detection.
pub struct CoinbaseHandler {
    exchange: ExchangeId,
    config: CoinbaseConfig,
    tokens: Arc<dyn TokenProvider>,
    sequence: SequenceTracker,
    /// Last bar seen per product on the `candles` channel
    tracked: HashMap<String, UnifiedCandle>,
    aggregator: TradeAggregator,
}

impl CoinbaseHandler {
    pub fn new(config: CoinbaseConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let exchange = ExchangeId::coinbase();
        CoinbaseHandler {
            aggregator: TradeAggregator::new(exchange.clone(), AGGREGATED_TIMEFRAME),
            exchange,
            config,
            tokens,
            sequence: SequenceTracker::new(),
            tracked: HashMap::new(),
        }
    }

    fn data_channel(timeframe: Timeframe) -> &'static str {
        match timeframe {
            AGGREGATED_TIMEFRAME => MARKET_TRADES,
            _ => CANDLES,
        }
    }

    fn control_frames(
        &self,
        kind: &str,
        symbols: &[String],
        channels: &[&str],
    ) -> GatewayResult<Vec<String>> {
        channels
            .iter()
            .map(|channel| -> GatewayResult<String> {
                let frame = ControlFrame {
                    kind,
                    product_ids: symbols,
                    channel: *channel,
                    jwt: self.tokens.issue()?,
                };
                Ok(serde_json::to_string(&frame)?)
            })
            .collect()
    }

    fn handle_candles(
        &mut self,
        events: Vec<serde_json::Value>,
        sequence: Option<u64>,
        updates: &mut Vec<MarketUpdate>,
    ) {
        for event in events {
            let event: CandlesEvent = match serde_json::from_value(event) {
                Ok(event) => event,
                Err(e) => {
                    debug!("malformed candles event: {}", e);
                    continue;
                }
            };
            let is_update = event.kind == "update";

            for wire in event.candles {
                let Some(candle) = self.to_candle(wire, sequence) else {
                    continue;
                };
                if is_update {
                    self.advance(candle, updates);
                } else {
                    // Snapshots replay recent bars and never close anything
                    self.track(&candle);
                    updates.push(MarketUpdate::Candle(candle));
                }
            }
        }
    }

    /// Real-time update: a new period start closes the tracked bar
    fn advance(&mut self, candle: UnifiedCandle, updates: &mut Vec<MarketUpdate>) {
        let prior = match self.tracked.get(&candle.symbol) {
            Some(prior) if candle.timestamp > prior.timestamp => prior.clone(),
            Some(prior) if candle.timestamp < prior.timestamp => {
                // Out-of-order bar; the versioned write sorts it out
                updates.push(MarketUpdate::Candle(candle));
                return;
            }
            _ => {
                self.track(&candle);
                updates.push(MarketUpdate::Candle(candle));
                return;
            }
        };

        self.track(&candle);
        match self.config.close_payload {
            ClosePayload::Incoming => {
                updates.push(MarketUpdate::Candle(prior.closed()));
                updates.push(MarketUpdate::CandleClosed(candle));
            }
            ClosePayload::TrackedPrior => {
                updates.push(MarketUpdate::CandleClosed(prior.closed()));
                updates.push(MarketUpdate::Candle(candle));
            }
        }
    }

    fn track(&mut self, candle: &UnifiedCandle) {
        let newer = self
            .tracked
            .get(&candle.symbol)
            .is_none_or(|prior| candle.timestamp >= prior.timestamp);
        if newer {
            self.tracked.insert(candle.symbol.clone(), candle.clone());
        }
    }

    fn to_candle(&self, wire: WireCandle, sequence: Option<u64>) -> Option<UnifiedCandle> {
        let Ok(start) = wire.start.parse::<i64>() else {
            debug!(start = %wire.start, "unparseable candle start");
            return None;
        };
        Some(UnifiedCandle {
            timestamp: NATIVE_TIMEFRAME.floor(start * 1000),
            open: wire.open,
            high: wire.high,
            low: wire.low,
            close: wire.close,
            volume: wire.volume,
            symbol: wire.product_id,
            timeframe: NATIVE_TIMEFRAME,
            exchange: self.exchange.clone(),
            sequence_number: sequence,
            is_closed: false,
        })
    }

    fn handle_trades(&mut self, events: Vec<serde_json::Value>, updates: &mut Vec<MarketUpdate>) {
        let mut trades = Vec::new();
        for event in events {
            let event: TradesEvent = match serde_json::from_value(event) {
                Ok(event) => event,
                Err(e) => {
                    debug!("malformed market_trades event: {}", e);
                    continue;
                }
            };
            if event.kind != "update" {
                continue;
            }
            for wire in event.trades {
                match parse_rfc3339_ms(&wire.time) {
                    Ok(timestamp) => {
                        let mut trade = Trade::new(
                            self.exchange.clone(),
                            wire.product_id,
                            wire.price,
                            wire.size,
                            timestamp,
                        );
                        trade.trade_id = wire.trade_id;
                        trades.push(trade);
                    }
                    Err(e) => debug!("dropping trade: {}", e),
                }
            }
        }
        // Events list newest first
        trades.sort_by_key(|t| t.timestamp);

        let mut touched = BTreeSet::new();
        for trade in &trades {
            match self.aggregator.apply(trade) {
                AggregateOutcome::Closed(bar) => {
                    updates.push(MarketUpdate::CandleClosed(bar));
                    touched.insert(trade.symbol.clone());
                }
                AggregateOutcome::Updated | AggregateOutcome::Started => {
                    touched.insert(trade.symbol.clone());
                }
                AggregateOutcome::Late => {
                    trace!(symbol = %trade.symbol, "late trade dropped");
                }
            }
        }
        for symbol in touched {
            if let Some(bar) = self.aggregator.current(&symbol) {
                updates.push(MarketUpdate::Candle(bar.clone()));
            }
        }
    }

    fn handle_ticker(
        &self,
        events: Vec<serde_json::Value>,
        timestamp: Option<&str>,
        updates: &mut Vec<MarketUpdate>,
    ) {
        let updated_at = timestamp
            .and_then(|ts| parse_rfc3339_ms(ts).ok())
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        for event in events {
            let event: TickerEvent = match serde_json::from_value(event) {
                Ok(event) => event,
                Err(e) => {
                    debug!("malformed ticker event: {}", e);
                    continue;
                }
            };
            for t in event.tickers {
                updates.push(MarketUpdate::Ticker(Ticker {
                    exchange: self.exchange.clone(),
                    symbol: t.product_id,
                    price: t.price,
                    change_24h: change_from_percent(t.price, t.price_percent_chg_24_h),
                    change_percent_24h: t.price_percent_chg_24_h,
                    volume_24h: t.volume_24_h,
                    high_24h: t.high_24_h,
                    low_24h: t.low_24_h,
                    updated_at,
                }));
            }
        }
    }
}

impl ProtocolHandler for CoinbaseHandler {
    fn exchange(&self) -> ExchangeId {
        self.exchange.clone()
    }

    fn subscribe_mode(&self) -> SubscribeMode {
        SubscribeMode::ControlFrame
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    fn endpoint(&self, _subscriptions: &SubscriptionSet) -> String {
        self.config.ws_url.clone()
    }

    fn supports(&self, timeframe: Timeframe) -> bool {
        matches!(timeframe, AGGREGATED_TIMEFRAME | NATIVE_TIMEFRAME)
    }

    fn subscribe_frames(
        &mut self,
        symbols: &[String],
        timeframe: Timeframe,
    ) -> GatewayResult<Vec<String>> {
        let mut channels = vec![Self::data_channel(timeframe)];
        if self.config.include_ticker {
            channels.push(TICKER);
        }
        channels.push(HEARTBEATS);
        self.control_frames("subscribe", symbols, &channels)
    }

    fn unsubscribe_frames(
        &mut self,
        symbols: &[String],
        timeframe: Timeframe,
        remaining: &SubscriptionSet,
    ) -> GatewayResult<Vec<String>> {
        for symbol in symbols {
            match timeframe {
                AGGREGATED_TIMEFRAME => {
                    self.aggregator.remove(symbol);
                }
                _ => {
                    self.tracked.remove(symbol);
                }
            }
        }
        let mut frames =
            self.control_frames("unsubscribe", symbols, &[Self::data_channel(timeframe)])?;

        // The ticker is per product; drop it once no timeframe needs the product
        if self.config.include_ticker {
            let still_wanted = remaining.symbols();
            let orphaned: Vec<String> = symbols
                .iter()
                .filter(|s| !still_wanted.contains(s))
                .cloned()
                .collect();
            if !orphaned.is_empty() {
                frames.extend(self.control_frames("unsubscribe", &orphaned, &[TICKER])?);
            }
        }
        Ok(frames)
    }

    fn on_connected(&mut self, _subscriptions: &SubscriptionSet, _now: Instant) {
        // Sequence numbers restart with each connection
        self.sequence.reset();
        self.tracked.clear();
        self.aggregator.clear();
    }

    fn handle_text(&mut self, text: &str, _now: Instant) -> Vec<MarketUpdate> {
        let msg: ChannelMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("unparseable message: {}", e);
                return Vec::new();
            }
        };

        if let Some(seq) = msg.sequence_num
            && let Some(gap) = self.sequence.observe(seq)
        {
            debug!(sequence = seq, gap, "sequence gap");
        }

        let mut updates = Vec::new();
        match msg.channel.as_str() {
            CANDLES => self.handle_candles(msg.events, msg.sequence_num, &mut updates),
            MARKET_TRADES => self.handle_trades(msg.events, &mut updates),
            TICKER => self.handle_ticker(msg.events, msg.timestamp.as_deref(), &mut updates),
            HEARTBEATS | "subscriptions" => {}
            other => trace!(channel = other, "unhandled channel"),
        }
        updates
    }

    fn take_gap_detected(&mut self) -> bool {
        self.sequence.take_needs_backfill()
    }

    fn report_gaps(&mut self) {
        if let Some(report) = self.sequence.take_report() {
            warn!(
                exchange = %self.exchange,
                gaps = report.gaps,
                dropped = report.dropped,
                late_trades = self.aggregator.late_trades(),
                "sequence gaps since last report"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::StaticTokenProvider;
    use rust_decimal_macros::dec;

    fn handler_with(close_payload: ClosePayload) -> CoinbaseHandler {
        let config = CoinbaseConfig {
            close_payload,
            ..CoinbaseConfig::default()
        };
        CoinbaseHandler::new(config, Arc::new(StaticTokenProvider::new("token")))
    }

    fn handler() -> CoinbaseHandler {
        handler_with(ClosePayload::Incoming)
    }

    fn candles_msg(seq: u64, kind: &str, start: i64, close: &str) -> String {
        format!(
            r#"{{"channel":"candles","client_id":"","timestamp":"2023-11-14T22:15:00.5Z",
            "sequence_num":{seq},"events":[{{"type":"{kind}","candles":[{{"start":"{start}",
            "high":"37100","low":"36900","open":"37000","close":"{close}","volume":"4.2",
            "product_id":"BTC-USD"}}]}}]}}"#
        )
    }

    fn trades_msg(seq: u64, kind: &str, trades: &[(&str, &str, &str)]) -> String {
        let trades: Vec<String> = trades
            .iter()
            .enumerate()
            .map(|(i, (price, size, time))| {
                format!(
                    r#"{{"trade_id":"{i}","product_id":"BTC-USD","price":"{price}","size":"{size}","side":"BUY","time":"{time}"}}"#
                )
            })
            .collect();
        format!(
            r#"{{"channel":"market_trades","timestamp":"2023-11-14T22:15:00Z","sequence_num":{seq},
            "events":[{{"type":"{kind}","trades":[{}]}}]}}"#,
            trades.join(",")
        )
    }

    fn closes(updates: &[MarketUpdate]) -> Vec<&UnifiedCandle> {
        updates
            .iter()
            .filter_map(|u| match u {
                MarketUpdate::CandleClosed(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    const T0: i64 = 1_700_000_100; // 5m aligned, seconds
    const T1: i64 = T0 + 300;

    #[test]
    fn test_snapshot_never_closes() {
        let mut h = handler();
        let now = Instant::now();
        let updates = h.handle_text(&candles_msg(1, "snapshot", T0, "37050"), now);
        assert!(closes(&updates).is_empty());
        let updates = h.handle_text(&candles_msg(2, "snapshot", T1, "37060"), now);
        assert!(closes(&updates).is_empty());
    }

    #[test]
    fn test_update_with_new_start_closes_once() {
        let mut h = handler();
        let now = Instant::now();
        h.handle_text(&candles_msg(1, "snapshot", T0, "37050"), now);
        assert!(closes(&h.handle_text(&candles_msg(2, "update", T0, "37055"), now)).is_empty());

        let updates = h.handle_text(&candles_msg(3, "update", T1, "37070"), now);
        let closed = closes(&updates);
        assert_eq!(closed.len(), 1);
        // Close event carries the arriving bar
        assert_eq!(closed[0].timestamp, T1 * 1000);
        assert_eq!(closed[0].close, dec!(37070));
        assert_eq!(closed[0].sequence_number, Some(3));

        // The prior bar is persisted as finalized
        let finalized = updates.iter().find_map(|u| match u {
            MarketUpdate::Candle(c) if c.is_closed => Some(c),
            _ => None,
        });
        let finalized = finalized.expect("prior bar written");
        assert_eq!(finalized.timestamp, T0 * 1000);
        assert_eq!(finalized.close, dec!(37055));

        assert!(closes(&h.handle_text(&candles_msg(4, "update", T1, "37080"), now)).is_empty());
    }

    #[test]
    fn test_tracked_prior_close_payload() {
        let mut h = handler_with(ClosePayload::TrackedPrior);
        let now = Instant::now();
        h.handle_text(&candles_msg(1, "update", T0, "37055"), now);
        let updates = h.handle_text(&candles_msg(2, "update", T1, "37070"), now);
        let closed = closes(&updates);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].timestamp, T0 * 1000);
        assert_eq!(closed[0].close, dec!(37055));
        assert!(closed[0].is_closed);
    }

    #[test]
    fn test_sequence_gap_sets_backfill_flag() {
        let mut h = handler();
        let now = Instant::now();
        for seq in [1, 2, 3] {
            h.handle_text(&candles_msg(seq, "update", T0, "1"), now);
        }
        assert!(!h.take_gap_detected());
        h.handle_text(&candles_msg(6, "update", T0, "1"), now);
        assert!(h.take_gap_detected());
        assert!(!h.take_gap_detected());
    }

    #[test]
    fn test_reconnect_resets_sequence_and_tracking() {
        let mut h = handler();
        let now = Instant::now();
        h.handle_text(&candles_msg(10, "update", T0, "1"), now);
        h.on_connected(&SubscriptionSet::new(), now);

        // Fresh counter: no gap, and no close against the pre-reconnect bar
        let updates = h.handle_text(&candles_msg(1, "update", T1, "2"), now);
        assert!(closes(&updates).is_empty());
        assert!(!h.take_gap_detected());
    }

    #[test]
    fn test_trades_aggregate_into_minute_bars() {
        let mut h = handler();
        let now = Instant::now();
        // Newest first, as delivered
        let text = trades_msg(
            1,
            "update",
            &[
                ("101", "0.5", "2023-11-14T22:13:40Z"),
                ("99", "1", "2023-11-14T22:13:30Z"),
                ("100", "2", "2023-11-14T22:13:21Z"),
            ],
        );
        let updates = h.handle_text(&text, now);
        assert!(closes(&updates).is_empty());
        let MarketUpdate::Candle(bar) = &updates[0] else {
            panic!("expected in-progress bar");
        };
        assert_eq!(bar.timeframe, Timeframe::M1);
        assert_eq!(bar.timestamp, 1_699_999_980_000);
        assert_eq!(bar.open, dec!(100));
        assert_eq!(bar.high, dec!(101));
        assert_eq!(bar.low, dec!(99));
        assert_eq!(bar.close, dec!(101));
        assert_eq!(bar.volume, dec!(3.5));

        let text = trades_msg(2, "update", &[("102", "1", "2023-11-14T22:14:02Z")]);
        let updates = h.handle_text(&text, now);
        let closed = closes(&updates);
        assert_eq!(closed.len(), 1);
        assert!(closed[0].is_closed);
        assert_eq!(closed[0].close, dec!(101));
        assert_eq!(closed[0].volume, dec!(3.5));
    }

    #[test]
    fn test_trade_snapshots_ignored() {
        let mut h = handler();
        let text = trades_msg(1, "snapshot", &[("100", "1", "2023-11-14T22:13:21Z")]);
        assert!(h.handle_text(&text, Instant::now()).is_empty());
    }

    #[test]
    fn test_ticker_derives_absolute_change() {
        let mut h = handler();
        let text = r#"{"channel":"ticker","timestamp":"2023-11-14T22:13:20.250Z","sequence_num":1,
            "events":[{"type":"update","tickers":[{"type":"ticker","product_id":"BTC-USD",
            "price":"110","volume_24_h":"1000","low_24_h":"95","high_24_h":"112",
            "low_52_w":"1","high_52_w":"2","price_percent_chg_24_h":"10"}]}]}"#;
        let updates = h.handle_text(text, Instant::now());
        let MarketUpdate::Ticker(t) = &updates[0] else {
            panic!("expected ticker");
        };
        assert_eq!(t.change_24h, dec!(10));
        assert_eq!(t.change_percent_24h, dec!(10));
        assert_eq!(t.updated_at, 1_700_000_000_250);
    }

    #[test]
    fn test_subscribe_frames_carry_fresh_token() {
        let mut h = handler();
        let frames = h
            .subscribe_frames(&["BTC-USD".to_string()], Timeframe::M5)
            .unwrap();
        assert_eq!(frames.len(), 3);
        let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(first["type"], "subscribe");
        assert_eq!(first["channel"], "candles");
        assert_eq!(first["product_ids"][0], "BTC-USD");
        assert_eq!(first["jwt"], "token");

        let frames = h
            .subscribe_frames(&["BTC-USD".to_string()], Timeframe::M1)
            .unwrap();
        let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(first["channel"], "market_trades");
    }

    #[test]
    fn test_ticker_unsubscribed_with_last_timeframe() {
        let mut h = handler();
        assert!(h.config.include_ticker);
        let btc = vec!["BTC-USD".to_string()];
        let mut remaining = SubscriptionSet::new();
        remaining.add(&btc, Timeframe::M1);

        // 1m still needs the product
        let frames = h.unsubscribe_frames(&btc, Timeframe::M5, &remaining).unwrap();
        assert_eq!(frames.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["type"], "unsubscribe");
        assert_eq!(frame["channel"], "candles");

        remaining.remove(&btc, Timeframe::M1);
        let frames = h.unsubscribe_frames(&btc, Timeframe::M1, &remaining).unwrap();
        let channels: Vec<serde_json::Value> = frames
            .iter()
            .map(|f| serde_json::from_str::<serde_json::Value>(f).unwrap()["channel"].clone())
            .collect();
        assert_eq!(channels, vec!["market_trades", "ticker"]);
        let ticker: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(ticker["type"], "unsubscribe");
        assert_eq!(ticker["product_ids"][0], "BTC-USD");
    }

    #[test]
    fn test_supported_timeframes() {
        let h = handler();
        assert!(h.supports(Timeframe::M1));
        assert!(h.supports(Timeframe::M5));
        assert!(!h.supports(Timeframe::H1));
    }

    #[test]
    fn test_garbage_is_dropped() {
        let mut h = handler();
        assert!(h.handle_text("{", Instant::now()).is_empty());
        assert!(h
            .handle_text(r#"{"channel":"heartbeats","sequence_num":1,"events":[]}"#, Instant::now())
            .is_empty());
    }
}
