//! Integration test: exchange adapters end to end
//!
//! Frames enter through an in-process socket and flow through the protocol
//! handler, the persistence queue, the cache and the bus.

mod common;

use candela_core::{ExchangeId, Timeframe};
use candela_gateway::{
    AdapterEvent, BinanceAdapter, BinanceConfig, CandlePublisher, CoinbaseAdapter, CoinbaseConfig,
    ConnectionConfig, ExchangeAdapter, GatewayError, PersistConfig, PersistQueue,
    StaticTokenProvider,
};
use candela_store::{BroadcastBus, InMemoryCandleCache};
use common::{MockConnector, drain_events};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Sink {
    cache: Arc<InMemoryCandleCache>,
    bus: Arc<BroadcastBus>,
    queue: PersistQueue,
}

fn sink() -> Sink {
    let cache = Arc::new(InMemoryCandleCache::new());
    let bus = Arc::new(BroadcastBus::default());
    let queue = PersistQueue::new(1000);
    let publisher = CandlePublisher::new(
        cache.clone(),
        bus.clone(),
        PersistConfig::default().channels,
        Duration::from_secs(60),
    );
    queue.spawn_workers(1, Arc::new(publisher));
    Sink { cache, bus, queue }
}

fn closes(events: &[AdapterEvent]) -> Vec<&candela_core::UnifiedCandle> {
    events
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::CandleClose(c) => Some(c),
            _ => None,
        })
        .collect()
}

fn binance_kline(closed: bool, close: &str) -> String {
    format!(
        r#"{{"stream":"btcusdt@kline_1m","data":{{"e":"kline","E":1700000060001,"s":"BTCUSDT",
        "k":{{"t":1699999980000,"T":1700000039999,"s":"BTCUSDT","i":"1m","o":"100","c":"{close}",
        "h":"110","l":"95","v":"7.5","x":{closed}}}}}}}"#
    )
}

#[tokio::test(start_paused = true)]
async fn test_binance_close_reaches_cache_and_bus() {
    let sink = sink();
    let mut channel = sink.bus.subscribe("candles:binance:BTCUSDT:1m");
    let (connector, mut peers) = MockConnector::new();
    let adapter = BinanceAdapter::new(
        BinanceConfig::default(),
        connector.clone(),
        ConnectionConfig::default(),
        sink.queue.clone(),
    );
    let mut events = adapter.events();

    adapter.connect().await.expect("connect");
    let _bare = peers.recv().await.expect("bare socket");

    // Lower-case input is normalized; the stream list is baked into the URL
    adapter
        .subscribe(&["btcusdt".to_string()], Timeframe::M1)
        .await
        .expect("subscribe");
    let peer = peers.recv().await.expect("resubscribed socket");
    assert!(peer
        .endpoint
        .ends_with("/stream?streams=btcusdt@kline_1m/btcusdt@ticker"));
    assert_eq!(connector.attempts(), 2);

    peer.send_text(binance_kline(false, "104")).await;
    peer.send_text(binance_kline(true, "105")).await;
    sleep(Duration::from_secs(1)).await;
    assert!(sink.queue.drain(Duration::from_secs(1)).await);

    let collected = drain_events(&mut events);
    let closed = closes(&collected);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].close, dec!(105));

    let stored = sink
        .cache
        .get(&ExchangeId::binance(), "BTCUSDT", Timeframe::M1, 1_699_999_980_000)
        .expect("stored candle");
    assert!(stored.is_closed);
    assert_eq!(stored.close, dec!(105));

    let payload = channel.recv().await.expect("published");
    let json: serde_json::Value = serde_json::from_str(&payload).expect("json");
    assert_eq!(json["symbol"], "BTCUSDT");
    assert_eq!(json["timeframe"], "1m");
}

const T0: i64 = 1_700_000_100;
const T1: i64 = T0 + 300;

fn coinbase_candles(seq: u64, kind: &str, start: i64, close: &str) -> String {
    format!(
        r#"{{"channel":"candles","timestamp":"2023-11-14T22:20:00Z","sequence_num":{seq},
        "events":[{{"type":"{kind}","candles":[{{"start":"{start}","high":"110","low":"90",
        "open":"100","close":"{close}","volume":"3","product_id":"BTC-USD"}}]}}]}}"#
    )
}

fn coinbase_adapter(connector: Arc<MockConnector>, queue: PersistQueue) -> CoinbaseAdapter {
    CoinbaseAdapter::new(
        CoinbaseConfig::default(),
        Arc::new(StaticTokenProvider::new("signed-token")),
        connector,
        ConnectionConfig::default(),
        queue,
    )
}

#[tokio::test(start_paused = true)]
async fn test_coinbase_timestamp_advance_closes_once() {
    let sink = sink();
    let (connector, mut peers) = MockConnector::new();
    let adapter = coinbase_adapter(connector.clone(), sink.queue.clone());
    let mut events = adapter.events();

    adapter.connect().await.expect("connect");
    let mut peer = peers.recv().await.expect("socket");
    adapter
        .subscribe(&["btc-usd".to_string()], Timeframe::M5)
        .await
        .expect("subscribe");

    let frame: serde_json::Value = serde_json::from_str(&peer.next_text().await).unwrap();
    assert_eq!(frame["type"], "subscribe");
    assert_eq!(frame["channel"], "candles");
    assert_eq!(frame["product_ids"][0], "BTC-USD");
    assert_eq!(frame["jwt"], "signed-token");

    // Snapshot bursts replay history and must not close anything
    peer.send_text(coinbase_candles(1, "snapshot", T0 - 300, "99")).await;
    peer.send_text(coinbase_candles(2, "snapshot", T0, "100")).await;
    peer.send_text(coinbase_candles(3, "update", T0, "101")).await;
    peer.send_text(coinbase_candles(4, "update", T1, "102")).await;
    peer.send_text(coinbase_candles(5, "update", T1, "103")).await;
    sleep(Duration::from_secs(1)).await;
    assert!(sink.queue.drain(Duration::from_secs(1)).await);

    let collected = drain_events(&mut events);
    assert_eq!(closes(&collected).len(), 1);

    // The finished bar is stored as final with its last tracked values
    let prior = sink
        .cache
        .get(&ExchangeId::coinbase(), "BTC-USD", Timeframe::M5, T0 * 1000)
        .expect("prior bar");
    assert!(prior.is_closed);
    assert_eq!(prior.close, dec!(101));
}

#[tokio::test(start_paused = true)]
async fn test_coinbase_replays_subscriptions_and_reports_gap() {
    let sink = sink();
    let (connector, mut peers) = MockConnector::new();
    let adapter = coinbase_adapter(connector.clone(), sink.queue.clone());
    let mut events = adapter.events();

    adapter.connect().await.expect("connect");
    let mut peer = peers.recv().await.expect("socket");
    adapter
        .subscribe(&["BTC-USD".to_string()], Timeframe::M5)
        .await
        .expect("subscribe");
    peer.next_text().await;

    for seq in [1, 2, 3, 7] {
        peer.send_text(coinbase_candles(seq, "update", T0, "100")).await;
    }
    sleep(Duration::from_millis(10)).await;
    drop(peer);
    sleep(Duration::from_secs(2)).await;

    let mut replayed = peers.recv().await.expect("reconnected socket");
    let frame: serde_json::Value = serde_json::from_str(&replayed.next_text().await).unwrap();
    assert_eq!(frame["type"], "subscribe");
    assert_eq!(frame["channel"], "candles");
    assert_eq!(frame["product_ids"][0], "BTC-USD");

    let info = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            AdapterEvent::Connected(info) => Some(info),
            _ => None,
        })
        .last()
        .expect("connected event");
    assert!(info.reconnected);
    assert!(info.gap_detected);
    assert_eq!(info.subscriptions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_coinbase_rejects_unsupported_timeframe() {
    let (connector, mut peers) = MockConnector::new();
    let adapter = coinbase_adapter(connector, PersistQueue::new(10));
    adapter.connect().await.expect("connect");
    let _peer = peers.recv().await.expect("socket");

    let err = adapter
        .subscribe(&["BTC-USD".to_string()], Timeframe::H1)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedTimeframe(Timeframe::H1)));
}

#[tokio::test(start_paused = true)]
async fn test_coinbase_unsubscribe_sends_control_frame() {
    let (connector, mut peers) = MockConnector::new();
    let adapter = coinbase_adapter(connector, PersistQueue::new(10));
    adapter.connect().await.expect("connect");
    let mut peer = peers.recv().await.expect("socket");

    let symbols = vec!["BTC-USD".to_string()];
    adapter.subscribe(&symbols, Timeframe::M1).await.expect("subscribe");
    let frame: serde_json::Value = serde_json::from_str(&peer.next_text().await).unwrap();
    assert_eq!(frame["channel"], "market_trades");
    // ticker + heartbeats
    peer.next_text().await;
    peer.next_text().await;

    adapter.unsubscribe(&symbols, Timeframe::M1).await.expect("unsubscribe");
    let frame: serde_json::Value = serde_json::from_str(&peer.next_text().await).unwrap();
    assert_eq!(frame["type"], "unsubscribe");
    assert_eq!(frame["channel"], "market_trades");
    assert!(adapter.core().subscriptions().await.is_empty());
}
