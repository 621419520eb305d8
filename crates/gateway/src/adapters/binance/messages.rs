//! Binance combined-stream wire format

use rust_decimal::Decimal;
use serde::Deserialize;

/// Combined stream message wrapper
#[derive(Debug, Deserialize)]
pub struct CombinedStreamMessage {
    pub stream: String,
    pub data: serde_json::Value,
}

/// `<symbol>@kline_<interval>` payload
#[derive(Debug, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: Kline,
}

#[derive(Debug, Deserialize)]
pub struct Kline {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Bar is final
    #[serde(rename = "x")]
    pub is_closed: bool,
}

/// `<symbol>@ticker` (24hrTicker) payload
#[derive(Debug, Deserialize)]
pub struct Ticker24h {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price_change: Decimal,
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    #[serde(rename = "c")]
    pub last_price: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
}
