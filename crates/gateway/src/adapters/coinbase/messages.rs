//! Coinbase Advanced Trade WebSocket wire format

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Envelope shared by every channel
#[derive(Debug, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub sequence_num: Option<u64>,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CandlesEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub candles: Vec<WireCandle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCandle {
    /// Period start, epoch seconds as a string
    pub start: String,
    pub high: Decimal,
    pub low: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TradesEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub trades: Vec<WireTrade>,
}

#[derive(Debug, Deserialize)]
pub struct WireTrade {
    #[serde(default)]
    pub trade_id: Option<String>,
    pub product_id: String,
    pub price: Decimal,
    pub size: Decimal,
    /// RFC 3339
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct TickerEvent {
    #[serde(default)]
    pub tickers: Vec<WireTicker>,
}

#[derive(Debug, Deserialize)]
pub struct WireTicker {
    pub product_id: String,
    pub price: Decimal,
    pub volume_24_h: Decimal,
    pub low_24_h: Decimal,
    pub high_24_h: Decimal,
    pub price_percent_chg_24_h: Decimal,
}

/// Outbound subscribe/unsubscribe frame
#[derive(Debug, Serialize)]
pub struct ControlFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub product_ids: &'a [String],
    pub channel: &'a str,
    pub jwt: String,
}

/// REST `/candles` response
#[derive(Debug, Deserialize)]
pub struct CandlesResponse {
    #[serde(default)]
    pub candles: Vec<RestCandle>,
}

#[derive(Debug, Deserialize)]
pub struct RestCandle {
    pub start: String,
    pub low: Decimal,
    pub high: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ticker_event_decodes_snapshot_and_update() {
        for kind in ["snapshot", "update"] {
            let event: TickerEvent = serde_json::from_value(serde_json::json!({
                "type": kind,
                "tickers": [{"type": "ticker", "product_id": "BTC-USD", "price": "37010.5",
                    "volume_24_h": "25000.1", "low_24_h": "36800", "high_24_h": "37400",
                    "price_percent_chg_24_h": "-0.672"}]
            }))
            .unwrap();
            assert_eq!(event.tickers.len(), 1);
            assert_eq!(event.tickers[0].product_id, "BTC-USD");
            assert_eq!(event.tickers[0].price_percent_chg_24_h, dec!(-0.672));
        }
    }
}
