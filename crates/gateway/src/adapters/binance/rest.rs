use async_trait::async_trait;
use candela_core::{ExchangeId, Timeframe, TimestampMs, UnifiedCandle};
use candela_ports::{CandleFetcher, FetchError};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

use crate::infrastructure::RestClient;

/// Maximum rows per `/api/v3/klines` request
const KLINE_LIMIT: usize = 1000;

/// Historical klines from the public Binance REST API
pub struct BinanceRestClient {
    rest: RestClient,
    exchange: ExchangeId,
}

impl BinanceRestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        BinanceRestClient {
            rest: RestClient::new(base_url),
            exchange: ExchangeId::binance(),
        }
    }

    fn parse_row(
        &self,
        row: &[Value],
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<UnifiedCandle, FetchError> {
        if row.len() < 6 {
            return Err(FetchError::Parse(format!("kline row has {} fields", row.len())));
        }
        let open_time = row[0]
            .as_i64()
            .ok_or_else(|| FetchError::Parse("kline open time is not an integer".into()))?;

        Ok(UnifiedCandle {
            timestamp: timeframe.floor(open_time),
            open: decimal(&row[1])?,
            high: decimal(&row[2])?,
            low: decimal(&row[3])?,
            close: decimal(&row[4])?,
            volume: decimal(&row[5])?,
            symbol: symbol.to_string(),
            timeframe,
            exchange: self.exchange.clone(),
            sequence_number: None,
            is_closed: false,
        })
    }
}

#[async_trait]
impl CandleFetcher for BinanceRestClient {
    fn exchange(&self) -> ExchangeId {
        self.exchange.clone()
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: TimestampMs,
        to: TimestampMs,
    ) -> Result<Vec<UnifiedCandle>, FetchError> {
        let symbol = symbol.to_uppercase();
        let step = timeframe.duration_ms();
        let mut candles: Vec<UnifiedCandle> = Vec::new();
        let mut start = from;

        while start <= to {
            let rows: Vec<Vec<Value>> = self
                .rest
                .get(
                    "/api/v3/klines",
                    &[
                        ("symbol", symbol.clone()),
                        ("interval", timeframe.as_str().to_string()),
                        ("startTime", start.to_string()),
                        ("endTime", to.to_string()),
                        ("limit", KLINE_LIMIT.to_string()),
                    ],
                )
                .await?;
            let page = rows.len();
            debug!(%symbol, %timeframe, start, page, "fetched klines");

            for row in &rows {
                let candle = self.parse_row(row, &symbol, timeframe)?;
                if candles.last().is_none_or(|last| candle.timestamp > last.timestamp) {
                    candles.push(candle);
                }
            }

            match candles.last() {
                Some(last) if page >= KLINE_LIMIT => start = last.timestamp + step,
                _ => break,
            }
        }

        Ok(candles)
    }
}

/// Binance encodes prices as strings but tolerate bare numbers too
fn decimal(value: &Value) -> Result<Decimal, FetchError> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FetchError::Parse(format!("not a decimal: {}", value)))
}
