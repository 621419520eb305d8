use async_trait::async_trait;
use candela_core::{ExchangeId, Timeframe, TimestampMs, UnifiedCandle};
use candela_ports::{CandleFetcher, FetchError};
use std::collections::BTreeMap;
use tracing::debug;

use super::messages::{CandlesResponse, RestCandle};
use crate::infrastructure::RestClient;

/// Bars per request, under the exchange's 350 cap
const PAGE_BARS: i64 = 300;

/// Historical candles from the public Coinbase Advanced Trade REST API
pub struct CoinbaseRestClient {
    rest: RestClient,
    exchange: ExchangeId,
}

impl CoinbaseRestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        CoinbaseRestClient {
            rest: RestClient::new(base_url),
            exchange: ExchangeId::coinbase(),
        }
    }

    fn to_candle(
        &self,
        bar: RestCandle,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<UnifiedCandle, FetchError> {
        let start: i64 = bar
            .start
            .parse()
            .map_err(|_| FetchError::Parse(format!("bad candle start {:?}", bar.start)))?;
        Ok(UnifiedCandle {
            timestamp: timeframe.floor(start * 1000),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            symbol: symbol.to_string(),
            timeframe,
            exchange: self.exchange.clone(),
            sequence_number: None,
            is_closed: false,
        })
    }
}

/// REST granularity name for a timeframe
pub fn granularity(timeframe: Timeframe) -> Option<&'static str> {
    match timeframe {
        Timeframe::M1 => Some("ONE_MINUTE"),
        Timeframe::M5 => Some("FIVE_MINUTE"),
        Timeframe::M15 => Some("FIFTEEN_MINUTE"),
        Timeframe::M30 => Some("THIRTY_MINUTE"),
        Timeframe::H1 => Some("ONE_HOUR"),
        Timeframe::H2 => Some("TWO_HOUR"),
        Timeframe::H6 => Some("SIX_HOUR"),
        Timeframe::D1 => Some("ONE_DAY"),
        Timeframe::M3 | Timeframe::H4 | Timeframe::H12 => None,
    }
}

/// Native timeframe fetched to build `timeframe`. Each one without a
/// granularity of its own divides evenly into a finer one that has.
pub fn source_timeframe(timeframe: Timeframe) -> Timeframe {
    match timeframe {
        Timeframe::M3 => Timeframe::M1,
        Timeframe::H4 => Timeframe::H2,
        Timeframe::H12 => Timeframe::H6,
        tf => tf,
    }
}

/// Fold ascending bars into `timeframe` periods.
///
/// Open comes from the first bar of a period and close from the last; high,
/// low and volume span all of them.
pub fn resample(bars: Vec<UnifiedCandle>, timeframe: Timeframe) -> Vec<UnifiedCandle> {
    let mut out: Vec<UnifiedCandle> = Vec::new();
    for bar in bars {
        let start = timeframe.floor(bar.timestamp);
        match out.last_mut() {
            Some(current) if current.timestamp == start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => out.push(UnifiedCandle {
                timestamp: start,
                timeframe,
                ..bar
            }),
        }
    }
    out
}

impl CoinbaseRestClient {
    /// Page `[from, to]` at a native granularity, ascending and deduplicated
    async fn fetch_native(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        granularity: &str,
        from: TimestampMs,
        to: TimestampMs,
    ) -> Result<Vec<UnifiedCandle>, FetchError> {
        let path = format!("/api/v3/brokerage/market/products/{}/candles", symbol);
        let step = timeframe.duration_ms();

        // Keyed by start so overlapping pages collapse
        let mut candles: BTreeMap<TimestampMs, UnifiedCandle> = BTreeMap::new();
        let mut start = timeframe.floor(from);

        while start <= to {
            let end = (start + step * (PAGE_BARS - 1)).min(to);
            let resp: CandlesResponse = self
                .rest
                .get(
                    &path,
                    &[
                        ("start", (start / 1000).to_string()),
                        ("end", (end / 1000).to_string()),
                        ("granularity", granularity.to_string()),
                    ],
                )
                .await?;
            debug!(%symbol, %timeframe, start, end, page = resp.candles.len(), "fetched candles");

            for bar in resp.candles {
                let candle = self.to_candle(bar, symbol, timeframe)?;
                if (from..=to).contains(&candle.timestamp) {
                    candles.insert(candle.timestamp, candle);
                }
            }
            start = end + step;
        }

        // The API answers newest first
        Ok(candles.into_values().collect())
    }
}

#[async_trait]
impl CandleFetcher for CoinbaseRestClient {
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
        if let Some(granularity) = granularity(timeframe) {
            return self.fetch_native(&symbol, timeframe, granularity, from, to).await;
        }

        let source = source_timeframe(timeframe);
        let granularity = granularity(source)
            .ok_or_else(|| FetchError::UnsupportedTimeframe(timeframe.to_string()))?;
        // Whole periods only: from the start of the first to the last source bar of the last
        let first = timeframe.floor(from);
        let last = timeframe.floor(to) + timeframe.duration_ms() - source.duration_ms();
        let bars = self.fetch_native(&symbol, source, granularity, first, last).await?;
        debug!(%symbol, %timeframe, %source, bars = bars.len(), "resampling candles");

        Ok(resample(bars, timeframe)
            .into_iter()
            .filter(|c| (from..=to).contains(&c.timestamp))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_granularity_mapping() {
        assert_eq!(granularity(Timeframe::M1), Some("ONE_MINUTE"));
        assert_eq!(granularity(Timeframe::D1), Some("ONE_DAY"));
        assert_eq!(granularity(Timeframe::H4), None);
        assert_eq!(granularity(Timeframe::M3), None);
    }

    #[test]
    fn test_rest_candle_conversion() {
        let client = CoinbaseRestClient::new("https://api.coinbase.com");
        let resp: CandlesResponse = serde_json::from_str(
            r#"{"candles":[{"start":"1700000100","low":"36900","high":"37100",
            "open":"37000","close":"37050","volume":"12.25"}]}"#,
        )
        .unwrap();
        let bar = resp.candles.into_iter().next().unwrap();
        let candle = client.to_candle(bar, "BTC-USD", Timeframe::M5).unwrap();
        assert_eq!(candle.timestamp, 1_700_000_100_000);
        assert_eq!(candle.close, dec!(37050));
        assert_eq!(candle.volume, dec!(12.25));
        assert_eq!(candle.exchange, ExchangeId::coinbase());
    }

    fn bar(timestamp: TimestampMs, open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> UnifiedCandle {
        UnifiedCandle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            symbol: "BTC-USD".to_string(),
            timeframe: Timeframe::H2,
            exchange: ExchangeId::coinbase(),
            sequence_number: None,
            is_closed: false,
        }
    }

    #[test]
    fn test_every_timeframe_has_a_native_source() {
        for tf in Timeframe::ALL {
            let source = source_timeframe(tf);
            assert!(granularity(source).is_some(), "{} has no source granularity", tf);
            assert_eq!(tf.duration_ms() % source.duration_ms(), 0);
        }
        assert_eq!(source_timeframe(Timeframe::H4), Timeframe::H2);
        assert_eq!(source_timeframe(Timeframe::M3), Timeframe::M1);
        assert_eq!(source_timeframe(Timeframe::H12), Timeframe::H6);
        assert_eq!(source_timeframe(Timeframe::H1), Timeframe::H1);
    }

    #[test]
    fn test_two_hour_bars_fold_into_four_hour_bar() {
        let h2 = Timeframe::H2.duration_ms();
        let start = Timeframe::H4.floor(1_699_996_800_000);
        let bars = vec![
            bar(start, dec!(100), dec!(120), dec!(95), dec!(110), dec!(2)),
            bar(start + h2, dec!(110), dec!(130), dec!(90), dec!(125), dec!(3.5)),
            bar(start + 2 * h2, dec!(125), dec!(126), dec!(124), dec!(125.5), dec!(1)),
        ];

        let out = resample(bars, Timeframe::H4);

        assert_eq!(out.len(), 2);
        let first = &out[0];
        assert_eq!(first.timestamp, start);
        assert_eq!(first.timeframe, Timeframe::H4);
        assert_eq!(first.open, dec!(100));
        assert_eq!(first.high, dec!(130));
        assert_eq!(first.low, dec!(90));
        assert_eq!(first.close, dec!(125));
        assert_eq!(first.volume, dec!(5.5));
        assert_eq!(out[1].timestamp, start + Timeframe::H4.duration_ms());
        assert_eq!(out[1].open, dec!(125));
    }

    /// Serve one HTTP response and hand back the request line
    async fn serve_once(body: String) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&request).to_string();
            text.lines().next().unwrap_or_default().to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_four_hour_candles_are_built_from_two_hour_bars() {
        let start = Timeframe::H4.floor(1_699_996_800_000);
        let second = (start + Timeframe::H2.duration_ms()) / 1000;
        // Newest first, as the API answers
        let body = format!(
            r#"{{"candles":[
            {{"start":"{}","low":"90","high":"130","open":"110","close":"125","volume":"3.5"}},
            {{"start":"{}","low":"95","high":"120","open":"100","close":"110","volume":"2"}}]}}"#,
            second,
            start / 1000
        );
        let (url, server) = serve_once(body).await;
        let client = CoinbaseRestClient::new(url);

        let candles = client
            .get_candles("btc-usd", Timeframe::H4, start, start)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.contains("/products/BTC-USD/candles"), "{}", request);
        assert!(request.contains("granularity=TWO_HOUR"), "{}", request);
        assert_eq!(candles.len(), 1);
        let candle = &candles[0];
        assert_eq!(candle.timestamp, start);
        assert_eq!(candle.timeframe, Timeframe::H4);
        assert_eq!(candle.open, dec!(100));
        assert_eq!(candle.high, dec!(130));
        assert_eq!(candle.low, dec!(90));
        assert_eq!(candle.close, dec!(125));
        assert_eq!(candle.volume, dec!(5.5));
    }
}
