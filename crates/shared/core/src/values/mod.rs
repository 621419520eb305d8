use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value (trade size, bar volume)
pub type Quantity = Decimal;

/// Epoch milliseconds, UTC
pub type TimestampMs = i64;

/// Exchange-native trading pair (e.g. `BTCUSDT`, `BTC-USD`)
pub type Symbol = String;

/// Milliseconds in one minute
pub const MINUTE_MS: TimestampMs = 60_000;

/// Parse an RFC 3339 timestamp (e.g. `2024-03-14T10:07:12.345Z`) to epoch ms
pub fn parse_rfc3339_ms(s: &str) -> crate::CoreResult<TimestampMs> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| crate::CoreError::InvalidTimestamp(s.to_string()))
}

/// Render epoch ms as RFC 3339 for logs
pub fn format_ms(ts: TimestampMs) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
