use std::time::Duration;

use crate::domain::Backoff;

/// Lifecycle settings for one adapter's connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub backoff: Backoff,
    /// No inbound frame for this long forces a reconnect
    pub watchdog_timeout: Duration,
    /// Transport ping cadence while connected
    pub ping_interval: Duration,
    /// How often protocol handlers are asked whether the stream went stale
    pub freshness_check_interval: Duration,
    /// Cadence of aggregated sequence-gap logging
    pub gap_report_interval: Duration,
    /// Upper bound on a single handshake
    pub handshake_timeout: Duration,
    /// Adapter event broadcast capacity
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            backoff: Backoff::default(),
            watchdog_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(20),
            freshness_check_interval: Duration::from_secs(30),
            gap_report_interval: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            event_capacity: 1024,
        }
    }
}

/// Persistence queue and publish settings
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Queued jobs beyond this evict the oldest
    pub queue_capacity: usize,
    pub workers: usize,
    /// Output channel templates with `{exchange}`, `{symbol}`, `{timeframe}`
    pub channels: Vec<String>,
    /// Ticker channel templates with `{exchange}`, `{symbol}`
    pub ticker_channels: Vec<String>,
    pub ticker_ttl: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        PersistConfig {
            queue_capacity: 10_000,
            workers: 2,
            channels: vec!["candles:{exchange}:{symbol}:{timeframe}".to_string()],
            ticker_channels: vec!["ticker:{exchange}:{symbol}".to_string()],
            ticker_ttl: Duration::from_secs(60),
        }
    }
}
