use candela_core::{ExchangeId, Timeframe};
use candela_gateway::{Backoff, ClosePayload, ConnectionConfig, PersistConfig};
use candela_reconcile::{BackfillConfig, BoundaryConfig, ReconcileConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::loader::ConfigError;

/// Root configuration for the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfigFile {
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub reconciliation: ReconciliationSection,
}

/// Exchanges with a protocol adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Binance,
    Coinbase,
}

impl ExchangeKind {
    pub fn exchange_id(&self) -> ExchangeId {
        match self {
            ExchangeKind::Binance => ExchangeId::binance(),
            ExchangeKind::Coinbase => ExchangeId::coinbase(),
        }
    }
}

/// Configuration for a single exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Adapter identifier ("binance", "coinbase")
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the adapter's public WebSocket endpoint
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Overrides the adapter's public REST endpoint
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    /// Signing material for authenticated control messages
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub options: AdapterOptions,
}

impl ExchangeConfig {
    pub fn kind(&self) -> Result<ExchangeKind, ConfigError> {
        match self.id.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeKind::Binance),
            "coinbase" => Ok(ExchangeKind::Coinbase),
            _ => Err(ConfigError::UnknownExchange(self.id.clone())),
        }
    }
}

/// Either an API key pair for HS256 tokens or a fixed pre-issued token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub key_name: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl CredentialsConfig {
    pub fn is_empty(&self) -> bool {
        self.token.as_deref().is_none_or(str::is_empty)
            && (self.key_name.is_empty() || self.secret.is_empty())
    }
}

/// Per-adapter switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterOptions {
    #[serde(default = "default_true")]
    pub include_ticker: bool,
    /// Coinbase only: which bar a timestamp-advance close carries
    #[serde(default)]
    pub close_payload: ClosePayload,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        AdapterOptions {
            include_ticker: true,
            close_payload: ClosePayload::default(),
        }
    }
}

/// Connection lifecycle settings shared by every adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSection {
    #[serde(default = "default_base_reconnect_delay")]
    pub base_reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_timeout_ms: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_freshness_window")]
    pub freshness_window_ms: u64,
    #[serde(default = "default_freshness_check_interval")]
    pub freshness_check_interval_ms: u64,
    #[serde(default = "default_gap_report_interval")]
    pub gap_report_interval_ms: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        ConnectionSection {
            base_reconnect_delay_ms: default_base_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            watchdog_timeout_ms: default_watchdog_timeout(),
            ping_interval_ms: default_ping_interval(),
            freshness_window_ms: default_freshness_window(),
            freshness_check_interval_ms: default_freshness_check_interval(),
            gap_report_interval_ms: default_gap_report_interval(),
            handshake_timeout_ms: default_handshake_timeout(),
        }
    }
}

impl ConnectionSection {
    /// Convert to the gateway's ConnectionConfig
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            backoff: Backoff::new(
                Duration::from_millis(self.base_reconnect_delay_ms),
                Duration::from_millis(self.max_reconnect_delay_ms),
                self.max_reconnect_attempts,
            ),
            watchdog_timeout: Duration::from_millis(self.watchdog_timeout_ms),
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            freshness_check_interval: Duration::from_millis(self.freshness_check_interval_ms),
            gap_report_interval: Duration::from_millis(self.gap_report_interval_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            ..ConnectionConfig::default()
        }
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }
}

/// Persistence queue, output channels and shutdown drain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Templates with `{exchange}`, `{symbol}` and `{timeframe}` placeholders
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// Ticker templates with `{exchange}` and `{symbol}`; empty keeps tickers cache-only
    #[serde(default = "default_ticker_channels")]
    pub ticker_channels: Vec<String>,
    #[serde(default = "default_ticker_ttl")]
    pub ticker_ttl_ms: u64,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        PersistenceSection {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            channels: default_channels(),
            ticker_channels: default_ticker_channels(),
            ticker_ttl_ms: default_ticker_ttl(),
            drain_timeout_ms: default_drain_timeout(),
        }
    }
}

impl PersistenceSection {
    pub fn to_persist_config(&self) -> PersistConfig {
        PersistConfig {
            queue_capacity: self.queue_capacity,
            workers: self.workers,
            channels: self.channels.clone(),
            ticker_channels: self.ticker_channels.clone(),
            ticker_ttl: Duration::from_millis(self.ticker_ttl_ms),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Backfill and boundary fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backfill_threshold")]
    pub backfill_threshold_ms: u64,
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    #[serde(default = "default_lookback_bars")]
    pub lookback_bars: u32,
    #[serde(default = "default_boundary_timeframes")]
    pub boundary_timeframes: Vec<Timeframe>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_boundary_retention")]
    pub boundary_retention_ms: u64,
}

impl Default for ReconciliationSection {
    fn default() -> Self {
        ReconciliationSection {
            enabled: true,
            backfill_threshold_ms: default_backfill_threshold(),
            request_delay_ms: default_request_delay(),
            lookback_bars: default_lookback_bars(),
            boundary_timeframes: default_boundary_timeframes(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            boundary_retention_ms: default_boundary_retention(),
        }
    }
}

impl ReconciliationSection {
    /// Boundary checks are driven by closes of the exchange's streamed timeframe
    pub fn to_reconcile_config(&self, trigger: Timeframe) -> ReconcileConfig {
        ReconcileConfig {
            backfill: BackfillConfig {
                threshold: Duration::from_millis(self.backfill_threshold_ms),
                request_delay: Duration::from_millis(self.request_delay_ms),
                lookback_bars: self.lookback_bars,
            },
            boundary: BoundaryConfig {
                trigger,
                timeframes: self.boundary_timeframes.clone(),
                batch_size: self.batch_size,
                batch_delay: Duration::from_millis(self.batch_delay_ms),
                retention: Duration::from_millis(self.boundary_retention_ms),
            },
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_timeframe() -> Timeframe {
    Timeframe::M1
}

fn default_base_reconnect_delay() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_watchdog_timeout() -> u64 {
    60_000
}

fn default_ping_interval() -> u64 {
    20_000
}

fn default_freshness_window() -> u64 {
    180_000
}

fn default_freshness_check_interval() -> u64 {
    30_000
}

fn default_gap_report_interval() -> u64 {
    60_000
}

fn default_handshake_timeout() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_workers() -> usize {
    2
}

fn default_channels() -> Vec<String> {
    vec!["candles:{exchange}:{symbol}:{timeframe}".to_string()]
}

fn default_ticker_channels() -> Vec<String> {
    vec!["ticker:{exchange}:{symbol}".to_string()]
}

fn default_ticker_ttl() -> u64 {
    60_000
}

fn default_drain_timeout() -> u64 {
    5_000
}

fn default_backfill_threshold() -> u64 {
    5 * 60_000
}

fn default_request_delay() -> u64 {
    100
}

fn default_lookback_bars() -> u32 {
    60
}

fn default_boundary_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1]
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay() -> u64 {
    500
}

fn default_boundary_retention() -> u64 {
    24 * 60 * 60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_exchange_config() {
        let json = r#"{
            "id": "binance",
            "symbols": ["BTCUSDT", "ETHUSDT"]
        }"#;

        let config: ExchangeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind().unwrap(), ExchangeKind::Binance);
        assert!(config.enabled);
        assert_eq!(config.timeframe, Timeframe::M1);
        assert_eq!(config.ws_url, None);
        assert!(config.options.include_ticker);
        assert_eq!(config.options.close_payload, ClosePayload::Incoming);
    }

    #[test]
    fn test_unknown_exchange_kind() {
        let config: ExchangeConfig = serde_json::from_str(r#"{"id": "kraken"}"#).unwrap();
        assert!(matches!(config.kind(), Err(ConfigError::UnknownExchange(id)) if id == "kraken"));
    }

    #[test]
    fn test_close_payload_option() {
        let json = r#"{"id": "coinbase", "options": {"close_payload": "tracked_prior"}}"#;
        let config: ExchangeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.options.close_payload, ClosePayload::TrackedPrior);
    }

    #[test]
    fn test_section_defaults() {
        let connection = ConnectionSection::default().to_connection_config();
        assert_eq!(connection.backoff.base, Duration::from_secs(1));
        assert_eq!(connection.backoff.max, Duration::from_secs(30));
        assert_eq!(connection.backoff.max_attempts, 10);
        assert_eq!(connection.watchdog_timeout, Duration::from_secs(60));

        let persist = PersistenceSection::default().to_persist_config();
        assert_eq!(persist.queue_capacity, 10_000);
        assert_eq!(persist.workers, 2);
        assert_eq!(persist.channels, vec!["candles:{exchange}:{symbol}:{timeframe}".to_string()]);
        assert_eq!(persist.ticker_channels, vec!["ticker:{exchange}:{symbol}".to_string()]);

        let reconcile = ReconciliationSection::default().to_reconcile_config(Timeframe::M1);
        assert_eq!(reconcile.backfill.threshold, Duration::from_secs(300));
        assert_eq!(reconcile.backfill.request_delay, Duration::from_millis(100));
        assert_eq!(reconcile.backfill.lookback_bars, 60);
        assert_eq!(reconcile.boundary.batch_size, 5);
        assert_eq!(reconcile.boundary.batch_delay, Duration::from_millis(500));
        assert_eq!(
            reconcile.boundary.timeframes,
            vec![Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1]
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let json = r#"{
            "exchanges": [],
            "connection": { "base_reconnect_delay_ms": 250 },
            "reconciliation": { "batch_size": 2 }
        }"#;

        let config: FeedConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection.base_reconnect_delay_ms, 250);
        assert_eq!(config.connection.max_reconnect_delay_ms, 30_000);
        assert_eq!(config.reconciliation.batch_size, 2);
        assert_eq!(config.reconciliation.request_delay_ms, 100);
        assert_eq!(config.persistence.workers, 2);
    }

    #[test]
    fn test_credentials_presence() {
        assert!(CredentialsConfig::default().is_empty());
        let pair = CredentialsConfig {
            key_name: "organizations/x/apiKeys/y".to_string(),
            secret: "s3cret".to_string(),
            token: None,
        };
        assert!(!pair.is_empty());
        let token = CredentialsConfig {
            token: Some("jwt".to_string()),
            ..CredentialsConfig::default()
        };
        assert!(!token.is_empty());
    }
}
