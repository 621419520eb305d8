use std::path::Path;
use thiserror::Error;

use super::types::{ExchangeConfig, ExchangeKind, FeedConfigFile};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CANDELA_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("No enabled exchanges in config")]
    NoEnabledExchanges,
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),
    #[error("Exchange {0} is configured more than once")]
    DuplicateExchange(String),
    #[error("Exchange {0} has no symbols")]
    NoSymbols(String),
    #[error("Exchange {0} requires credentials")]
    MissingCredentials(String),
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Load feed configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FeedConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<FeedConfigFile, ConfigError> {
    let config: FeedConfigFile = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<FeedConfigFile, ConfigError> {
    let default_config = include_str!("feed_config.json");
    load_config_from_str(default_config)
}

/// Load the file named by `CANDELA_CONFIG`, or the embedded default
pub fn load_from_env() -> Result<FeedConfigFile, ConfigError> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.trim().is_empty() => load_config(path.trim()),
        _ => load_default_config(),
    }
}

impl FeedConfigFile {
    /// Get only enabled exchanges
    pub fn enabled_exchanges(&self) -> Vec<&ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled).collect()
    }

    /// Get a specific exchange by ID
    pub fn get_exchange(&self, id: &str) -> Option<&ExchangeConfig> {
        self.exchanges.iter().find(|e| e.id == id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled = self.enabled_exchanges();
        if enabled.is_empty() {
            return Err(ConfigError::NoEnabledExchanges);
        }

        let mut seen = Vec::new();
        for exchange in enabled {
            let kind = exchange.kind()?;
            if seen.contains(&kind) {
                return Err(ConfigError::DuplicateExchange(exchange.id.clone()));
            }
            seen.push(kind);

            if exchange.symbols.iter().all(|s| s.trim().is_empty()) {
                return Err(ConfigError::NoSymbols(exchange.id.clone()));
            }
            if kind == ExchangeKind::Coinbase
                && exchange.credentials.as_ref().is_none_or(|c| c.is_empty())
            {
                return Err(ConfigError::MissingCredentials(exchange.id.clone()));
            }
        }

        let connection = &self.connection;
        if connection.base_reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connection.base_reconnect_delay_ms",
                reason: "must be positive".to_string(),
            });
        }
        if connection.max_reconnect_delay_ms < connection.base_reconnect_delay_ms {
            return Err(ConfigError::Invalid {
                field: "connection.max_reconnect_delay_ms",
                reason: "must not be below the base delay".to_string(),
            });
        }
        if self.persistence.channels.is_empty() {
            return Err(ConfigError::Invalid {
                field: "persistence.channels",
                reason: "at least one channel template is required".to_string(),
            });
        }
        if self.persistence.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "persistence.workers",
                reason: "must be positive".to_string(),
            });
        }
        if self.reconciliation.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "reconciliation.batch_size",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binance_only() -> FeedConfigFile {
        load_config_from_str(r#"{"exchanges": [{"id": "binance", "symbols": ["BTCUSDT"]}]}"#).unwrap()
    }

    #[test]
    fn test_load_default_config() {
        let config = load_default_config().unwrap();
        assert!(!config.exchanges.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_enabled_exchanges() {
        let config = load_default_config().unwrap();
        let enabled = config.enabled_exchanges();
        assert!(enabled.iter().any(|e| e.id == "binance"));
        assert!(enabled.iter().all(|e| e.id != "coinbase"));
    }

    #[test]
    fn test_get_exchange() {
        let config = load_default_config().unwrap();
        let coinbase = config.get_exchange("coinbase").unwrap();
        assert_eq!(coinbase.symbols, vec!["BTC-USD".to_string(), "ETH-USD".to_string()]);
        assert!(config.get_exchange("kraken").is_none());
    }

    #[test]
    fn test_validate_rejects_no_enabled_exchanges() {
        let mut config = binance_only();
        config.exchanges[0].enabled = false;
        assert!(matches!(config.validate(), Err(ConfigError::NoEnabledExchanges)));
    }

    #[test]
    fn test_validate_rejects_missing_symbols() {
        let mut config = binance_only();
        config.exchanges[0].symbols.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoSymbols(_))));
    }

    #[test]
    fn test_validate_requires_coinbase_credentials() {
        let config = load_config_from_str(
            r#"{"exchanges": [{"id": "coinbase", "symbols": ["BTC-USD"]}]}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingCredentials(_))));

        let config = load_config_from_str(
            r#"{"exchanges": [{"id": "coinbase", "symbols": ["BTC-USD"],
                "credentials": {"key_name": "k", "secret": "s"}}]}"#,
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_timing() {
        let mut config = binance_only();
        config.exchanges.push(config.exchanges[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateExchange(_))));

        let mut config = binance_only();
        config.connection.max_reconnect_delay_ms = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "connection.max_reconnect_delay_ms", .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config("/nonexistent/candela.json");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
