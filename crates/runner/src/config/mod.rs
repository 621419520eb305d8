//! Feed configuration
//!
//! JSON file with one entry per exchange plus shared connection,
//! persistence and reconciliation sections. Every field has a default.

mod loader;
mod types;

pub use loader::{CONFIG_ENV, ConfigError, load_config, load_config_from_str, load_default_config, load_from_env};
pub use types::{
    AdapterOptions, ConnectionSection, CredentialsConfig, ExchangeConfig, ExchangeKind,
    FeedConfigFile, PersistenceSection, ReconciliationSection,
};
