//! Candela Runner - single-process candle feed
//!
//! Loads the JSON feed configuration and wires the framework together:
//!
//! ```text
//!   exchange sockets ──► adapters ──► PersistQueue ──► CandlePublisher ──► cache + bus
//!                           │ events                                         ▲
//!                           ▼                                                │
//!                  ReconciliationService ──► REST clients ───────────────────┘
//! ```
//!
//! - **Config**: file, embedded default and validation
//! - **Bootstrap**: store, queue workers, adapters and reconciliation
//! - **Telemetry**: tracing subscriber setup

pub mod bootstrap;
pub mod config;
pub mod telemetry;

pub use bootstrap::{BootstrapError, ExchangeHandle, Feed, FeedDeps};
pub use config::{ConfigError, FeedConfigFile, load_from_env};
