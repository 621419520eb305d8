//! Infrastructure Layer - Inbound adapters from upstream systems
//!
//! This layer contains adapters for systems we consume from:
//! - WsClient: WebSocket transport behind the `SocketConnector` seam
//! - RestClient: HTTP client shared by the exchange history fetchers
//! - Token providers: signed short-lived tokens for authenticated channels
//!
//! Follows Hexagonal Architecture:
//! - Infrastructure = inbound (exchanges → gateway)
//! - Presentation = outbound (gateway → consumers)

pub mod rest_client;
pub mod token;
pub mod ws_client;

pub use rest_client::{RestClient, RestError};
pub use token::{HmacTokenProvider, StaticTokenProvider};
pub use ws_client::WsClient;
