//! Presentation Layer - Outbound interfaces to downstream consumers
//!
//! - CandlePublisher: versioned cache writes and bus publication
//!
//! Follows Hexagonal Architecture:
//! - Infrastructure = inbound (exchanges → gateway)
//! - Presentation = outbound (gateway → consumers)

mod publisher;

pub use publisher::{CandlePublisher, ChannelTemplate};
