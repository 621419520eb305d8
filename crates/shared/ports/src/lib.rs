//! Candela Ports
//!
//! Port definitions (traits) for the collaborators the adapter framework
//! consumes: time, the versioned candle cache, the pub/sub bus, REST history
//! and signed-token issuance.
//! These define the boundaries between domain logic and infrastructure.

mod cache;
mod clock;
mod error;
mod event_bus;
mod fetcher;
mod token;

pub use cache::CandleCache;
pub use clock::Clock;
pub use error::{FetchError, PortError, PortResult};
pub use event_bus::EventBus;
pub use fetcher::CandleFetcher;
pub use token::TokenProvider;
