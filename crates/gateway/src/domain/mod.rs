pub mod aggregation;
pub mod backoff;
pub mod events;
pub mod sequence;
pub mod state;
pub mod subscription;
pub mod traits;

pub use aggregation::{AggregateOutcome, TradeAggregator};
pub use backoff::Backoff;
pub use events::{AdapterEvent, ConnectedInfo, Frame, MarketUpdate, Outbound};
pub use sequence::{GapReport, SequenceTracker};
pub use state::ConnectionState;
pub use subscription::{Subscription, SubscriptionSet};
pub use traits::{ProtocolHandler, SocketConnector, SocketSession, SubscribeMode};
