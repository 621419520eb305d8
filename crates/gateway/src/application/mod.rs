pub mod adapter;
pub mod config;
pub mod connection;
pub mod persist_queue;

pub use adapter::ExchangeAdapter;
pub use config::{ConnectionConfig, PersistConfig};
pub use connection::ConnectionCore;
pub use persist_queue::{PersistJob, PersistQueue};
