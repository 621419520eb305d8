use async_trait::async_trait;
use candela_ports::{EventBus, PortResult};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Broadcast-based event bus
///
/// Uses one tokio broadcast channel per channel name. Publishing to a
/// channel nobody has subscribed to is a no-op.
pub struct BroadcastBus {
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    /// Messages accepted by at least one subscriber
    delivered: Arc<AtomicU64>,
    /// Channel capacity
    capacity: usize,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        BroadcastBus {
            channels: Arc::new(DashMap::new()),
            delivered: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a channel by exact name
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Clone for BroadcastBus {
    fn clone(&self) -> Self {
        BroadcastBus {
            channels: Arc::clone(&self.channels),
            delivered: Arc::clone(&self.delivered),
            capacity: self.capacity,
        }
    }
}

#[async_trait]
impl EventBus for BroadcastBus {
    async fn publish(&self, channel: &str, payload: &str) -> PortResult<()> {
        if let Some(tx) = self.channels.get(channel) {
            // Ignore send errors (no subscribers)
            if tx.send(payload.to_string()).is_ok() {
                self.delivered.fetch_add(1, Ordering::SeqCst);
            }
        } else {
            tracing::trace!(channel, "publish with no subscribers");
        }
        Ok(())
    }
}
