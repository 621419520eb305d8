use async_trait::async_trait;

use crate::PortResult;

/// Pub/sub bus for downstream consumers. Delivery is fire-and-forget.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> PortResult<()>;
}
