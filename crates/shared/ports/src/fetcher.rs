use async_trait::async_trait;
use candela_core::{ExchangeId, Timeframe, TimestampMs, UnifiedCandle};

use crate::FetchError;

/// Historical candles over REST.
/// Callers own pacing; implementations do not rate limit.
#[async_trait]
pub trait CandleFetcher: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    /// Bars whose period start lies in `[from, to]`, ascending
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: TimestampMs,
        to: TimestampMs,
    ) -> Result<Vec<UnifiedCandle>, FetchError>;
}
