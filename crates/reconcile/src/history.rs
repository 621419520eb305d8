use candela_core::{TimestampMs, UnifiedCandle};
use candela_ports::{CandleCache, PortResult};

/// Versioned write of REST history. Bars whose period has elapsed at `now`
/// are stored as final. Returns how many writes took effect.
pub(crate) async fn write_history(
    cache: &dyn CandleCache,
    candles: Vec<UnifiedCandle>,
    now: TimestampMs,
) -> PortResult<usize> {
    let mut written = 0;
    for candle in candles {
        let candle = if candle.period_elapsed(now) {
            candle.closed()
        } else {
            candle
        };
        if cache.add_candle_if_newer(&candle).await? {
            written += 1;
        }
    }
    Ok(written)
}
