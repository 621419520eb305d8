//! Gap detection over cached candle timestamps

use candela_core::{ExchangeId, Timeframe, TimestampMs};
use candela_ports::{CandleCache, PortResult};
use std::sync::Arc;

/// One contiguous run of missing bars. `start` and `end` are the first and
/// last missing period starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapInfo {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: TimestampMs,
    pub end: TimestampMs,
    pub count: u64,
}

/// Find every missing run on the grid `start, start + step, ..., <= end`.
///
/// `timestamps` must be sorted ascending. Values off the grid are ignored.
pub fn detect_gaps(
    symbol: &str,
    timeframe: Timeframe,
    timestamps: &[TimestampMs],
    start: TimestampMs,
    end: TimestampMs,
    step: TimestampMs,
) -> Vec<GapInfo> {
    let mut gaps = Vec::new();
    if step <= 0 || end < start {
        return gaps;
    }

    let gap = |first: TimestampMs, count: u64| GapInfo {
        symbol: symbol.to_string(),
        timeframe,
        start: first,
        end: first + (count as TimestampMs - 1) * step,
        count,
    };

    let mut run: Option<(TimestampMs, u64)> = None;
    let mut i = 0;
    let mut expected = start;
    while expected <= end {
        while i < timestamps.len() && timestamps[i] < expected {
            i += 1;
        }
        let present = timestamps.get(i) == Some(&expected);

        run = match (present, run) {
            (true, Some((first, count))) => {
                gaps.push(gap(first, count));
                None
            }
            (true, None) => None,
            (false, Some((first, count))) => Some((first, count + 1)),
            (false, None) => Some((expected, 1)),
        };
        expected += step;
    }
    if let Some((first, count)) = run {
        gaps.push(gap(first, count));
    }
    gaps
}

/// Runs [`detect_gaps`] against the cache's range query
pub struct GapScanner {
    cache: Arc<dyn CandleCache>,
}

impl GapScanner {
    pub fn new(cache: Arc<dyn CandleCache>) -> Self {
        GapScanner { cache }
    }

    /// Gaps among the bars of `symbol` whose period start lies in `[from, to]`
    pub async fn scan(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        timeframe: Timeframe,
        from: TimestampMs,
        to: TimestampMs,
    ) -> PortResult<Vec<GapInfo>> {
        let start = if timeframe.is_boundary(from) {
            from
        } else {
            timeframe.next(from)
        };
        let end = timeframe.floor(to);
        let timestamps: Vec<TimestampMs> = self
            .cache
            .get_candles(exchange, symbol, timeframe, start, end)
            .await?
            .into_iter()
            .map(|c| c.timestamp)
            .collect();

        Ok(detect_gaps(
            symbol,
            timeframe,
            &timestamps,
            start,
            end,
            timeframe.duration_ms(),
        ))
    }
}
