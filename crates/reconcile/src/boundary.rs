//! Boundary-triggered coarser-timeframe fetch
//!
//! A close of the trigger timeframe that lands on a coarser timeframe's
//! period boundary means that coarser bar just finished. Its final values
//! are fetched over REST for every tracked symbol.

use candela_core::{ExchangeId, Timeframe, TimestampMs, UnifiedCandle};
use candela_ports::{CandleCache, CandleFetcher, Clock};
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BoundaryConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::history::write_history;

/// Alignment of one instant against one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeBoundary {
    pub timeframe: Timeframe,
    pub instant: TimestampMs,
    pub aligned: bool,
}

impl TimeframeBoundary {
    pub fn check(timeframe: Timeframe, instant: TimestampMs) -> Self {
        TimeframeBoundary {
            timeframe,
            instant,
            aligned: timeframe.is_boundary(instant),
        }
    }
}

/// Instant a close event marks as a period change.
///
/// A finalized bar ends at its period end. An in-progress bar carried by a
/// close event is the bar that just began, so its start is the boundary.
pub fn close_instant(candle: &UnifiedCandle) -> TimestampMs {
    if candle.is_closed {
        candle.end_time()
    } else {
        candle.timestamp
    }
}

/// Coarser bars to refresh after one boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryJob {
    pub timeframe: Timeframe,
    pub boundary: TimestampMs,
    pub symbols: Vec<String>,
}

impl BoundaryJob {
    /// Fetch range covering the bar that ended at the boundary
    pub fn range(&self) -> (TimestampMs, TimestampMs) {
        (self.boundary - self.timeframe.duration_ms(), self.boundary)
    }
}

/// Decides which boundaries need fetching. Each (timeframe, boundary) pair
/// yields at most one job no matter how many symbols close on it.
pub struct BoundaryTracker {
    exchange: ExchangeId,
    config: BoundaryConfig,
    symbols: BTreeSet<String>,
    processed: HashSet<(Timeframe, TimestampMs)>,
}

impl BoundaryTracker {
    pub fn new(
        exchange: ExchangeId,
        config: BoundaryConfig,
        symbols: impl IntoIterator<Item = String>,
    ) -> Self {
        BoundaryTracker {
            exchange,
            config,
            symbols: symbols.into_iter().collect(),
            processed: HashSet::new(),
        }
    }

    pub fn track(&mut self, symbol: impl Into<String>) {
        self.symbols.insert(symbol.into());
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.iter().cloned().collect()
    }

    pub fn observe(&mut self, candle: &UnifiedCandle) -> Vec<BoundaryJob> {
        if candle.exchange != self.exchange || candle.timeframe != self.config.trigger {
            return Vec::new();
        }
        self.track(candle.symbol.clone());

        let instant = close_instant(candle);
        self.prune(instant);

        let trigger = self.config.trigger;
        let aligned: Vec<TimeframeBoundary> = self
            .config
            .timeframes
            .iter()
            .filter(|tf| tf.coarser_than(trigger))
            .map(|tf| TimeframeBoundary::check(*tf, instant))
            .filter(|b| b.aligned)
            .collect();

        let mut jobs = Vec::new();
        for boundary in aligned {
            if self.processed.insert((boundary.timeframe, instant)) {
                debug!(exchange = %self.exchange, timeframe = %boundary.timeframe, instant, "boundary reached");
                jobs.push(BoundaryJob {
                    timeframe: boundary.timeframe,
                    boundary: instant,
                    symbols: self.symbols(),
                });
            }
        }
        jobs
    }

    fn prune(&mut self, now: TimestampMs) {
        let retention = self.config.retention.as_millis() as TimestampMs;
        self.processed.retain(|(_, ts)| now - *ts <= retention);
    }
}

/// Outcome of one boundary job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryReport {
    pub requested: usize,
    pub written: usize,
    pub failed: Vec<String>,
}

/// Fetches coarser bars in batches
pub struct BoundaryFetcher {
    fetcher: Arc<dyn CandleFetcher>,
    cache: Arc<dyn CandleCache>,
    clock: Arc<dyn Clock>,
    config: BoundaryConfig,
}

impl BoundaryFetcher {
    pub fn new(
        fetcher: Arc<dyn CandleFetcher>,
        cache: Arc<dyn CandleCache>,
        clock: Arc<dyn Clock>,
        config: BoundaryConfig,
    ) -> Self {
        BoundaryFetcher {
            fetcher,
            cache,
            clock,
            config,
        }
    }

    pub async fn run(&self, job: BoundaryJob) -> BoundaryReport {
        let mut report = BoundaryReport::default();
        let (from, to) = job.range();
        let batch_size = self.config.batch_size.max(1);

        for (i, batch) in job.symbols.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            let results = join_all(
                batch
                    .iter()
                    .map(|symbol| self.fetch_one(symbol, job.timeframe, from, to)),
            )
            .await;

            for (symbol, result) in batch.iter().zip(results) {
                report.requested += 1;
                match result {
                    Ok(written) => report.written += written,
                    Err(e) => {
                        warn!("{}", e);
                        report.failed.push(symbol.clone());
                    }
                }
            }
        }

        info!(
            exchange = %self.fetcher.exchange(),
            timeframe = %job.timeframe,
            boundary = job.boundary,
            requested = report.requested,
            written = report.written,
            failed = report.failed.len(),
            "boundary fetch complete"
        );
        report
    }

    async fn fetch_one(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: TimestampMs,
        to: TimestampMs,
    ) -> ReconcileResult<usize> {
        let candles = self
            .fetcher
            .get_candles(symbol, timeframe, from, to)
            .await
            .map_err(|source| ReconcileError::Fetch {
                symbol: symbol.to_string(),
                timeframe,
                source,
            })?;
        let written = write_history(self.cache.as_ref(), candles, self.clock.now_ms()).await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candela_core::MINUTE_MS;
    use rust_decimal_macros::dec;

    const DAY: TimestampMs = 1_699_920_000_000; // 2023-11-14T00:00:00Z

    fn close_at(symbol: &str, start: TimestampMs) -> UnifiedCandle {
        UnifiedCandle::from_price(
            ExchangeId::binance(),
            symbol,
            Timeframe::M1,
            start,
            dec!(1),
            dec!(1),
        )
        .closed()
    }

    fn tracker() -> BoundaryTracker {
        BoundaryTracker::new(
            ExchangeId::binance(),
            BoundaryConfig::default(),
            vec!["BTCUSDT".to_string()],
        )
    }

    fn timeframes(jobs: &[BoundaryJob]) -> Vec<Timeframe> {
        jobs.iter().map(|j| j.timeframe).collect()
    }

    #[test]
    fn test_close_instant() {
        let finalized = close_at("BTCUSDT", DAY);
        assert_eq!(close_instant(&finalized), DAY + MINUTE_MS);

        let mut opening = finalized.clone();
        opening.is_closed = false;
        assert_eq!(close_instant(&opening), DAY);
    }

    #[test]
    fn test_boundary_check() {
        assert!(TimeframeBoundary::check(Timeframe::H4, DAY + 8 * 60 * MINUTE_MS).aligned);
        assert!(!TimeframeBoundary::check(Timeframe::H4, DAY + 9 * 60 * MINUTE_MS).aligned);
    }

    #[test]
    fn test_aligned_timeframes_at_midnight() {
        let mut t = tracker();
        // Bar 23:59 closes at midnight
        let jobs = t.observe(&close_at("BTCUSDT", DAY - MINUTE_MS));
        assert_eq!(
            timeframes(&jobs),
            vec![Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1]
        );
        assert_eq!(jobs[3].range(), (DAY - 24 * 60 * MINUTE_MS, DAY));
    }

    #[test]
    fn test_quarter_hour_only() {
        let mut t = tracker();
        let jobs = t.observe(&close_at("BTCUSDT", DAY + 14 * MINUTE_MS));
        assert_eq!(timeframes(&jobs), vec![Timeframe::M15]);
        assert!(t.observe(&close_at("BTCUSDT", DAY + 15 * MINUTE_MS)).is_empty());
    }

    #[test]
    fn test_boundary_processed_once_across_symbols() {
        let mut t = tracker();
        let first = t.observe(&close_at("ETHUSDT", DAY + 59 * MINUTE_MS));
        assert_eq!(timeframes(&first), vec![Timeframe::M15, Timeframe::H1]);
        assert_eq!(first[0].symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);

        assert!(t.observe(&close_at("BTCUSDT", DAY + 59 * MINUTE_MS)).is_empty());
    }

    #[test]
    fn test_other_timeframes_and_exchanges_ignored() {
        let mut t = tracker();
        let mut five = close_at("BTCUSDT", DAY - 5 * MINUTE_MS);
        five.timeframe = Timeframe::M5;
        assert!(t.observe(&five).is_empty());

        let mut foreign = close_at("BTC-USD", DAY - MINUTE_MS);
        foreign.exchange = ExchangeId::coinbase();
        assert!(t.observe(&foreign).is_empty());
        assert_eq!(t.symbols(), vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn test_processed_boundaries_pruned() {
        let mut t = tracker();
        assert!(!t.observe(&close_at("BTCUSDT", DAY - MINUTE_MS)).is_empty());
        // Two days later the old entry is gone
        t.observe(&close_at("BTCUSDT", DAY + 2 * 24 * 60 * MINUTE_MS + 14 * MINUTE_MS));
        assert_eq!(t.processed.len(), 1);
    }
}
