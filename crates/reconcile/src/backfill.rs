//! Post-reconnect backfill
//!
//! After an outage every subscribed series whose latest cached bar is stale
//! is re-fetched over REST, one request at a time with a fixed pause in
//! between. Everything goes through the versioned write, so overlapping
//! with live data is harmless.

use candela_core::{ExchangeId, Timeframe, TimestampMs};
use candela_gateway::Subscription;
use candela_ports::{CandleCache, CandleFetcher, Clock};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BackfillConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::gaps::{GapInfo, GapScanner};
use crate::history::write_history;

/// One planned REST request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub from: TimestampMs,
    pub to: TimestampMs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Series inspected
    pub checked: usize,
    /// Series that needed a fetch
    pub requested: usize,
    /// Writes that took effect
    pub written: usize,
    pub failed: Vec<String>,
    /// Gaps still present after the fetch
    pub remaining_gaps: Vec<GapInfo>,
}

pub struct Backfiller {
    exchange: ExchangeId,
    fetcher: Arc<dyn CandleFetcher>,
    cache: Arc<dyn CandleCache>,
    clock: Arc<dyn Clock>,
    scanner: GapScanner,
    config: BackfillConfig,
    /// Serializes runs triggered by back-to-back reconnects
    running: Mutex<()>,
}

impl Backfiller {
    pub fn new(
        fetcher: Arc<dyn CandleFetcher>,
        cache: Arc<dyn CandleCache>,
        clock: Arc<dyn Clock>,
        config: BackfillConfig,
    ) -> Self {
        Backfiller {
            exchange: fetcher.exchange(),
            scanner: GapScanner::new(Arc::clone(&cache)),
            fetcher,
            cache,
            clock,
            config,
            running: Mutex::new(()),
        }
    }

    /// Requests needed for `subscriptions` at the current time
    pub async fn plan(&self, subscriptions: &[Subscription]) -> Vec<BackfillRequest> {
        let now = self.clock.now_ms();
        let threshold = self.config.threshold.as_millis() as TimestampMs;
        let mut requests = Vec::new();

        for sub in subscriptions {
            let latest = match self
                .cache
                .get_latest_candle(&self.exchange, &sub.symbol, sub.timeframe)
                .await
            {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(exchange = %self.exchange, symbol = %sub.symbol, "latest candle lookup failed: {}", e);
                    continue;
                }
            };

            let from = match latest {
                Some(candle) if now - candle.timestamp > threshold => candle.timestamp,
                Some(_) => continue,
                None => {
                    let lookback = sub.timeframe.duration_ms() * self.config.lookback_bars as TimestampMs;
                    sub.timeframe.floor(now) - lookback
                }
            };
            requests.push(BackfillRequest {
                symbol: sub.symbol.clone(),
                timeframe: sub.timeframe,
                from,
                to: now,
            });
        }
        requests
    }

    /// Plan and execute a backfill. Failures are logged and skipped.
    pub async fn run(&self, subscriptions: &[Subscription]) -> BackfillReport {
        let _running = self.running.lock().await;
        let requests = self.plan(subscriptions).await;
        let mut report = BackfillReport {
            checked: subscriptions.len(),
            requested: requests.len(),
            ..BackfillReport::default()
        };
        if requests.is_empty() {
            debug!(exchange = %self.exchange, "backfill not needed");
            return report;
        }
        info!(exchange = %self.exchange, symbols = requests.len(), "starting backfill");

        for (i, request) in requests.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.request_delay).await;
            }
            match self.execute(request).await {
                Ok((written, gaps)) => {
                    report.written += written;
                    if !gaps.is_empty() {
                        let missing: u64 = gaps.iter().map(|g| g.count).sum();
                        warn!(
                            exchange = %self.exchange,
                            symbol = %request.symbol,
                            timeframe = %request.timeframe,
                            gaps = gaps.len(),
                            missing,
                            "gaps remain after backfill"
                        );
                    }
                    report.remaining_gaps.extend(gaps);
                }
                Err(e) => {
                    warn!(exchange = %self.exchange, "backfill skipped: {}", e);
                    report.failed.push(request.symbol.clone());
                }
            }
        }

        info!(
            exchange = %self.exchange,
            requested = report.requested,
            written = report.written,
            failed = report.failed.len(),
            "backfill complete"
        );
        report
    }

    async fn execute(&self, request: &BackfillRequest) -> ReconcileResult<(usize, Vec<GapInfo>)> {
        let candles = self
            .fetcher
            .get_candles(&request.symbol, request.timeframe, request.from, request.to)
            .await
            .map_err(|source| ReconcileError::Fetch {
                symbol: request.symbol.clone(),
                timeframe: request.timeframe,
                source,
            })?;
        let now = self.clock.now_ms();
        let written = write_history(self.cache.as_ref(), candles, now).await?;

        // Only completed periods can be expected in the cache
        let last_complete = request.timeframe.floor(now) - request.timeframe.duration_ms();
        let gaps = self
            .scanner
            .scan(&self.exchange, &request.symbol, request.timeframe, request.from, last_complete)
            .await?;
        Ok((written, gaps))
    }
}
