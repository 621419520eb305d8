//! Reconciliation Service
//!
//! Listens to one adapter's event stream and turns reconnects into backfill
//! runs and boundary closes into coarser-timeframe fetches. Fetch work runs
//! in child tasks so the event loop never waits on REST.

use candela_core::ExchangeId;
use candela_gateway::AdapterEvent;
use candela_ports::{CandleCache, CandleFetcher, Clock};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::backfill::Backfiller;
use crate::boundary::{BoundaryFetcher, BoundaryTracker};
use crate::config::ReconcileConfig;

pub struct ReconciliationService {
    exchange: ExchangeId,
    backfiller: Arc<Backfiller>,
    boundary: Arc<BoundaryFetcher>,
    tracker: BoundaryTracker,
}

impl ReconciliationService {
    pub fn new(
        fetcher: Arc<dyn CandleFetcher>,
        cache: Arc<dyn CandleCache>,
        clock: Arc<dyn Clock>,
        config: ReconcileConfig,
        symbols: Vec<String>,
    ) -> Self {
        let exchange = fetcher.exchange();
        let tracker = BoundaryTracker::new(exchange.clone(), config.boundary.clone(), symbols);
        let backfiller = Backfiller::new(
            Arc::clone(&fetcher),
            Arc::clone(&cache),
            Arc::clone(&clock),
            config.backfill,
        );
        let boundary = BoundaryFetcher::new(fetcher, cache, clock, config.boundary);

        ReconciliationService {
            exchange,
            backfiller: Arc::new(backfiller),
            boundary: Arc::new(boundary),
            tracker,
        }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    /// Run on a new task. Aborting the handle cancels outstanding fetches.
    pub fn spawn(self, events: broadcast::Receiver<AdapterEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(mut self, mut events: broadcast::Receiver<AdapterEvent>) {
        let mut tasks = JoinSet::new();
        info!(exchange = %self.exchange, "reconciliation started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event, &mut tasks),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(exchange = %self.exchange, skipped, "reconciliation lagged behind adapter events");
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        warn!(exchange = %self.exchange, "reconciliation task failed: {}", e);
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        debug!(exchange = %self.exchange, "reconciliation stopped");
    }

    fn handle_event(&mut self, event: AdapterEvent, tasks: &mut JoinSet<()>) {
        match event {
            AdapterEvent::Connected(info) => {
                for sub in &info.subscriptions {
                    self.tracker.track(sub.symbol.clone());
                }
                if info.needs_backfill() {
                    info!(
                        exchange = %self.exchange,
                        reconnected = info.reconnected,
                        gap_detected = info.gap_detected,
                        "scheduling backfill"
                    );
                    let backfiller = Arc::clone(&self.backfiller);
                    tasks.spawn(async move {
                        backfiller.run(&info.subscriptions).await;
                    });
                }
            }
            AdapterEvent::CandleClose(candle) => {
                for job in self.tracker.observe(&candle) {
                    let boundary = Arc::clone(&self.boundary);
                    tasks.spawn(async move {
                        boundary.run(job).await;
                    });
                }
            }
            AdapterEvent::Disconnected { .. }
            | AdapterEvent::Error { .. }
            | AdapterEvent::Reconnecting { .. } => {}
        }
    }
}
