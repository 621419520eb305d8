//! Bootstrap - wiring and lifecycle of the running feed
//!
//! Builds the in-memory store, the persistence queue with its workers and
//! one adapter per enabled exchange. Each adapter gets a REST client and a
//! reconciliation service listening on its event stream.

use candela_clock::SystemClock;
use candela_gateway::adapters::{binance, coinbase};
use candela_gateway::{
    BinanceAdapter, BinanceConfig, BinanceRestClient, CandlePublisher, CoinbaseAdapter,
    CoinbaseConfig, CoinbaseRestClient, ExchangeAdapter, GatewayError, HmacTokenProvider,
    PersistQueue, SocketConnector, StaticTokenProvider, WsClient,
};
use candela_ports::{CandleFetcher, Clock, TokenProvider};
use candela_reconcile::ReconciliationService;
use candela_store::{BroadcastBus, InMemoryCandleCache};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigError, ExchangeConfig, ExchangeKind, FeedConfigFile};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{exchange}: {source}")]
    Gateway {
        exchange: String,
        #[source]
        source: GatewayError,
    },
}

/// External collaborators the feed is built on
#[derive(Clone)]
pub struct FeedDeps {
    pub connector: Arc<dyn SocketConnector>,
    pub clock: Arc<dyn Clock>,
}

impl FeedDeps {
    /// Real sockets and wall-clock time
    pub fn live() -> Self {
        FeedDeps {
            connector: Arc::new(WsClient::new()),
            clock: Arc::new(SystemClock::new()),
        }
    }
}

/// One running exchange
pub struct ExchangeHandle {
    pub config: ExchangeConfig,
    pub adapter: Arc<dyn ExchangeAdapter>,
    reconciliation: Option<JoinHandle<()>>,
}

/// The running feed
pub struct Feed {
    exchanges: Vec<ExchangeHandle>,
    queue: PersistQueue,
    workers: Vec<JoinHandle<()>>,
    cache: Arc<InMemoryCandleCache>,
    bus: Arc<BroadcastBus>,
    drain_timeout: Duration,
}

impl Feed {
    /// Validate `config`, then connect and subscribe every enabled exchange.
    /// Anything already started is shut down again when a later step fails.
    pub async fn start(config: &FeedConfigFile, deps: FeedDeps) -> Result<Self, BootstrapError> {
        config.validate()?;

        let persist = config.persistence.to_persist_config();
        let cache = Arc::new(InMemoryCandleCache::new());
        let bus = Arc::new(BroadcastBus::default());
        let queue = PersistQueue::new(persist.queue_capacity);
        let publisher = Arc::new(
            CandlePublisher::new(
                cache.clone(),
                bus.clone(),
                persist.channels.clone(),
                persist.ticker_ttl,
            )
            .with_ticker_channels(persist.ticker_channels.clone()),
        );
        let workers = queue.spawn_workers(persist.workers, publisher);

        let mut feed = Feed {
            exchanges: Vec::new(),
            queue,
            workers,
            cache,
            bus,
            drain_timeout: config.persistence.drain_timeout(),
        };

        for exchange in config.enabled_exchanges() {
            if let Err(e) = feed.start_exchange(config, exchange, &deps).await {
                warn!(exchange = %exchange.id, "startup failed: {}", e);
                feed.shutdown().await;
                return Err(e);
            }
        }

        info!(
            exchanges = feed.exchanges.len(),
            workers = persist.workers,
            channels = ?persist.channels,
            "feed started"
        );
        Ok(feed)
    }

    async fn start_exchange(
        &mut self,
        config: &FeedConfigFile,
        exchange: &ExchangeConfig,
        deps: &FeedDeps,
    ) -> Result<(), BootstrapError> {
        let kind = exchange.kind()?;
        let (adapter, fetcher) = build_adapter(kind, config, exchange, deps, self.queue.clone());

        // Subscribe to events before connecting so the first Connected is seen
        let reconciliation = config.reconciliation.enabled.then(|| {
            let service = ReconciliationService::new(
                fetcher,
                self.cache.clone(),
                deps.clock.clone(),
                config.reconciliation.to_reconcile_config(exchange.timeframe),
                exchange.symbols.clone(),
            );
            service.spawn(adapter.events())
        });
        self.exchanges.push(ExchangeHandle {
            config: exchange.clone(),
            adapter: adapter.clone(),
            reconciliation,
        });

        let gateway_error = |source| BootstrapError::Gateway {
            exchange: exchange.id.clone(),
            source,
        };
        adapter.connect().await.map_err(gateway_error)?;
        adapter
            .subscribe(&exchange.symbols, exchange.timeframe)
            .await
            .map_err(gateway_error)?;

        info!(
            exchange = %exchange.id,
            symbols = exchange.symbols.len(),
            timeframe = %exchange.timeframe,
            "exchange streaming"
        );
        Ok(())
    }

    pub fn exchanges(&self) -> &[ExchangeHandle] {
        &self.exchanges
    }

    pub fn adapter(&self, id: &str) -> Option<&Arc<dyn ExchangeAdapter>> {
        self.exchanges
            .iter()
            .find(|e| e.config.id == id)
            .map(|e| &e.adapter)
    }

    pub fn cache(&self) -> &Arc<InMemoryCandleCache> {
        &self.cache
    }

    pub fn bus(&self) -> &Arc<BroadcastBus> {
        &self.bus
    }

    pub fn queue(&self) -> &PersistQueue {
        &self.queue
    }

    /// Disconnect every adapter, stop reconciliation and drain queued writes
    pub async fn shutdown(&mut self) {
        info!("shutting down feed");
        for exchange in &self.exchanges {
            exchange.adapter.disconnect().await;
            if let Some(task) = &exchange.reconciliation {
                task.abort();
            }
        }

        self.queue.close();
        if !self.queue.drain(self.drain_timeout).await {
            warn!(
                pending = self.queue.len(),
                timeout_ms = self.drain_timeout.as_millis() as u64,
                "persistence queue not drained before timeout"
            );
            for worker in &self.workers {
                worker.abort();
            }
        }
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }

        let dropped = self.queue.dropped_count();
        if dropped > 0 {
            warn!(dropped, "persistence jobs dropped during run");
        }
        info!("feed stopped");
    }
}

fn build_adapter(
    kind: ExchangeKind,
    config: &FeedConfigFile,
    exchange: &ExchangeConfig,
    deps: &FeedDeps,
    queue: PersistQueue,
) -> (Arc<dyn ExchangeAdapter>, Arc<dyn CandleFetcher>) {
    let connection = config.connection.to_connection_config();
    match kind {
        ExchangeKind::Binance => {
            let adapter_config = BinanceConfig {
                ws_url: exchange
                    .ws_url
                    .clone()
                    .unwrap_or_else(|| binance::DEFAULT_WS_URL.to_string()),
                freshness_window: config.connection.freshness_window(),
                include_ticker: exchange.options.include_ticker,
            };
            let rest_url = exchange.rest_url.as_deref().unwrap_or(binance::DEFAULT_REST_URL);
            let adapter = BinanceAdapter::new(adapter_config, deps.connector.clone(), connection, queue);
            (Arc::new(adapter), Arc::new(BinanceRestClient::new(rest_url)))
        }
        ExchangeKind::Coinbase => {
            let adapter_config = CoinbaseConfig {
                ws_url: exchange
                    .ws_url
                    .clone()
                    .unwrap_or_else(|| coinbase::DEFAULT_WS_URL.to_string()),
                close_payload: exchange.options.close_payload,
                include_ticker: exchange.options.include_ticker,
            };
            let rest_url = exchange.rest_url.as_deref().unwrap_or(coinbase::DEFAULT_REST_URL);
            let tokens = token_provider(exchange, deps.clock.clone());
            let adapter = CoinbaseAdapter::new(
                adapter_config,
                tokens,
                deps.connector.clone(),
                connection,
                queue,
            );
            (Arc::new(adapter), Arc::new(CoinbaseRestClient::new(rest_url)))
        }
    }
}

fn token_provider(exchange: &ExchangeConfig, clock: Arc<dyn Clock>) -> Arc<dyn TokenProvider> {
    let credentials = exchange.credentials.clone().unwrap_or_default();
    match credentials.token {
        Some(token) if !token.is_empty() => Arc::new(StaticTokenProvider::new(token)),
        _ => Arc::new(HmacTokenProvider::new(credentials.key_name, credentials.secret, clock)),
    }
}

