//! Connection Lifecycle Core
//!
//! Every adapter delegates its socket lifecycle to a [`ConnectionCore`]. The
//! core is a handle onto one session task that owns the protocol handler,
//! the live socket and every timer. Public methods send a command and wait
//! for the reply, so reconnection and frame processing never interleave.
//!
//! ```text
//!   connect()/subscribe()/...          frames        watchdog / backoff / ping
//!            │                            │                     │
//!            ▼                            ▼                     ▼
//!   ┌──────────────────────────────── Session task ─────────────────────────┐
//!   │ ProtocolHandler ──► MarketUpdate ──► PersistQueue (never waits)       │
//!   │                                  └─► AdapterEvent broadcast           │
//!   └───────────────────────────────────────────────────────────────────────┘
//! ```

use candela_core::{ExchangeId, Timeframe};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use super::config::ConnectionConfig;
use super::persist_queue::{PersistJob, PersistQueue};
use crate::domain::{
    AdapterEvent, ConnectedInfo, ConnectionState, Frame, MarketUpdate, Outbound, ProtocolHandler,
    SocketConnector, SocketSession, SubscribeMode, Subscription, SubscriptionSet,
};
use crate::error::{GatewayError, GatewayResult, TransportError};

enum Command {
    Connect {
        reply: oneshot::Sender<GatewayResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        symbols: Vec<String>,
        timeframe: Timeframe,
        reply: oneshot::Sender<GatewayResult<()>>,
    },
    Unsubscribe {
        symbols: Vec<String>,
        timeframe: Timeframe,
        reply: oneshot::Sender<GatewayResult<()>>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<Subscription>>,
    },
}

/// Handle onto one adapter's session task
///
/// Dropping the last handle stops the task and closes the socket.
pub struct ConnectionCore {
    exchange: ExchangeId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<AdapterEvent>,
    state: Arc<RwLock<ConnectionState>>,
    queue: PersistQueue,
}

impl ConnectionCore {
    /// Spawn the session task. Must be called inside a tokio runtime.
    pub fn spawn<P: ProtocolHandler>(
        handler: P,
        connector: Arc<dyn SocketConnector>,
        config: ConnectionConfig,
        queue: PersistQueue,
    ) -> Self {
        let exchange = handler.exchange();
        let (command_tx, command_rx) = mpsc::channel(32);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = Arc::new(RwLock::new(ConnectionState::Idle));

        let session = Session {
            exchange: exchange.clone(),
            handler,
            connector,
            config,
            commands: command_rx,
            events: events.clone(),
            state: Arc::clone(&state),
            queue: queue.clone(),
            subscriptions: SubscriptionSet::new(),
            socket: None,
            attempt: 0,
            intentional_close: false,
            watchdog: None,
            reconnect_at: None,
        };
        tokio::spawn(session.run());

        ConnectionCore {
            exchange,
            commands: command_tx,
            events,
            state,
            queue,
        }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    /// Open the socket. Resolves once the handshake completed or failed.
    pub async fn connect(&self) -> GatewayResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Connect { reply }).await?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    /// Close the socket and cancel every timer. Never triggers a reconnect.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.request(Command::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn subscribe(&self, symbols: &[String], timeframe: Timeframe) -> GatewayResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Subscribe {
            symbols: symbols.to_vec(),
            timeframe,
            reply,
        })
        .await?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    pub async fn unsubscribe(&self, symbols: &[String], timeframe: Timeframe) -> GatewayResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Unsubscribe {
            symbols: symbols.to_vec(),
            timeframe,
            reply,
        })
        .await?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    /// Snapshot of the current subscription set
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let (reply, rx) = oneshot::channel();
        if self.request(Command::Subscriptions { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Subscribe to adapter events. Events sent before this call are not replayed.
    pub fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    pub fn queue(&self) -> &PersistQueue {
        &self.queue
    }

    async fn request(&self, command: Command) -> GatewayResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GatewayError::Stopped)
    }
}

struct Session<P: ProtocolHandler> {
    exchange: ExchangeId,
    handler: P,
    connector: Arc<dyn SocketConnector>,
    config: ConnectionConfig,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<AdapterEvent>,
    state: Arc<RwLock<ConnectionState>>,
    queue: PersistQueue,
    subscriptions: SubscriptionSet,
    socket: Option<SocketSession>,
    /// Consecutive failed reconnects; zero while healthy
    attempt: u32,
    intentional_close: bool,
    watchdog: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl<P: ProtocolHandler> Session<P> {
    async fn run(mut self) {
        let mut ping = periodic(self.config.ping_interval);
        let mut freshness = periodic(self.config.freshness_check_interval);
        let mut gap_report = periodic(self.config.gap_report_interval);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                frame = next_frame(&mut self.socket) => self.handle_frame(frame),
                _ = sleep_until_opt(self.watchdog) => self.on_watchdog_expired(),
                _ = sleep_until_opt(self.reconnect_at) => self.attempt_reconnect().await,
                _ = ping.tick() => self.send_ping(),
                _ = freshness.tick() => self.check_freshness(),
                _ = gap_report.tick() => self.handler.report_gaps(),
            }
        }

        self.intentional_close = true;
        self.close_socket();
        debug!(exchange = %self.exchange, "session stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Subscribe {
                symbols,
                timeframe,
                reply,
            } => {
                let result = self.subscribe(symbols, timeframe).await;
                let _ = reply.send(result);
            }
            Command::Unsubscribe {
                symbols,
                timeframe,
                reply,
            } => {
                let result = self.unsubscribe(symbols, timeframe).await;
                let _ = reply.send(result);
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.subscriptions.snapshot());
            }
        }
    }

    async fn connect(&mut self) -> GatewayResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        self.intentional_close = false;
        // An explicit connect replaces a pending retry, but a failure resumes backoff
        let retrying = self.reconnect_at.take().is_some();

        let result = self.open().await;
        if let Err(e) = &result {
            warn!(exchange = %self.exchange, retrying, "connect failed: {}", e);
            if retrying {
                self.emit(AdapterEvent::Error {
                    message: e.to_string(),
                    fatal: false,
                });
                self.schedule_reconnect();
            } else {
                self.set_state(ConnectionState::Disconnected);
            }
        }
        result
    }

    fn disconnect(&mut self) {
        self.intentional_close = true;
        self.reconnect_at = None;
        let had_socket = self.close_socket();
        self.set_state(ConnectionState::Closed);
        if had_socket {
            info!(exchange = %self.exchange, "disconnected on request");
            self.emit(AdapterEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    async fn subscribe(&mut self, symbols: Vec<String>, timeframe: Timeframe) -> GatewayResult<()> {
        if self.socket.is_none() {
            return Err(GatewayError::NotConnected);
        }
        if !self.handler.supports(timeframe) {
            return Err(GatewayError::UnsupportedTimeframe(timeframe));
        }

        let symbols = self.normalize(&symbols);
        let added = self.subscriptions.add(&symbols, timeframe);
        if added.is_empty() {
            return Ok(());
        }
        info!(exchange = %self.exchange, %timeframe, symbols = ?added, "subscribing");

        match self.handler.subscribe_mode() {
            SubscribeMode::ControlFrame => {
                let frames = match self.handler.subscribe_frames(&added, timeframe) {
                    Ok(frames) => frames,
                    Err(e) => {
                        self.subscriptions.remove(&added, timeframe);
                        return Err(e);
                    }
                };
                self.send_frames(frames)
            }
            SubscribeMode::Reconnect => self.reestablish().await,
        }
    }

    async fn unsubscribe(&mut self, symbols: Vec<String>, timeframe: Timeframe) -> GatewayResult<()> {
        let symbols = self.normalize(&symbols);
        let removed = self.subscriptions.remove(&symbols, timeframe);
        if removed.is_empty() || self.socket.is_none() {
            return Ok(());
        }
        info!(exchange = %self.exchange, %timeframe, symbols = ?removed, "unsubscribing");

        match self.handler.subscribe_mode() {
            SubscribeMode::ControlFrame => {
                let frames = self.handler
                    .unsubscribe_frames(&removed, timeframe, &self.subscriptions)?;
                self.send_frames(frames)
            }
            SubscribeMode::Reconnect => self.reestablish().await,
        }
    }

    fn normalize(&self, symbols: &[String]) -> Vec<String> {
        symbols
            .iter()
            .map(|s| self.handler.normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Open a socket and run the on-connect sequence
    async fn open(&mut self) -> GatewayResult<()> {
        self.set_state(ConnectionState::Connecting);
        let endpoint = self.handler.endpoint(&self.subscriptions);
        debug!(exchange = %self.exchange, endpoint = %endpoint, "opening socket");

        let socket = match timeout(
            self.config.handshake_timeout,
            self.connector.connect(&endpoint),
        )
        .await
        {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(TransportError::Timeout.into()),
        };

        let reconnected = self.attempt > 0;
        let gap_detected = self.handler.take_gap_detected();
        self.attempt = 0;
        self.socket = Some(socket);

        let now = Instant::now();
        self.handler.on_connected(&self.subscriptions, now);
        self.touch(now);
        self.set_state(ConnectionState::Connected);

        if self.handler.subscribe_mode() == SubscribeMode::ControlFrame {
            self.replay_subscriptions();
        }

        info!(
            exchange = %self.exchange,
            reconnected,
            gap_detected,
            subscriptions = self.subscriptions.len(),
            "connected"
        );
        self.emit(AdapterEvent::Connected(ConnectedInfo {
            exchange: self.exchange.clone(),
            reconnected,
            gap_detected,
            subscriptions: self.subscriptions.snapshot(),
        }));
        Ok(())
    }

    /// Reopen with the current subscriptions baked into the endpoint
    async fn reestablish(&mut self) -> GatewayResult<()> {
        self.close_socket();
        match self.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.connection_lost("resubscribe failed", Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn replay_subscriptions(&mut self) {
        let groups: Vec<(Timeframe, Vec<String>)> = self.subscriptions.groups().collect();
        for (timeframe, symbols) in groups {
            match self.handler.subscribe_frames(&symbols, timeframe) {
                Ok(frames) => {
                    if let Err(e) = self.send_frames(frames) {
                        warn!(exchange = %self.exchange, "subscription replay failed: {}", e);
                        return;
                    }
                }
                Err(e) => {
                    warn!(exchange = %self.exchange, %timeframe, "subscription replay failed: {}", e);
                    self.emit(AdapterEvent::Error {
                        message: e.to_string(),
                        fatal: false,
                    });
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Frame>) {
        match frame {
            Some(Frame::Text(text)) => {
                let now = Instant::now();
                self.touch(now);
                let updates = self.handler.handle_text(&text, now);
                self.dispatch(updates);
            }
            Some(Frame::Ping) | Some(Frame::Pong) => self.touch(Instant::now()),
            Some(Frame::Close(reason)) => {
                let reason = reason.unwrap_or_else(|| "closed by peer".to_string());
                self.connection_lost(&reason, None);
            }
            Some(Frame::Error(e)) => self.connection_lost("transport error", Some(e)),
            None => self.connection_lost("stream ended", None),
        }
    }

    fn dispatch(&mut self, updates: Vec<MarketUpdate>) {
        for update in updates {
            match update {
                MarketUpdate::Candle(candle) => {
                    self.queue.push(PersistJob::Candle(candle));
                }
                MarketUpdate::CandleClosed(candle) => {
                    debug!(key = %candle.key(), "candle closed");
                    self.queue.push(PersistJob::CandleClosed(candle.clone()));
                    self.emit(AdapterEvent::CandleClose(candle));
                }
                MarketUpdate::Ticker(ticker) => {
                    self.queue.push(PersistJob::Ticker(ticker));
                }
            }
        }
    }

    fn on_watchdog_expired(&mut self) {
        self.watchdog = None;
        if self.intentional_close || self.socket.is_none() {
            return;
        }
        warn!(
            exchange = %self.exchange,
            timeout_ms = self.config.watchdog_timeout.as_millis() as u64,
            "no inbound frames, forcing reconnect"
        );
        self.connection_lost("watchdog timeout", None);
    }

    fn check_freshness(&mut self) {
        if self.intentional_close || self.socket.is_none() {
            return;
        }
        if self.handler.is_stale(Instant::now()) {
            warn!(exchange = %self.exchange, "stream stale, forcing reconnect");
            self.connection_lost("stale stream", None);
        }
    }

    /// Tear the socket down without a close handshake and start reconnecting
    fn connection_lost(&mut self, reason: &str, error: Option<String>) {
        self.socket = None;
        self.watchdog = None;

        if let Some(message) = error {
            warn!(exchange = %self.exchange, "transport error: {}", message);
            self.emit(AdapterEvent::Error {
                message,
                fatal: false,
            });
        }
        warn!(exchange = %self.exchange, reason, "connection lost");
        self.set_state(ConnectionState::Disconnected);
        self.emit(AdapterEvent::Disconnected {
            reason: reason.to_string(),
        });

        if !self.intentional_close {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
        let backoff = self.config.backoff;

        if backoff.exhausted(self.attempt) {
            let err = GatewayError::ReconnectExhausted(backoff.max_attempts);
            error!(exchange = %self.exchange, "{}", err);
            self.reconnect_at = None;
            self.set_state(ConnectionState::Failed);
            self.emit(AdapterEvent::Error {
                message: err.to_string(),
                fatal: true,
            });
            return;
        }

        let delay = backoff.delay(self.attempt);
        info!(
            exchange = %self.exchange,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        self.set_state(ConnectionState::Reconnecting);
        self.emit(AdapterEvent::Reconnecting {
            attempt: self.attempt,
            delay,
        });
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn attempt_reconnect(&mut self) {
        self.reconnect_at = None;
        if self.intentional_close || self.socket.is_some() {
            return;
        }
        if let Err(e) = self.open().await {
            warn!(exchange = %self.exchange, attempt = self.attempt, "reconnect failed: {}", e);
            self.set_state(ConnectionState::Disconnected);
            self.emit(AdapterEvent::Error {
                message: e.to_string(),
                fatal: false,
            });
            self.schedule_reconnect();
        }
    }

    fn send_ping(&mut self) {
        if let Some(socket) = &self.socket {
            let _ = socket.outbound.try_send(Outbound::Ping);
        }
    }

    fn send_frames(&mut self, frames: Vec<String>) -> GatewayResult<()> {
        let Some(socket) = &self.socket else {
            return Err(GatewayError::NotConnected);
        };
        for frame in frames {
            socket
                .outbound
                .try_send(Outbound::Text(frame))
                .map_err(|e| TransportError::Send(e.to_string()))?;
        }
        Ok(())
    }

    /// Returns whether a socket was open
    fn close_socket(&mut self) -> bool {
        self.watchdog = None;
        match self.socket.take() {
            Some(socket) => {
                let _ = socket.outbound.try_send(Outbound::Close);
                true
            }
            None => false,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.watchdog = Some(now + self.config.watchdog_timeout);
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn emit(&self, event: AdapterEvent) {
        // No receivers is not an error
        let _ = self.events.send(event);
    }
}

async fn next_frame(socket: &mut Option<SocketSession>) -> Option<Frame> {
    match socket {
        Some(socket) => socket.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn periodic(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
