//! In-process socket connector shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use candela_gateway::{AdapterEvent, Frame, Outbound, SocketConnector, SocketSession, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};

/// Server side of one accepted connection
pub struct Peer {
    pub endpoint: String,
    pub to_client: mpsc::Sender<Frame>,
    pub from_client: mpsc::Receiver<Outbound>,
}

impl Peer {
    pub async fn send_text(&self, text: impl Into<String>) {
        self.to_client
            .send(Frame::Text(text.into()))
            .await
            .expect("client gone");
    }

    /// Next text frame sent by the client, skipping pings
    pub async fn next_text(&mut self) -> String {
        loop {
            match self.from_client.recv().await.expect("client closed") {
                Outbound::Text(text) => return text,
                Outbound::Ping => continue,
                Outbound::Close => panic!("client closed the socket"),
            }
        }
    }
}

pub struct MockConnector {
    refuse: AtomicBool,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<Peer>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = MockConnector {
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            peers: tx,
        };
        (Arc::new(connector), rx)
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketConnector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<SocketSession, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("connection refused".to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let _ = self.peers.send(Peer {
            endpoint: endpoint.to_string(),
            to_client: inbound_tx,
            from_client: outbound_rx,
        });
        Ok(SocketSession {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Everything currently buffered on an event receiver
pub fn drain_events(rx: &mut broadcast::Receiver<AdapterEvent>) -> Vec<AdapterEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn reconnect_attempts(events: &[AdapterEvent]) -> Vec<(u32, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::Reconnecting { attempt, delay } => Some((*attempt, delay.as_millis() as u64)),
            _ => None,
        })
        .collect()
}
