use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::domain::{Frame, Outbound, SocketConnector, SocketSession};
use crate::error::TransportError;

/// WebSocket client for streaming market data
/// Infrastructure component - handles WebSocket communication
pub struct WsClient {
    inbound_capacity: usize,
}

impl WsClient {
    pub fn new() -> Self {
        WsClient {
            inbound_capacity: 1024,
        }
    }

    pub fn with_capacity(inbound_capacity: usize) -> Self {
        WsClient {
            inbound_capacity: inbound_capacity.max(1),
        }
    }
}

impl Default for WsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocketConnector for WsClient {
    /// Connect and return channels for sending frames and receiving events
    async fn connect(&self, endpoint: &str) -> Result<SocketSession, TransportError> {
        url::Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let (ws_stream, _) = connect_async(endpoint).await?;
        let (mut write, mut read) = ws_stream.split();

        // Channel for frames going to the WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(64);

        // Channel for frames coming from the WebSocket
        let (in_tx, in_rx) = mpsc::channel::<Frame>(self.inbound_capacity);

        // Spawn task to handle outgoing messages
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let (message, closing) = match frame {
                    Outbound::Text(text) => (Message::Text(text.into()), false),
                    Outbound::Ping => (Message::Ping(Vec::new().into()), false),
                    Outbound::Close => (Message::Close(None), true),
                };
                if let Err(e) = write.send(message).await {
                    tracing::debug!("WebSocket write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Spawn task to handle incoming messages
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    msg = read.next() => msg,
                    // Session dropped the socket
                    _ = in_tx.closed() => break,
                };
                let Some(msg) = msg else {
                    break;
                };

                let frame = match msg {
                    Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => Frame::Text(text),
                        Err(_) => continue,
                    },
                    Ok(Message::Ping(_)) => {
                        tracing::trace!("Received ping");
                        Frame::Ping
                    }
                    Ok(Message::Pong(_)) => Frame::Pong,
                    Ok(Message::Close(close)) => {
                        let reason = close.map(|c| format!("{} {}", u16::from(c.code), c.reason.as_str()));
                        let _ = in_tx.send(Frame::Close(reason)).await;
                        break;
                    }
                    Ok(Message::Frame(_)) => continue,
                    Err(e) => {
                        let _ = in_tx.send(Frame::Error(e.to_string())).await;
                        break;
                    }
                };

                if in_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(SocketSession {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
