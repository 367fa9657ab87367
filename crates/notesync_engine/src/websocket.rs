//! WebSocket binding of the duplex channel.

use crate::channel::{Channel, Connector, Inbound, Outbound};
use crate::error::{EngineResult, SyncError};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Opens channels over WebSocket text frames.
///
/// The auth token, if any, is passed as a `token` query parameter. Protocol
/// level pings are answered by tungstenite itself; application heartbeats
/// travel as text frames like every other message.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

fn with_token(address: &str, auth_token: Option<&str>) -> String {
    match auth_token {
        Some(token) => {
            let separator = if address.contains('?') { '&' } else { '?' };
            format!("{address}{separator}token={}", urlencoding::encode(token))
        }
        None => address.to_string(),
    }
}

impl Connector for WebSocketConnector {
    async fn open(&self, address: &str, auth_token: Option<&str>) -> EngineResult<Channel> {
        let url = with_token(address, auth_token);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SyncError::transport_retryable(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();
        let (channel, peer) = Channel::pair();
        let to_manager = peer.outgoing;
        let mut from_manager = peer.incoming;

        tokio::spawn(async move {
            while let Some(frame) = from_manager.recv().await {
                let message = match frame {
                    Outbound::Text(text) => Message::Text(text.into()),
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if to_manager.send(Inbound::Text(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.as_str().to_owned());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            };
            let _ = to_manager.send(Inbound::Closed { reason });
        });

        Ok(channel)
    }
}
