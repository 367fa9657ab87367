//! Duplex channel abstraction used by the connection manager.
//!
//! A channel is a pair of unbounded tokio queues. Transport bindings pump
//! frames between a real connection and these queues, which keeps the
//! connection manager independent of any particular transport.

use crate::error::EngineResult;
use std::future::Future;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A frame travelling from the manager to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// Close the connection.
    Close,
}

/// A frame travelling from the transport to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame.
    Text(String),
    /// The connection closed.
    Closed {
        /// Close reason, if the transport reported one.
        reason: Option<String>,
    },
}

/// The manager's end of an open channel.
#[derive(Debug)]
pub struct Channel {
    /// Frames to send.
    pub outgoing: UnboundedSender<Outbound>,
    /// Frames received.
    pub incoming: UnboundedReceiver<Inbound>,
}

/// The transport's end of an open channel.
#[derive(Debug)]
pub struct ChannelPeer {
    /// Frames delivered to the manager.
    pub outgoing: UnboundedSender<Inbound>,
    /// Frames the manager sent.
    pub incoming: UnboundedReceiver<Outbound>,
}

impl Channel {
    /// Creates a connected channel and its peer end.
    pub fn pair() -> (Channel, ChannelPeer) {
        let (to_peer, from_manager) = mpsc::unbounded_channel();
        let (to_manager, from_peer) = mpsc::unbounded_channel();
        (
            Channel {
                outgoing: to_peer,
                incoming: from_peer,
            },
            ChannelPeer {
                outgoing: to_manager,
                incoming: from_manager,
            },
        )
    }
}

impl ChannelPeer {
    /// Delivers a text frame to the manager. Returns false if it is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(Inbound::Text(text.into())).is_ok()
    }

    /// Signals that the connection closed.
    pub fn close(&self, reason: Option<String>) -> bool {
        self.outgoing.send(Inbound::Closed { reason }).is_ok()
    }

    /// Waits for the next frame from the manager.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.incoming.recv().await
    }
}

/// Opens duplex channels to an address.
pub trait Connector: Send + Sync + 'static {
    /// Opens a channel to `address`, presenting `auth_token` if given.
    fn open(
        &self,
        address: &str,
        auth_token: Option<&str>,
    ) -> impl Future<Output = EngineResult<Channel>> + Send;
}
