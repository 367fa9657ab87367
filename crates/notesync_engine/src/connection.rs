//! Duplex connection lifecycle: connect, heartbeat, reconnect.
//!
//! The manager owns at most one live session task and at most one pending
//! reconnect task. Every scheduled task carries the generation it was
//! created under; `connect` and `disconnect` bump the generation so that
//! stale tasks notice they were superseded and exit without side effects.

use crate::bus::{NotificationBus, SyncEvent};
use crate::channel::{Channel, Connector, Inbound, Outbound};
use crate::clock::Clock;
use crate::config::ConnectionConfig;
use crate::error::{EngineResult, SyncError};
use notesync_protocol::{Envelope, InboundMessage};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and none wanted.
    #[default]
    Disconnected,
    /// A connect call is opening the channel.
    Connecting,
    /// The channel is open.
    Connected,
    /// Waiting to retry after an unexpected close.
    Reconnecting,
    /// Connecting failed or the reconnect budget is spent.
    Error,
}

impl ConnectionState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    address: String,
    auth_token: Option<String>,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    manual_disconnect: bool,
    attempts: u32,
    generation: u64,
    endpoint: Option<Endpoint>,
    outgoing: Option<UnboundedSender<Outbound>>,
    session: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Shared {
    fn stop_tasks(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort();
        }
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.abort();
        }
        if let Some(outgoing) = self.outgoing.take() {
            let _ = outgoing.send(Outbound::Close);
        }
    }
}

enum CloseReason {
    Remote(Option<String>),
    HeartbeatTimeout,
    SendFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Remote(Some(reason)) => write!(f, "closed by remote: {reason}"),
            CloseReason::Remote(None) => f.write_str("closed by remote"),
            CloseReason::HeartbeatTimeout => f.write_str("heartbeat timed out"),
            CloseReason::SendFailed => f.write_str("channel write failed"),
        }
    }
}

struct Inner<C> {
    connector: C,
    config: ConnectionConfig,
    bus: Arc<NotificationBus>,
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
}

/// Maintains a duplex channel to the remote.
///
/// Inbound `note_update`, `note_delete` and `sync_required` frames are
/// republished on the [`NotificationBus`]; state changes are published as
/// [`SyncEvent::ConnectionStateChanged`]. Handles are cheap to clone and
/// share the same connection.
pub struct ConnectionManager<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &shared.state)
            .field("reconnect_attempts", &shared.attempts)
            .finish()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a disconnected manager.
    pub fn new(
        connector: C,
        config: ConnectionConfig,
        bus: Arc<NotificationBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                bus,
                clock,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Returns the number of reconnect attempts since the last successful
    /// connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().attempts
    }

    /// Opens a channel to `address`.
    ///
    /// Any existing session or pending reconnect is torn down first. On
    /// failure the state becomes [`ConnectionState::Error`] and no automatic
    /// reconnect is scheduled; reconnection only follows the loss of an
    /// established channel.
    pub async fn connect(&self, address: &str, auth_token: Option<&str>) -> EngineResult<()> {
        let mut events = Vec::new();
        let generation = {
            let mut shared = self.inner.shared.lock();
            shared.stop_tasks();
            shared.generation += 1;
            shared.manual_disconnect = false;
            shared.attempts = 0;
            shared.endpoint = Some(Endpoint {
                address: address.to_string(),
                auth_token: auth_token.map(str::to_string),
            });
            events.extend(self.inner.transition(&mut shared, ConnectionState::Connecting));
            shared.generation
        };
        self.inner.publish(events);

        info!(address, "connecting");
        let opened = time::timeout(
            self.inner.config.connect_timeout,
            self.inner.connector.open(address, auth_token),
        )
        .await;

        match opened {
            Ok(Ok(channel)) => {
                if Inner::attach(&self.inner, channel, generation) {
                    Ok(())
                } else {
                    Err(SyncError::Cancelled)
                }
            }
            Ok(Err(e)) => {
                self.inner.connect_failed(generation, &e.to_string());
                Err(e)
            }
            Err(_) => {
                self.inner
                    .connect_failed(generation, "connection attempt timed out");
                Err(SyncError::ConnectionTimeout)
            }
        }
    }

    /// Closes the channel and cancels any pending reconnect.
    pub fn disconnect(&self) {
        let events = {
            let mut shared = self.inner.shared.lock();
            shared.manual_disconnect = true;
            shared.generation += 1;
            shared.attempts = 0;
            shared.stop_tasks();
            self.inner
                .transition(&mut shared, ConnectionState::Disconnected)
        };
        info!("disconnected");
        self.inner.publish(events);
    }

    /// Sends a typed message. Returns false unless connected.
    pub fn send(&self, kind: &str, payload: Value) -> bool {
        let shared = self.inner.shared.lock();
        if shared.state != ConnectionState::Connected {
            return false;
        }
        let Some(outgoing) = &shared.outgoing else {
            return false;
        };
        match Envelope::new(kind, payload, self.inner.clock.now()).encode() {
            Ok(frame) => outgoing.send(Outbound::Text(frame)).is_ok(),
            Err(e) => {
                warn!(kind, error = %e, "failed to encode outgoing message");
                false
            }
        }
    }
}

impl<C: Connector> Inner<C> {
    fn transition(&self, shared: &mut Shared, to: ConnectionState) -> Option<SyncEvent> {
        let from = shared.state;
        if from == to {
            return None;
        }
        shared.state = to;
        debug!(%from, %to, "connection state changed");
        Some(SyncEvent::ConnectionStateChanged { from, to })
    }

    // Events are published after the lock is released so handlers may call
    // back into the manager.
    fn publish(&self, events: impl IntoIterator<Item = SyncEvent>) {
        for event in events {
            self.bus.emit(&event);
        }
    }

    /// Installs an opened channel. Returns false if the attempt was
    /// superseded, in which case the channel is dropped.
    fn attach(this: &Arc<Self>, channel: Channel, generation: u64) -> bool {
        let events = {
            let mut shared = this.shared.lock();
            if shared.generation != generation || shared.manual_disconnect {
                debug!("discarding superseded channel");
                let _ = channel.outgoing.send(Outbound::Close);
                return false;
            }
            let Channel { outgoing, incoming } = channel;
            shared.outgoing = Some(outgoing.clone());
            shared.attempts = 0;
            shared.reconnect = None;
            let session = Arc::clone(this).run_session(outgoing, incoming, generation);
            shared.session = Some(tokio::spawn(session));
            this.transition(&mut shared, ConnectionState::Connected)
        };
        info!("connected");
        this.publish(events);
        true
    }

    fn connect_failed(&self, generation: u64, message: &str) {
        let mut events = Vec::new();
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            error!(error = message, "connection failed");
            events.extend(self.transition(&mut shared, ConnectionState::Error));
        }
        events.push(SyncEvent::Error {
            message: message.to_string(),
        });
        self.publish(events);
    }

    async fn run_session(
        self: Arc<Self>,
        outgoing: UnboundedSender<Outbound>,
        mut incoming: UnboundedReceiver<Inbound>,
        generation: u64,
    ) {
        let interval = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        let reason = loop {
            let deadline = pong_deadline;
            tokio::select! {
                frame = incoming.recv() => match frame {
                    Some(Inbound::Text(text)) => {
                        if self.handle_frame(&text, &outgoing) {
                            pong_deadline = None;
                        }
                    }
                    Some(Inbound::Closed { reason }) => break CloseReason::Remote(reason),
                    None => break CloseReason::Remote(None),
                },
                _ = heartbeat.tick() => {
                    if pong_deadline.is_some() {
                        continue;
                    }
                    if !self.send_envelope(&outgoing, Envelope::ping(self.clock.now())) {
                        break CloseReason::SendFailed;
                    }
                    pong_deadline = Some(Instant::now() + self.config.pong_timeout);
                }
                _ = wait_until(deadline) => {
                    let _ = outgoing.send(Outbound::Close);
                    break CloseReason::HeartbeatTimeout;
                }
            }
        };

        drop(incoming);
        Inner::session_ended(&self, generation, reason);
    }

    /// Handles one inbound frame. Returns true if it was a pong.
    fn handle_frame(&self, text: &str, outgoing: &UnboundedSender<Outbound>) -> bool {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return false;
            }
        };

        match message {
            InboundMessage::Ping => {
                self.send_envelope(outgoing, Envelope::pong(self.clock.now()));
            }
            InboundMessage::Pong => return true,
            InboundMessage::NoteUpdate(note) => {
                debug!(note_id = %note.id, "remote note update");
                self.bus.emit(&SyncEvent::NoteUpdated(note));
            }
            InboundMessage::NoteDelete { note_id } => {
                debug!(%note_id, "remote note delete");
                self.bus.emit(&SyncEvent::NoteDeleted { note_id });
            }
            InboundMessage::SyncRequired { reason } => {
                info!(%reason, "remote requested sync");
                self.bus.emit(&SyncEvent::SyncRequired { reason });
            }
            InboundMessage::Unknown(kind) => {
                warn!(%kind, "dropping message of unknown type");
            }
        }
        false
    }

    fn send_envelope(&self, outgoing: &UnboundedSender<Outbound>, envelope: Envelope) -> bool {
        match envelope.encode() {
            Ok(frame) => outgoing.send(Outbound::Text(frame)).is_ok(),
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                false
            }
        }
    }

    fn session_ended(this: &Arc<Self>, generation: u64, reason: CloseReason) {
        let mut events = Vec::new();
        {
            let mut shared = this.shared.lock();
            if shared.generation != generation || shared.manual_disconnect {
                return;
            }
            warn!(%reason, "connection lost");
            shared.outgoing = None;
            shared.session = None;
            Inner::schedule_reconnect(this, &mut shared, &mut events);
        }
        this.publish(events);
    }

    fn schedule_reconnect(this: &Arc<Self>, shared: &mut Shared, events: &mut Vec<SyncEvent>) {
        let max_attempts = this.config.reconnect.max_attempts;
        if shared.attempts >= max_attempts {
            error!(attempts = shared.attempts, "giving up on reconnecting");
            shared.reconnect = None;
            events.extend(this.transition(shared, ConnectionState::Error));
            events.push(SyncEvent::Error {
                message: format!("gave up after {} reconnect attempts", shared.attempts),
            });
            return;
        }

        shared.attempts += 1;
        let attempt = shared.attempts;
        let delay = this.config.reconnect.delay_for_attempt(attempt);
        info!(attempt, max_attempts, ?delay, "scheduling reconnect");
        events.extend(this.transition(shared, ConnectionState::Reconnecting));

        let inner = Arc::clone(this);
        let generation = shared.generation;
        shared.reconnect = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            inner.reconnect(generation).await;
        }));
    }

    async fn reconnect(self: Arc<Self>, generation: u64) {
        let endpoint = {
            let shared = self.shared.lock();
            if shared.generation != generation || shared.manual_disconnect {
                return;
            }
            shared.endpoint.clone()
        };
        let Some(endpoint) = endpoint else {
            return;
        };

        let opened = time::timeout(
            self.config.connect_timeout,
            self.connector
                .open(&endpoint.address, endpoint.auth_token.as_deref()),
        )
        .await;

        match opened {
            Ok(Ok(channel)) => {
                Inner::attach(&self, channel, generation);
            }
            Ok(Err(e)) => self.reconnect_failed(generation, &e.to_string()),
            Err(_) => self.reconnect_failed(generation, "connection attempt timed out"),
        }
    }

    fn reconnect_failed(self: &Arc<Self>, generation: u64, message: &str) {
        let mut events = Vec::new();
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.manual_disconnect {
                return;
            }
            warn!(attempt = shared.attempts, error = message, "reconnect failed");
            Inner::schedule_reconnect(self, &mut shared, &mut events);
        }
        self.publish(events);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use crate::channel::ChannelPeer;
    use crate::clock::SystemClock;
    use crate::config::RetryConfig;
    use chrono::Utc;
    use notesync_protocol::{Note, NOTE_UPDATE};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    enum Plan {
        Accept,
        Fail,
        Hang,
    }

    struct TestConnector {
        plans: Mutex<VecDeque<Plan>>,
        peers: mpsc::UnboundedSender<ChannelPeer>,
        opens: Arc<AtomicU32>,
    }

    impl Connector for TestConnector {
        async fn open(&self, _address: &str, _auth_token: Option<&str>) -> EngineResult<Channel> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let plan = self.plans.lock().pop_front().unwrap_or(Plan::Accept);
            match plan {
                Plan::Accept => {
                    let (channel, peer) = Channel::pair();
                    let _ = self.peers.send(peer);
                    Ok(channel)
                }
                Plan::Fail => Err(SyncError::transport_retryable("refused")),
                Plan::Hang => std::future::pending().await,
            }
        }
    }

    struct Harness {
        manager: ConnectionManager<TestConnector>,
        bus: Arc<NotificationBus>,
        peers: mpsc::UnboundedReceiver<ChannelPeer>,
        opens: Arc<AtomicU32>,
        transitions: Arc<Mutex<Vec<(ConnectionState, ConnectionState)>>>,
    }

    fn harness(plans: Vec<Plan>, max_attempts: u32) -> Harness {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let opens = Arc::new(AtomicU32::new(0));
        let connector = TestConnector {
            plans: Mutex::new(plans.into()),
            peers: peer_tx,
            opens: Arc::clone(&opens),
        };
        let config = ConnectionConfig::new().with_reconnect(
            RetryConfig::new(max_attempts)
                .with_initial_delay(Duration::from_millis(1000))
                .with_max_delay(Duration::from_secs(30))
                .with_jitter(false),
        );
        let bus = Arc::new(NotificationBus::new());
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&transitions);
        bus.on(EventKind::ConnectionStateChanged, move |event| {
            if let SyncEvent::ConnectionStateChanged { from, to } = event {
                recorded.lock().push((*from, *to));
            }
        });
        let manager =
            ConnectionManager::new(connector, config, Arc::clone(&bus), Arc::new(SystemClock));
        Harness {
            manager,
            bus,
            peers: peer_rx,
            opens,
            transitions,
        }
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    fn count(h: &Harness, from: ConnectionState, to: ConnectionState) -> usize {
        h.transitions
            .lock()
            .iter()
            .filter(|t| **t == (from, to))
            .count()
    }

    fn frame_type(frame: Option<Outbound>) -> String {
        match frame {
            Some(Outbound::Text(text)) => Envelope::decode(&text).unwrap().kind,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_and_send() {
        let mut h = harness(vec![], 10);
        assert!(!h.manager.send("note_ack", Value::Null));

        h.manager.connect("ws://notes", Some("token")).await.unwrap();
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(
            *h.transitions.lock(),
            vec![
                (ConnectionState::Disconnected, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Connected),
            ]
        );

        let mut peer = h.peers.recv().await.unwrap();
        assert!(h.manager.send("note_ack", serde_json::json!({ "noteId": "a" })));
        assert_eq!(frame_type(peer.recv().await), "note_ack");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_sets_error_without_reconnecting() {
        let h = harness(vec![Plan::Hang], 10);
        let errors = Arc::new(AtomicU32::new(0));
        let e = Arc::clone(&errors);
        h.bus.on(EventKind::Error, move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        let result = h.manager.connect("ws://notes", None).await;
        assert!(matches!(result, Err(SyncError::ConnectionTimeout)));
        assert_eq!(h.manager.state(), ConnectionState::Error);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn answered_heartbeat_keeps_connection() {
        let mut h = harness(vec![], 10);
        h.manager.connect("ws://notes", None).await.unwrap();
        let mut peer = h.peers.recv().await.unwrap();

        assert_eq!(frame_type(peer.recv().await), "ping");
        peer.send_text(Envelope::pong(Utc::now()).encode().unwrap());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_pong_triggers_exactly_one_reconnect() {
        let mut h = harness(vec![], 10);
        h.manager.connect("ws://notes", None).await.unwrap();
        let mut peer = h.peers.recv().await.unwrap();
        let start = Instant::now();

        assert_eq!(frame_type(peer.recv().await), "ping");
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        // No pong: the manager closes the channel 5s later.
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        assert_eq!(h.manager.reconnect_attempts(), 1);
        assert_eq!(
            count(&h, ConnectionState::Connected, ConnectionState::Reconnecting),
            1
        );

        time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.manager.reconnect_attempts(), 0);
        assert_eq!(
            count(&h, ConnectionState::Connected, ConnectionState::Reconnecting),
            1
        );
        assert_eq!(h.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let mut h = harness(vec![], 10);
        h.manager.connect("ws://notes", None).await.unwrap();
        let peer = h.peers.recv().await.unwrap();

        peer.close(Some("server restart".into()));
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

        time::sleep(Duration::from_millis(400)).await;
        h.manager.disconnect();
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_budget_is_bounded() {
        let mut h = harness(vec![Plan::Accept, Plan::Fail, Plan::Fail, Plan::Fail], 3);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        h.bus.on(EventKind::Error, move |event| {
            if let SyncEvent::Error { message } = event {
                seen.lock().push(message.clone());
            }
        });

        h.manager.connect("ws://notes", None).await.unwrap();
        let peer = h.peers.recv().await.unwrap();
        drop(peer);

        // 1s + 2s + 4s of backoff, then the budget is spent.
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.manager.state(), ConnectionState::Error);
        assert_eq!(h.opens.load(Ordering::SeqCst), 4);
        assert_eq!(
            *errors.lock(),
            vec!["gave up after 3 reconnect attempts".to_string()]
        );
        assert_eq!(
            count(&h, ConnectionState::Reconnecting, ConnectionState::Error),
            1
        );

        // An explicit connect starts over.
        h.manager.connect("ws://notes", None).await.unwrap();
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_disconnect_closes_channel_and_stays_down() {
        let mut h = harness(vec![], 10);
        h.manager.connect("ws://notes", None).await.unwrap();
        let mut peer = h.peers.recv().await.unwrap();

        h.manager.disconnect();
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        assert!(!h.manager.send("note_ack", Value::Null));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_messages_are_dispatched() {
        let mut h = harness(vec![], 10);
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&updates);
        h.bus.on(EventKind::NoteUpdated, move |event| {
            if let SyncEvent::NoteUpdated(note) = event {
                seen.lock().push(note.id.clone());
            }
        });

        h.manager.connect("ws://notes", None).await.unwrap();
        let mut peer = h.peers.recv().await.unwrap();

        let note = Note::with_id("n1", "t", "c", Utc::now());
        let update = Envelope::new(NOTE_UPDATE, serde_json::to_value(&note).unwrap(), Utc::now());
        peer.send_text(r#"{"type":"presence","payload":{},"timestamp":"2024-01-01T00:00:00Z"}"#);
        peer.send_text("garbage");
        peer.send_text(update.encode().unwrap());
        peer.send_text(Envelope::ping(Utc::now()).encode().unwrap());

        assert_eq!(frame_type(peer.recv().await), "pong");
        assert_eq!(*updates.lock(), vec!["n1".to_string()]);
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }
}
