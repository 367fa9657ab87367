//! Listen command implementation.

use super::sync::{pass, print_result};
use super::{open_engine, CliResult, RemoteTarget};
use notesync_engine::{
    ConnectionConfig, ConnectionManager, EventKind, NotificationBus, RemoteEventOutcome,
    SyncEvent, SystemClock, WebSocketConnector,
};
use notesync_protocol::ResolutionStrategy;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Runs the listen command.
///
/// Connects to the event channel, runs a catch-up pass, then applies pushed
/// remote events until interrupted. A `sync_required` event triggers a
/// full pass.
pub async fn run(
    path: &Path,
    target: RemoteTarget,
    address: &str,
    token: Option<&str>,
    strategy: ResolutionStrategy,
) -> CliResult<()> {
    let bus = Arc::new(NotificationBus::new());
    let engine = open_engine(path, target, Arc::clone(&bus))?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    for kind in [
        EventKind::NoteUpdated,
        EventKind::NoteDeleted,
        EventKind::SyncRequired,
    ] {
        let tx = events_tx.clone();
        bus.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    drop(events_tx);

    bus.on(EventKind::ConnectionStateChanged, |event| {
        if let SyncEvent::ConnectionStateChanged { from, to } = event {
            println!("Connection: {from} -> {to}");
        }
    });
    bus.on(EventKind::Error, |event| {
        if let SyncEvent::Error { message } = event {
            eprintln!("Error: {message}");
        }
    });

    let manager = ConnectionManager::new(
        WebSocketConnector::new(),
        ConnectionConfig::default(),
        Arc::clone(&bus),
        Arc::new(SystemClock),
    );
    manager.connect(address, token).await?;

    print_result(&pass(&engine, strategy).await?);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match engine.handle_remote_event(&event).await {
                    Ok(RemoteEventOutcome::SyncRequested) => match pass(&engine, strategy).await {
                        Ok(result) => print_result(&result),
                        Err(e) => warn!(error = %e, "requested sync pass failed"),
                    },
                    Ok(outcome) => debug!(?outcome, "remote event handled"),
                    Err(e) => warn!(error = %e, "failed to apply remote event"),
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}
