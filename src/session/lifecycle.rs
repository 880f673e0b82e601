//! Connection-state handling and session teardown
//!
//! All connection-state notifications for one session flow through a single
//! task, so transitions are serialized at one point instead of racing
//! transport callbacks against each other and against the reaper. Teardown
//! can still be entered from two sides (this task and the reaper); a
//! per-session one-shot guard picks exactly one winner, and every step of
//! the sequence is itself idempotent.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::record::Session;
use super::state::ConnectionState;
use crate::registry::SessionRegistry;
use crate::stats::RelayMetrics;

/// Spawn the task that owns this session's state transitions.
///
/// The task ends after the first terminal notification; anything the
/// transport reports afterwards (a `Closed` following a `Disconnected`) is
/// dropped, which is what keeps the gauge from double-counting.
pub fn spawn_state_task(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<RelayMetrics>,
    mut states: mpsc::Receiver<ConnectionState>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = states.recv().await {
            tracing::info!(session_id = %session.id(), %state, "Connection state changed");

            // A notification may arrive after the reaper already evicted the
            // record; the update is then a no-op.
            let _ = registry.update(session.id(), |s| s.set_state(state)).await;

            if state == ConnectionState::Connected {
                if session.mark_connected() {
                    metrics.stream_started();
                }
            } else if state.is_terminal() {
                teardown(&session, &registry, &metrics).await;
                break;
            }
        }
    })
}

/// Tear a session down: gauge release, cancellation, capture process
/// termination, registry removal, transport close.
///
/// Idempotent and safe to invoke concurrently from the state task, the
/// reaper, and setup rollback. The first caller wins; later callers return
/// immediately.
pub async fn teardown(
    session: &Arc<Session>,
    registry: &Arc<SessionRegistry>,
    metrics: &Arc<RelayMetrics>,
) {
    if !session.begin_teardown() {
        return;
    }

    if session.mark_ended() {
        metrics.stream_ended();
    }

    // Unregister also shuts the capture process down. A session that never
    // made it into the registry still owes that shutdown.
    if registry.unregister(session.id()).await.is_none() {
        session.shutdown().await;
    }

    if let Some(transport) = session.transport() {
        if let Err(e) = transport.close().await {
            tracing::debug!(session_id = %session.id(), error = %e, "Transport close failed");
        }
    }

    tracing::info!(session_id = %session.id(), state = %session.state(), "Session torn down");
}
