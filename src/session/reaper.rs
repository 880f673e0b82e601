//! Stale-session sweep
//!
//! Connection-state notifications are best effort; a peer that vanishes
//! without a terminal notification would leak its session and capture
//! process forever. The sweep walks a registry snapshot on a fixed interval
//! and evicts sessions that sat in a terminal state past the grace period,
//! or that exceeded the absolute age limit in any state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::lifecycle;
use super::state::ConnectionState;
use crate::registry::SessionRegistry;
use crate::stats::RelayMetrics;

/// Spawn the periodic sweep task.
pub fn spawn(
    registry: Arc<SessionRegistry>,
    metrics: Arc<RelayMetrics>,
    interval: Duration,
    terminal_grace: Duration,
    max_session_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep(&registry, &metrics, terminal_grace, max_session_age).await;
        }
    })
}

/// Run one sweep over the registry snapshot. Returns how many sessions were
/// evicted.
pub async fn sweep(
    registry: &Arc<SessionRegistry>,
    metrics: &Arc<RelayMetrics>,
    terminal_grace: Duration,
    max_session_age: Duration,
) -> usize {
    let mut evicted = 0;

    for session in registry.list().await {
        let state = session.state();
        let age = session.age();

        let stale = (state.is_terminal() && age > terminal_grace) || age > max_session_age;
        if !stale {
            continue;
        }

        tracing::warn!(
            session_id = %session.id(),
            %state,
            age_secs = age.as_secs(),
            "Evicting stale session"
        );
        session.set_state(ConnectionState::Reaped);
        lifecycle::teardown(&session, registry, metrics).await;
        evicted += 1;
    }

    if evicted > 0 {
        tracing::info!(evicted, "Stale-session sweep finished");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::transport::testing::FakeTransport;
    use crate::transport::ViewerTransport;

    const LONG: Duration = Duration::from_secs(3600);

    async fn registered_session(
        registry: &Arc<SessionRegistry>,
    ) -> (Arc<Session>, Arc<FakeTransport>) {
        let session = Session::new();
        let transport = Arc::new(FakeTransport::new());
        session.attach_transport(Arc::clone(&transport) as Arc<dyn ViewerTransport>);
        registry.register(Arc::clone(&session)).await.unwrap();
        (session, transport)
    }

    #[tokio::test]
    async fn test_terminal_session_evicted_after_grace() {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let (session, transport) = registered_session(&registry).await;

        session.set_state(ConnectionState::Disconnected);

        let evicted = sweep(&registry, &metrics, Duration::ZERO, LONG).await;
        assert_eq!(evicted, 1);
        assert!(registry.is_empty().await);
        assert!(session.is_cancelled());
        assert_eq!(transport.close_count(), 1);
        assert_eq!(session.state(), ConnectionState::Reaped);
    }

    #[tokio::test]
    async fn test_never_connected_session_evicted_by_age_limit() {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let (session, _transport) = registered_session(&registry).await;

        // Still in New: only the absolute age limit applies.
        assert_eq!(session.state(), ConnectionState::New);

        let evicted = sweep(&registry, &metrics, Duration::ZERO, Duration::ZERO).await;
        assert_eq!(evicted, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_healthy_session_survives_sweep() {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let (session, transport) = registered_session(&registry).await;

        session.set_state(ConnectionState::Connected);

        let evicted = sweep(&registry, &metrics, LONG, LONG).await;
        assert_eq!(evicted, 0);
        assert_eq!(registry.len().await, 1);
        assert_eq!(transport.close_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_and_state_task_do_not_double_count() {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let (session, transport) = registered_session(&registry).await;

        // Session connected, then the transport notification is "skipped":
        // only its state lands, no teardown ran.
        assert!(session.mark_connected());
        metrics.stream_started();
        session.set_state(ConnectionState::Disconnected);

        sweep(&registry, &metrics, Duration::ZERO, LONG).await;
        sweep(&registry, &metrics, Duration::ZERO, LONG).await;

        assert_eq!(metrics.snapshot().active_streams, 0);
        assert_eq!(transport.close_count(), 1);
    }
}
