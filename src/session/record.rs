//! Per-viewer session record
//!
//! One record per negotiated viewer. The record owns the capture subprocess
//! handle and the cancellation signal; everything that can race on it goes
//! through a guard scoped to this session alone, never through the registry
//! lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::ConnectionState;
use crate::transport::ViewerTransport;

/// State and owned resources of one viewer session
pub struct Session {
    id: String,
    created_at: Instant,
    started_at: SystemTime,

    state: Mutex<ConnectionState>,

    /// Owned capture process. Guarded by its own async lock so that killing
    /// the process and attaching the handle never race.
    process: tokio::sync::Mutex<Option<Child>>,

    /// Session-scoped cancellation signal observed by the delivery pump and
    /// the diagnostics pump.
    cancel: CancellationToken,

    /// Attached after registration; absent while setup is still unwinding.
    transport: OnceLock<Arc<dyn ViewerTransport>>,

    /// Set once the active-stream gauge was incremented for this session.
    gauge_counted: AtomicBool,

    /// Set by the first caller to enter teardown.
    teardown_started: AtomicBool,
}

impl Session {
    /// Create a fresh record. Infallible so it can be registered before any
    /// fallible setup step runs.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            created_at: Instant::now(),
            started_at: SystemTime::now(),
            state: Mutex::new(ConnectionState::New),
            process: tokio::sync::Mutex::new(None),
            cancel: CancellationToken::new(),
            transport: OnceLock::new(),
            gauge_counted: AtomicBool::new(false),
            teardown_started: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wall-clock creation time, for diagnostics output.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time since the record was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn set_state(&self, next: ConnectionState) {
        *self.state.lock() = next;
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Attach the transport once it exists. Later calls are ignored; exactly
    /// one transport is ever associated with a session.
    pub fn attach_transport(&self, transport: Arc<dyn ViewerTransport>) {
        let _ = self.transport.set(transport);
    }

    pub fn transport(&self) -> Option<&Arc<dyn ViewerTransport>> {
        self.transport.get()
    }

    /// Attach the spawned capture process under the session's process lock.
    ///
    /// Exactly one handle may ever be associated with a session, and once
    /// cancellation has fired no further encoder start may occur. In either
    /// case the fresh child is handed back so the caller can kill it.
    pub async fn attach_process(&self, child: Child) -> Result<(), Child> {
        let mut slot = self.process.lock().await;
        if self.cancel.is_cancelled() || slot.is_some() {
            return Err(child);
        }
        *slot = Some(child);
        Ok(())
    }

    pub async fn has_encoder(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// True exactly once, for the caller that should increment the
    /// active-stream gauge.
    pub fn mark_connected(&self) -> bool {
        !self.gauge_counted.swap(true, Ordering::SeqCst)
    }

    /// True exactly once after `mark_connected`, for the caller that should
    /// decrement the gauge.
    pub fn mark_ended(&self) -> bool {
        self.gauge_counted.swap(false, Ordering::SeqCst)
    }

    /// True for the first caller to enter teardown; every later call must
    /// treat the session as already being torn down.
    pub fn begin_teardown(&self) -> bool {
        !self.teardown_started.swap(true, Ordering::SeqCst)
    }

    /// Cancel the session and terminate its capture process.
    ///
    /// Safe to call repeatedly and from concurrent callers: the handle is
    /// taken out of its slot before the kill, so at most one caller ever
    /// signals the process, and the exit is awaited so no zombie remains.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let child = self.process.lock().await.take();
        if let Some(mut child) = child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(
                        session_id = %self.id,
                        %status,
                        "Capture process already exited"
                    );
                }
                _ => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(
                            session_id = %self.id,
                            error = %e,
                            "Failed to terminate capture process"
                        );
                    } else {
                        tracing::info!(session_id = %self.id, "Capture process terminated");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new();
        assert_eq!(session.state(), ConnectionState::New);
        assert!(!session.is_cancelled());
        assert!(session.transport().is_none());
    }

    #[test]
    fn test_gauge_guards_fire_once() {
        let session = Session::new();

        assert!(session.mark_connected());
        assert!(!session.mark_connected());

        assert!(session.mark_ended());
        assert!(!session.mark_ended());
    }

    #[test]
    fn test_gauge_not_ended_when_never_connected() {
        let session = Session::new();
        assert!(!session.mark_ended());
    }

    #[test]
    fn test_teardown_guard_single_winner() {
        let session = Session::new();
        assert!(session.begin_teardown());
        assert!(!session.begin_teardown());
    }

    #[tokio::test]
    async fn test_shutdown_without_process_is_noop() {
        let session = Session::new();
        session.shutdown().await;
        session.shutdown().await;
        assert!(session.is_cancelled());
        assert!(!session.has_encoder().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_kills_attached_process_once() {
        let session = Session::new();

        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        session.attach_process(child).await.unwrap();
        assert!(session.has_encoder().await);

        session.shutdown().await;
        assert!(!session.has_encoder().await);

        // Second call finds the slot empty.
        session.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_no_attach_after_cancellation() {
        let session = Session::new();
        session.shutdown().await;

        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let rejected = session.attach_process(child).await;
        assert!(rejected.is_err());

        if let Err(mut child) = rejected {
            child.kill().await.unwrap();
        }
        assert!(!session.has_encoder().await);
    }
}
