//! Capture process supervision
//!
//! One ffmpeg process per session. The supervisor spawns it, hands its
//! stdout to the delivery pump, pipes its stderr through a filtered log
//! pump, and attaches the child handle to the session so teardown can
//! terminate it from any path.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio_util::sync::CancellationToken;

use super::command::{capture_command, CaptureParams};
use crate::error::{Error, Result};
use crate::session::Session;

/// Spawn the capture process for `session` and return its stdout stream.
///
/// The child handle is attached under the session's own process lock, so a
/// concurrent teardown either sees no handle yet (and the attach is refused,
/// below) or the fully initialized one. If cancellation fired before the
/// attach, the freshly spawned process is killed on the spot; no encoder may
/// start for a cancelled session.
pub async fn start(session: &Arc<Session>, params: &CaptureParams) -> Result<ChildStdout> {
    let mut cmd = capture_command(params);
    let mut child = cmd.spawn().map_err(Error::EncoderSpawn)?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Setup("capture process stdout was not piped".into()))?;

    if let Some(stderr) = child.stderr.take() {
        spawn_log_pump(session.id().to_owned(), stderr, session.cancellation());
    }

    if let Err(mut child) = session.attach_process(child).await {
        tracing::warn!(
            session_id = %session.id(),
            pid,
            cancelled = session.is_cancelled(),
            "Encoder attach refused, killing fresh process"
        );
        if let Err(e) = child.kill().await {
            tracing::warn!(session_id = %session.id(), error = %e, "Kill after refused attach failed");
        }
        return Err(Error::Setup(
            "session no longer accepts an encoder".into(),
        ));
    }

    tracing::info!(
        session_id = %session.id(),
        pid,
        codec = %params.codec,
        width = params.width,
        height = params.height,
        fps = params.fps,
        "Capture process started"
    );

    Ok(stdout)
}

/// Idempotent stop: cancel the session, signal the process if one is still
/// attached and running, and wait for its exit. Calling this on a session
/// that was already stopped is a no-op.
pub async fn stop(session: &Arc<Session>) {
    session.shutdown().await;
}

/// Forward encoder diagnostics to the log sink, dropping the high-frequency
/// progress lines, until the stream ends or the session is cancelled.
fn spawn_log_pump(session_id: String, stderr: ChildStderr, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if is_progress_line(&line) {
                            continue;
                        }
                        tracing::debug!(session_id = %session_id, "encoder: {}", line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(session_id = %session_id, error = %e, "Encoder stderr closed");
                        break;
                    }
                },
            }
        }
    });
}

/// ffmpeg rewrites its `frame= ... fps= ... bitrate= ...` status line many
/// times per second; forwarding those would flood the sink.
fn is_progress_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with("frame=") || trimmed.starts_with("size=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lines_filtered() {
        assert!(is_progress_line(
            "frame=  312 fps= 30 q=23.0 size=    1024kB time=00:00:10.40"
        ));
        assert!(is_progress_line("size=    2048kB time=00:00:20.80"));
        assert!(is_progress_line("   "));
    }

    #[test]
    fn test_diagnostic_lines_kept() {
        assert!(!is_progress_line(
            "[libx264 @ 0x55d] profile Constrained Baseline, level 3.1"
        ));
        assert!(!is_progress_line("Input #0, x11grab, from ':0':"));
        assert!(!is_progress_line("x11grab: Invalid MIT-SHM event"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_reaps_attached_process() {
        let session = Session::new();
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        session.attach_process(child).await.unwrap();

        stop(&session).await;
        assert!(!session.has_encoder().await);

        // Stopping an already-stopped session is a no-op.
        stop(&session).await;
    }
}
