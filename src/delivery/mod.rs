//! Paced frame delivery
//!
//! One pump per session: the capture process's byte stream goes through the
//! Annex-B reframer, and at most one access unit per frame interval goes
//! into the viewer transport. Units arriving faster than the interval
//! overwrite each other in a `watch` slot, so a slow tick only ever delivers
//! the most recent unit; the pump accepts bounded lag, never an unbounded
//! queue.
//!
//! Write failures are counted as dropped frames and logged at reduced
//! frequency; they do not stop the loop. The pump ends on cancellation, on
//! encoder stream end, or on a read error.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::media::annexb::AccessUnitReader;
use crate::stats::RelayMetrics;
use crate::transport::ViewerTransport;

/// Every how many consecutive-session drops a warning is emitted.
const DROP_LOG_INTERVAL: u64 = 60;

/// Drive `source` through the reframer into `transport` until the stream
/// ends or `cancel` fires.
pub async fn pump<R>(
    session_id: String,
    source: R,
    transport: Arc<dyn ViewerTransport>,
    frame_interval: Duration,
    max_unit_len: usize,
    metrics: Arc<RelayMetrics>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (unit_tx, mut unit_rx) = watch::channel(Bytes::new());

    let reader_cancel = cancel.clone();
    let reader_session = session_id.clone();
    let reader = tokio::spawn(async move {
        let mut units = AccessUnitReader::with_max_unit_len(source, max_unit_len);
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                unit = units.next_unit() => match unit {
                    Ok(Some(unit)) => {
                        // Overwrites any unit the pacer has not picked up yet.
                        if unit_tx.send(unit).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(session_id = %reader_session, "Encoder stream ended");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %reader_session, error = %e, "Encoder stream read failed");
                        break;
                    }
                },
            }
        }
    });

    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut drops: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = unit_rx.changed() => {
                // Err means the reader is gone and every unit has been seen.
                if changed.is_err() {
                    break;
                }

                ticker.tick().await;
                let unit = unit_rx.borrow_and_update().clone();

                metrics.frame_processed();
                if let Err(e) = transport.write_sample(unit, frame_interval).await {
                    metrics.frame_dropped();
                    drops += 1;
                    if drops % DROP_LOG_INTERVAL == 1 {
                        tracing::warn!(
                            session_id = %session_id,
                            drops,
                            error = %e,
                            "Sample delivery failing"
                        );
                    }
                }
            }
        }
    }

    let _ = reader.await;
    tracing::debug!(session_id = %session_id, drops, "Delivery pump finished");
}
