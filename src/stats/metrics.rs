//! Relay metrics
//!
//! Counters are only ever touched atomically from arbitrary concurrent call
//! sites. The derived drop rate is processed-relative and reads as zero when
//! nothing has been processed yet.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Server-wide relay counters
#[derive(Debug, Default)]
pub struct RelayMetrics {
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    active_streams: AtomicI64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One access unit went through the delivery pump.
    pub fn frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// One access unit was rejected by the transport sink.
    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A session entered the connected state.
    pub fn stream_started(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// A previously connected session ended.
    pub fn stream_ended(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
        }
    }
}

/// Consistent view of the counters at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub active_streams: i64,
}

impl MetricsSnapshot {
    /// Dropped frames as a percentage of processed frames.
    pub fn drop_rate_percent(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.frames_dropped as f64 * 100.0 / self.frames_processed as f64
        }
    }
}

/// Spawn the periodic metrics emission task.
pub fn spawn_emitter(metrics: Arc<RelayMetrics>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = metrics.snapshot();
            tracing::info!(
                active_streams = snapshot.active_streams,
                frames_processed = snapshot.frames_processed,
                frames_dropped = snapshot.frames_dropped,
                drop_rate_percent = snapshot.drop_rate_percent(),
                "Relay metrics"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_rate_zero_when_nothing_processed() {
        let metrics = RelayMetrics::new();
        assert_eq!(metrics.snapshot().drop_rate_percent(), 0.0);
    }

    #[test]
    fn test_drop_rate_is_processed_relative() {
        let metrics = RelayMetrics::new();
        for _ in 0..200 {
            metrics.frame_processed();
        }
        for _ in 0..50 {
            metrics.frame_dropped();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_processed, 200);
        assert_eq!(snapshot.frames_dropped, 50);
        assert_eq!(snapshot.drop_rate_percent(), 25.0);
    }

    #[test]
    fn test_active_stream_gauge() {
        let metrics = RelayMetrics::new();
        metrics.stream_started();
        metrics.stream_started();
        metrics.stream_ended();

        assert_eq!(metrics.snapshot().active_streams, 1);
    }

    #[tokio::test]
    async fn test_concurrent_counting() {
        let metrics = Arc::new(RelayMetrics::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let metrics = Arc::clone(&metrics);
            tasks.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    metrics.frame_processed();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(metrics.snapshot().frames_processed, 8000);
    }
}
