//! Relay statistics

pub mod metrics;

pub use metrics::{spawn_emitter, MetricsSnapshot, RelayMetrics};
