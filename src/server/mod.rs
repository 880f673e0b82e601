//! Relay server assembly
//!
//! Owns the registry and metrics, runs the HTTP signaling surface, and keeps
//! the background sweeps alive for as long as the server runs.

pub mod config;
pub mod http;

pub use config::ServerConfig;
pub use http::{build_router, AppState};

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::session::{lifecycle, reaper};
use crate::stats::{self, RelayMetrics};

/// Desktop-capture relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Run the server until it fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves, then tear every live
    /// session down so no capture process outlives the relay.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            config: Arc::new(self.config.clone()),
        };
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Relay server listening");

        let reaper_handle = reaper::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.config.reaper_interval,
            self.config.terminal_grace,
            self.config.max_session_age,
        );
        let emitter_handle = stats::spawn_emitter(Arc::clone(&self.metrics), self.config.stats_interval);

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            served = async { axum::serve(listener, router).await } => {
                served.map_err(crate::error::Error::from)
            }
        };

        reaper_handle.abort();
        emitter_handle.abort();

        for session in self.registry.list().await {
            lifecycle::teardown(&session, &self.registry, &self.metrics).await;
        }

        result
    }
}
