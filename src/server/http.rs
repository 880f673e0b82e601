//! HTTP signaling surface
//!
//! `POST /offer` negotiates one viewer session and kicks off its capture
//! pipeline; `GET /stats` and `GET /sessions` expose diagnostics. Failures
//! return plain-text bodies: validation problems as 400, setup problems as
//! 500, and a failed setup never leaves a session behind.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use super::config::ServerConfig;
use crate::delivery;
use crate::encoder::{self, CaptureParams};
use crate::error::Error;
use crate::registry::SessionRegistry;
use crate::session::{lifecycle, Session};
use crate::stats::RelayMetrics;
use crate::transport::{ViewerTransport, WebRtcTransport};

pub const MAX_WIDTH: u32 = 3840;
pub const MAX_HEIGHT: u32 = 2160;
pub const MAX_FPS: u32 = 144;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<RelayMetrics>,
    pub config: Arc<ServerConfig>,
}

/// Build the router with all signaling and diagnostics routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/offer", post(offer))
        .route("/stats", get(stats))
        .route("/sessions", get(sessions))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl OfferRequest {
    /// Reject out-of-range parameters before anything is created.
    fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.width > MAX_WIDTH {
            return Err(Error::Validation(format!(
                "width must be within (0, {}], got {}",
                MAX_WIDTH, self.width
            )));
        }
        if self.height == 0 || self.height > MAX_HEIGHT {
            return Err(Error::Validation(format!(
                "height must be within (0, {}], got {}",
                MAX_HEIGHT, self.height
            )));
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(Error::Validation(format!(
                "fps must be within (0, {}], got {}",
                MAX_FPS, self.fps
            )));
        }
        if self.codec.trim().is_empty() {
            return Err(Error::Validation("codec must not be empty".into()));
        }
        if self.sdp.trim().is_empty() {
            return Err(Error::Validation("sdp must not be empty".into()));
        }
        Ok(())
    }

    fn capture_params(&self) -> CaptureParams {
        CaptureParams {
            codec: self.codec.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub r#type: &'static str,
    pub sdp: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active_streams: i64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub drop_rate_percent: f64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionEntry {
    pub id: String,
    pub start_time: u64,
    pub duration: u64,
    pub state: String,
    pub has_encoder: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub total_sessions: usize,
    pub sessions: Vec<SessionEntry>,
    pub timestamp: u64,
}

/// Plain-text error response with the status implied by the error class.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

/// Negotiate a new viewer session.
///
/// The record is registered before the first fallible setup step, so every
/// failure path below unwinds through the same idempotent teardown and no
/// session survives a failed negotiation.
async fn offer(
    State(state): State<AppState>,
    Json(req): Json<OfferRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    req.validate()?;

    tracing::info!(
        codec = %req.codec,
        width = req.width,
        height = req.height,
        fps = req.fps,
        "Negotiation request"
    );

    let session = Session::new();
    state
        .registry
        .register(Arc::clone(&session))
        .await
        .map_err(Error::Registry)?;

    let (state_tx, state_rx) = mpsc::channel(16);

    let transport = match WebRtcTransport::new(&state.config.stun_servers, state_tx).await {
        Ok(transport) => transport,
        Err(e) => {
            tracing::warn!(session_id = %session.id(), error = %e, "Transport setup failed");
            lifecycle::teardown(&session, &state.registry, &state.metrics).await;
            return Err(e.into());
        }
    };
    session.attach_transport(Arc::clone(&transport) as Arc<dyn ViewerTransport>);

    let answer = match transport.negotiate(&req.sdp).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(session_id = %session.id(), error = %e, "Negotiation failed, rolling back");
            lifecycle::teardown(&session, &state.registry, &state.metrics).await;
            return Err(e.into());
        }
    };

    lifecycle::spawn_state_task(
        Arc::clone(&session),
        Arc::clone(&state.registry),
        Arc::clone(&state.metrics),
        state_rx,
    );

    spawn_pipeline(
        Arc::clone(&session),
        transport,
        req.capture_params(),
        Arc::clone(&state.metrics),
        state.config.max_unit_len,
    );

    tracing::info!(session_id = %session.id(), "Negotiation answered");
    Ok(Json(OfferResponse {
        r#type: "answer",
        sdp: answer,
    }))
}

/// Start the capture process and delivery pump off the request path.
fn spawn_pipeline(
    session: Arc<Session>,
    transport: Arc<WebRtcTransport>,
    params: CaptureParams,
    metrics: Arc<RelayMetrics>,
    max_unit_len: usize,
) {
    tokio::spawn(async move {
        let stdout = match encoder::start(&session, &params).await {
            Ok(stdout) => stdout,
            Err(e) => {
                // The session stays registered but will never deliver a
                // frame; the reaper's absolute age limit collects it.
                tracing::error!(session_id = %session.id(), error = %e, "Capture process failed to start");
                return;
            }
        };

        delivery::pump(
            session.id().to_owned(),
            stdout,
            transport as Arc<dyn ViewerTransport>,
            params.frame_interval(),
            max_unit_len,
            metrics,
            session.cancellation(),
        )
        .await;

        // Normal exit or cancellation: reap the process either way.
        encoder::stop(&session).await;
    });
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.metrics.snapshot();
    Json(StatsResponse {
        active_streams: snapshot.active_streams,
        frames_processed: snapshot.frames_processed,
        frames_dropped: snapshot.frames_dropped,
        drop_rate_percent: snapshot.drop_rate_percent(),
        timestamp: unix_now(),
    })
}

async fn sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let records = state.registry.list().await;

    let mut sessions = Vec::with_capacity(records.len());
    for session in records {
        sessions.push(SessionEntry {
            id: session.id().to_owned(),
            start_time: session
                .started_at()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            duration: session.age().as_secs(),
            state: session.state().to_string(),
            has_encoder: session.has_encoder().await,
        });
    }

    Json(SessionsResponse {
        total_sessions: sessions.len(),
        sessions,
        timestamp: unix_now(),
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;

    fn app_state() -> AppState {
        AppState {
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
            config: Arc::new(ServerConfig::default()),
        }
    }

    fn request(width: u32, height: u32, fps: u32) -> OfferRequest {
        OfferRequest {
            sdp: "v=0\r\n".to_owned(),
            codec: "libx264".to_owned(),
            width,
            height,
            fps,
        }
    }

    #[test]
    fn test_validate_accepts_sane_request() {
        assert!(request(1920, 1080, 30).validate().is_ok());
        assert!(request(3840, 2160, 144).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(matches!(
            request(7000, 1080, 30).validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            request(1920, 0, 30).validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            request(1920, 1080, 500).validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut req = request(1280, 720, 30);
        req.codec = "  ".to_owned();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let mut req = request(1280, 720, 30);
        req.sdp = String::new();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_oversized_offer_rejected_before_any_side_effect() {
        let state = app_state();

        let result = offer(State(state.clone()), Json(request(7000, 1080, 30))).await;
        assert!(result.is_err());

        // Nothing was registered, spawned, or counted.
        assert!(state.registry.is_empty().await);
        assert_eq!(state.metrics.snapshot().active_streams, 0);
    }

    #[tokio::test]
    async fn test_stats_reports_drop_rate() {
        let state = app_state();
        for _ in 0..10 {
            state.metrics.frame_processed();
        }
        state.metrics.frame_dropped();

        let Json(body) = stats(State(state)).await;
        assert_eq!(body.frames_processed, 10);
        assert_eq!(body.frames_dropped, 1);
        assert_eq!(body.drop_rate_percent, 10.0);
        assert!(body.timestamp > 0);
    }

    #[tokio::test]
    async fn test_sessions_lists_registered_records() {
        let state = app_state();
        let session = Session::new();
        let id = session.id().to_owned();
        session.set_state(ConnectionState::Connecting);
        state.registry.register(session).await.unwrap();

        let Json(body) = sessions(State(state)).await;
        assert_eq!(body.total_sessions, 1);
        assert_eq!(body.sessions[0].id, id);
        assert_eq!(body.sessions[0].state, "connecting");
        assert!(!body.sessions[0].has_encoder);
    }

    #[tokio::test]
    async fn test_api_error_status_mapping() {
        let response = ApiError(Error::Validation("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(Error::Setup("broken".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
