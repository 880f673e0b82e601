//! WebRTC-backed viewer transport
//!
//! One peer connection and one outbound H.264 sample track per viewer. The
//! `webrtc` crate handles ICE, DTLS, SRTP, and RTP packetization; this module
//! only adapts it to the [`ViewerTransport`] contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::ViewerTransport;
use crate::error::{Error, Result};
use crate::session::ConnectionState;

/// How long `negotiate` waits for ICE gathering before answering with
/// whatever candidates were collected so far.
const ICE_GATHER_TIMEOUT: Duration = Duration::from_millis(2500);

/// Peer connection with one outbound H.264 sample track
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticSample>,
    closed: AtomicBool,
}

impl WebRtcTransport {
    /// Create the peer connection and wire its connection-state observer
    /// into `states`. The receiving end belongs to the session's lifecycle
    /// task, which is the single owner of all state transitions.
    pub async fn new(
        stun_servers: &[String],
        states: mpsc::Sender<ConnectionState>,
    ) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(setup)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(setup)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await.map_err(setup)?);

        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let states = states.clone();
            Box::pin(async move {
                let mapped = match s {
                    RTCPeerConnectionState::New => ConnectionState::New,
                    RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                    RTCPeerConnectionState::Failed => ConnectionState::Failed,
                    RTCPeerConnectionState::Closed => ConnectionState::Closed,
                    _ => return,
                };
                // The lifecycle task may already have stopped listening after
                // a terminal state; later notifications are then dropped.
                let _ = states.send(mapped).await;
            })
        }));

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "deskstream".to_owned(),
        ));

        pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(setup)?;

        Ok(Arc::new(Self {
            pc,
            track,
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl ViewerTransport for WebRtcTransport {
    async fn negotiate(&self, offer_sdp: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_owned())
            .map_err(|e| Error::Validation(format!("invalid SDP offer: {}", e)))?;

        self.pc.set_remote_description(offer).await.map_err(setup)?;

        let answer = self.pc.create_answer(None).await.map_err(setup)?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(answer).await.map_err(setup)?;

        if tokio::time::timeout(ICE_GATHER_TIMEOUT, gather_complete.recv())
            .await
            .is_err()
        {
            tracing::debug!(
                timeout_ms = ICE_GATHER_TIMEOUT.as_millis() as u64,
                "ICE gathering still running, answering with partial candidates"
            );
        }

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| Error::Setup("no local description after answer".into()))?;

        Ok(local.sdp)
    }

    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        self.track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Delivery(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pc
            .close()
            .await
            .map_err(|e| Error::Setup(format!("peer connection close failed: {}", e)))
    }
}

fn setup<E: std::fmt::Display>(e: E) -> Error {
    Error::Setup(e.to_string())
}
