//! deskstream: desktop capture to WebRTC live-streaming relay
//!
//! Relays a live desktop capture to browser viewers: each `POST /offer`
//! negotiates one peer media session, spawns a dedicated ffmpeg capture
//! process, and pumps its Annex-B output as discrete timed samples into the
//! negotiated video channel.
//!
//! # Architecture
//!
//! ```text
//!   POST /offer ──► SessionRegistry ──► Session ◄── connection-state task
//!                                        │  │
//!                     ffmpeg (x11grab) ──┘  └── WebRtcTransport
//!                          │ stdout                   ▲
//!                          ▼                          │ write_sample
//!                   AccessUnitReader ──► delivery::pump (paced)
//! ```
//!
//! Teardown can be entered from the connection-state task, the stale-session
//! reaper, or setup rollback; a per-session guard makes it run exactly once,
//! and the capture process is terminated and reaped on every path.

pub mod delivery;
pub mod encoder;
pub mod error;
pub mod media;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use server::{RelayServer, ServerConfig};
