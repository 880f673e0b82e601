//! Per-viewer session lifecycle
//!
//! A session is one viewer's end-to-end lifecycle: the negotiated transport,
//! the owned capture subprocess, and the delivery flow between them. The
//! record itself lives in [`record`], the state machine in [`state`], the
//! notification handling and teardown discipline in [`lifecycle`], and the
//! stale-session sweep in [`reaper`].

pub mod lifecycle;
pub mod reaper;
pub mod record;
pub mod state;

pub use record::Session;
pub use state::ConnectionState;
