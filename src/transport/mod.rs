//! Viewer media-transport contract
//!
//! The relay never touches ICE, DTLS, or RTP directly. Everything it needs
//! from the peer transport fits in the [`ViewerTransport`] trait: accept a
//! remote offer and answer it, observe connection-state changes, push timed
//! samples, close. [`webrtc::WebRtcTransport`] is the production
//! implementation; tests substitute their own.
//!
//! Connection-state observation is not part of the trait because it is wired
//! at construction time: the implementation feeds [`ConnectionState`] values
//! into an mpsc channel owned by the session's lifecycle task, which
//! serializes every transition through one point.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub mod webrtc;

pub use self::webrtc::WebRtcTransport;

/// One viewer's media transport
#[async_trait]
pub trait ViewerTransport: Send + Sync {
    /// Accept the remote offer and produce the local answer SDP.
    async fn negotiate(&self, offer_sdp: &str) -> Result<String>;

    /// Push one compressed sample with its display duration into the
    /// outbound video channel.
    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()>;

    /// Close the transport side. Idempotent.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic transport double for lifecycle and delivery tests.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::ViewerTransport;
    use crate::error::{Error, Result};

    #[derive(Default)]
    pub struct FakeTransport {
        pub fail_writes: AtomicBool,
        pub writes: AtomicUsize,
        pub closes: AtomicUsize,
        pub samples: Mutex<Vec<Bytes>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let transport = Self::default();
            transport.fail_writes.store(true, Ordering::SeqCst);
            transport
        }

        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ViewerTransport for FakeTransport {
        async fn negotiate(&self, _offer_sdp: &str) -> Result<String> {
            Ok("v=0\r\n".to_owned())
        }

        async fn write_sample(&self, data: Bytes, _duration: Duration) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Delivery("fake transport rejecting writes".into()));
            }
            self.samples.lock().unwrap().push(data);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
