//! Crate error types
//!
//! Failures are scoped to one session; nothing here is allowed to take the
//! whole relay down.

use crate::registry::RegistryError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type for relay operations
#[derive(Debug)]
pub enum Error {
    /// Malformed request body or out-of-range parameters. Client error,
    /// produced before any side effect.
    Validation(String),
    /// Creating the peer session, track, or negotiated answer failed.
    /// Triggers a full rollback of the partially built session.
    Setup(String),
    /// The capture process could not be started. The session stays
    /// registered but will never deliver frames.
    EncoderSpawn(std::io::Error),
    /// A sample was not accepted by the transport sink. Counted, non-fatal.
    Delivery(String),
    /// Registry operation failed.
    Registry(RegistryError),
    /// I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "invalid request: {}", msg),
            Error::Setup(msg) => write!(f, "session setup failed: {}", msg),
            Error::EncoderSpawn(e) => write!(f, "failed to start capture process: {}", e),
            Error::Delivery(msg) => write!(f, "sample delivery failed: {}", msg),
            Error::Registry(e) => write!(f, "{}", e),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::EncoderSpawn(e) | Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
