//! Registry error types

/// Error type for session registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// A session with this id is already registered
    DuplicateSession(String),
    /// No session with this id is registered
    SessionNotFound(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateSession(id) => {
                write!(f, "session already registered: {}", id)
            }
            RegistryError::SessionNotFound(id) => write!(f, "session not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
