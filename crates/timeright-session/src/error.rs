//! Error types for the session layer.

use timeright_protocol::SessionId;

/// Errors surfaced by game use cases, stores and account operations.
///
/// The first five variants are the domain taxonomy a presentation layer
/// maps to responses; the rest cover input validation, token checks and
/// storage failures.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// A uniqueness rule was violated: a second active session for a
    /// user, or a duplicate username / email.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The session or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller does not own the session (or statistics) it addressed.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// A lifecycle transition was attempted from the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A stop was attempted after the session's TTL lapsed. The session
    /// has been moved to `Expired`.
    #[error("session {0} has expired")]
    Expired(SessionId),

    /// Registration data or configuration failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An access token was unknown or revoked.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// The category of a [`GameError`], for mapping onto protocol responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Authorization,
    InvalidState,
    Expired,
    InvalidInput,
    Unauthenticated,
    Internal,
}

impl GameError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Expired(_) => ErrorKind::Expired,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AuthFailed(_) => ErrorKind::Unauthenticated,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}
