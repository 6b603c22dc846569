//! Unified error type for the Time It Right server.

use timeright_leaderboard::NotifyError;
use timeright_protocol::ProtocolError;
use timeright_session::GameError;
use timeright_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors, so code
/// using the `timeright` crate deals with this one type.
#[derive(Debug, thiserror::Error)]
pub enum TimerightError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, parse).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A game rule or storage error.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A notification could not be built or delivered.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Server configuration was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}
