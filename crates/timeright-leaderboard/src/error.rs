//! Error types for the leaderboard layer.

use timeright_protocol::ProtocolError;
use timeright_session::GameError;

/// Why a notification could not be built or sent.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Reading the leaderboard (or other game data) failed.
    #[error("game data unavailable: {0}")]
    Game(#[from] GameError),

    /// The frame could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A direct send to a single connection failed.
    #[error("send failed: {0}")]
    Send(String),
}
