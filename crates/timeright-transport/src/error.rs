use std::io;

/// Errors raised while listening for, upgrading or talking to a client.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// The peer connected but the WebSocket upgrade did not complete.
    #[error("WebSocket upgrade failed: {0}")]
    Handshake(String),

    /// Writing a frame failed; the peer is most likely gone.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Reading the next frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// A binary frame arrived whose payload is not UTF-8.
    #[error("binary frame is not UTF-8 text")]
    NotText(#[source] std::string::FromUtf8Error),
}

impl TransportError {
    pub(crate) fn send(
        e: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SendFailed(io::Error::new(io::ErrorKind::BrokenPipe, e))
    }

    pub(crate) fn receive(
        e: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ReceiveFailed(io::Error::new(io::ErrorKind::ConnectionReset, e))
    }
}
