//! # Time It Right
//!
//! Server for a timing game: a player starts a timer, tries to stop it as
//! close to the target time (10 s by default) as possible, and gets scored
//! on the deviation. Finished games feed a global leaderboard that is
//! pushed to subscribers over WebSocket as it changes.
//!
//! The workspace is layered:
//!
//! - `timeright-transport`: text-frame [`Connection`] over WebSocket
//! - `timeright-protocol`: push-channel message types and JSON framing
//! - `timeright-session`: session state machine, scoring, storage, rules
//! - `timeright-leaderboard`: connection registry and notifications
//! - `timeright` (this crate): [`GameApi`], connection handler and server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use timeright::prelude::*;
//!
//! # async fn run() -> Result<(), TimerightError> {
//! let store = Arc::new(InMemoryStore::new());
//! let tokens = Arc::new(OpaqueTokenService::new());
//! let server = TimerightServer::<InMemoryStore, OpaqueTokenService>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(store, tokens)
//!     .await?;
//!
//! // Games played through the API notify connected clients.
//! let api = server.api().clone();
//! let session = api.start_game(UserId(1)).await?;
//! # let _ = session;
//! server.run().await
//! # }
//! ```
//!
//! [`Connection`]: timeright_transport::Connection

mod error;
mod game;
mod handler;
mod server;
mod telemetry;

pub use error::TimerightError;
pub use game::GameApi;
pub use handler::PONG_MESSAGE;
pub use server::{
    PUSH_CHANNEL_PATH, ServerConfig, TimerightServer, TimerightServerBuilder,
};
pub use telemetry::{init_tracing, init_tracing_with};

/// Common imports for running and driving a server.
pub mod prelude {
    pub use crate::{
        GameApi, ServerConfig, TimerightError, TimerightServer,
        TimerightServerBuilder, init_tracing,
    };
    pub use timeright_leaderboard::{
        ConnectionRegistry, LEADERBOARD_TOPIC, LeaderboardNotifier,
    };
    pub use timeright_protocol::{
        ClientRequest, LeaderboardEntry, ServerEnvelope, ServerEvent, SessionId,
        UserId,
    };
    pub use timeright_session::{
        Accounts, Clock, GameConfig, GameError, GameService, GameSession,
        GameStore, InMemoryStore, ManualClock, OpaqueTokenService, ScoreCard,
        SessionStatus, SystemClock, TokenService, UserStats,
    };
    pub use timeright_transport::{Connection, WebSocketConnection};
}
