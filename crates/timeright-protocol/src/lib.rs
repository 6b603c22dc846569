//! Wire protocol for the Time It Right push channel.
//!
//! This crate defines the "language" spoken over the leaderboard channel:
//!
//! - **Types** ([`ServerEvent`], [`ServerEnvelope`], [`ClientRequest`],
//!   [`LeaderboardEntry`], etc.): the structures that travel as JSON
//!   text frames.
//! - **Codec** ([`encode_frame`], [`parse_request`]): how those
//!   structures are turned into frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw text frames) and the
//! game/leaderboard layers. It knows nothing about connections or storage.
//!
//! ```text
//! Transport (text) → Protocol (ClientRequest / ServerEnvelope) → Leaderboard
//! ```

mod codec;
mod error;
mod types;

pub use codec::{encode_frame, format_timestamp, parse_request};
pub use error::ProtocolError;
pub use types::{
    ClientRequest, LeaderboardEntry, LeaderboardSnapshot, ServerEnvelope,
    ServerEvent, SessionId, UserId,
};
