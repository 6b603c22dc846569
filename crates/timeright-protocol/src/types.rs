//! Core protocol types for the push channel's wire format.
//!
//! Every type here is either serialized into an outbound text frame or
//! parsed out of an inbound one. Outbound frames always look like:
//!
//! ```text
//! {
//!   "type": "<event>",
//!   "data": { ... },
//!   "timestamp": "...Z",
//!   "triggered_by_user": 7
//! }
//! ```
//!
//! where `timestamp` is omitted for `pong` / `error` frames and
//! `triggered_by_user` only appears on leaderboard updates caused by a
//! game completion.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::format_timestamp;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user (the authenticated principal).
///
/// Newtype over `u64` so a `SessionId` can never be passed where a user is
/// expected. `#[serde(transparent)]` keeps the JSON form a plain number.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A unique identifier for one game session, assigned by the store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Leaderboard payloads
// ---------------------------------------------------------------------------

/// One ranked row of the leaderboard as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position, ascending by average deviation.
    pub rank: u32,
    pub user_id: UserId,
    /// `None` when the store has no profile for this user.
    pub username: Option<String>,
    /// Mean deviation over completed sessions, rounded to 2 decimals.
    pub avg_deviation_ms: f64,
    /// Smallest deviation the user ever achieved.
    pub best_deviation_ms: i64,
    /// Number of completed sessions.
    pub total_games: u64,
    /// `max(0, 100 * (1 - avg / target))`, rounded to 2 decimals.
    pub accuracy_percentage: f64,
}

/// A full leaderboard snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub total_entries: usize,
}

impl LeaderboardSnapshot {
    /// Wraps a list of entries, filling in `total_entries`.
    pub fn new(leaderboard: Vec<LeaderboardEntry>) -> Self {
        let total_entries = leaderboard.len();
        Self {
            leaderboard,
            total_entries,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent: server → client
// ---------------------------------------------------------------------------

/// Every message the server pushes to a client.
///
/// `#[serde(tag = "type", content = "data")]` produces "adjacently tagged"
/// JSON: the variant name (snake_case) goes in `type`, its fields in
/// `data`. For example `Pong { message }` becomes
/// `{ "type": "pong", "data": { "message": "Connection alive" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The recomputed leaderboard, broadcast after a game completes.
    LeaderboardUpdate(LeaderboardSnapshot),

    /// Someone just set the best deviation on the board.
    NewHighScore {
        user_id: UserId,
        username: String,
        deviation_ms: i64,
        accuracy_percentage: f64,
    },

    /// Targeted at one user: their leaderboard position moved.
    RankChange {
        user_id: UserId,
        new_rank: u32,
        old_rank: Option<u32>,
        improved: bool,
    },

    /// First frame on every new connection: current state for late joiners.
    ConnectionEstablished {
        message: String,
        current_leaderboard: LeaderboardSnapshot,
        active_connections: usize,
    },

    /// Reply to a client `ping`.
    Pong { message: String },

    /// Reply to `subscribe_user_updates`.
    SubscriptionConfirmed { message: String, user_id: UserId },

    /// Something about the client's request was wrong.
    Error { message: String },
}

/// The top-level outbound frame: an event plus frame metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    /// Flattened so `type` and `data` sit at the top level of the frame.
    #[serde(flatten)]
    pub event: ServerEvent,

    /// ISO-8601 UTC with a trailing `Z`. Absent on `pong` / `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// The user whose game completion caused a leaderboard update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by_user: Option<UserId>,
}

impl ServerEnvelope {
    /// An envelope carrying a timestamp taken at `at`.
    pub fn stamped(event: ServerEvent, at: DateTime<Utc>) -> Self {
        Self {
            event,
            timestamp: Some(format_timestamp(at)),
            triggered_by_user: None,
        }
    }

    /// An envelope without a timestamp (`pong`, `error`).
    pub fn bare(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: None,
            triggered_by_user: None,
        }
    }

    /// Records which user's action triggered this frame.
    pub fn triggered_by(mut self, user_id: Option<UserId>) -> Self {
        self.triggered_by_user = user_id;
        self
    }

    /// Shorthand for an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::bare(ServerEvent::Error {
            message: message.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// ClientRequest: client → server
// ---------------------------------------------------------------------------

/// Requests a client may send over the push channel.
///
/// Inbound frames are parsed with [`parse_request`](crate::parse_request)
/// rather than plain `Deserialize`, because the channel must distinguish
/// malformed JSON from an unknown `type` and report each differently.
/// `Serialize` is derived so clients (and tests) can build frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Liveness check; answered with `pong`.
    Ping,
    /// Resend the `connection_established` snapshot.
    RequestLeaderboard,
    /// Tag this connection as interested in one user's updates.
    SubscribeUserUpdates { user_id: UserId },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is a contract with browser clients, so these tests
    //! pin the exact JSON shapes rather than round-tripping.

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn entry(rank: u32, user: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            rank,
            user_id: UserId(user),
            username: Some(format!("player{user}")),
            avg_deviation_ms: 50.0,
            best_deviation_ms: 12,
            total_games: 3,
            accuracy_percentage: 99.5,
        }
    }

    #[test]
    fn test_user_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(UserId(7).to_string(), "U-7");
        assert_eq!(SessionId(3).to_string(), "S-3");
    }

    #[test]
    fn test_snapshot_new_counts_entries() {
        let snapshot = LeaderboardSnapshot::new(vec![entry(1, 1), entry(2, 2)]);
        assert_eq!(snapshot.total_entries, 2);
    }

    #[test]
    fn test_leaderboard_update_envelope_json_format() {
        let envelope = ServerEnvelope::stamped(
            ServerEvent::LeaderboardUpdate(LeaderboardSnapshot::new(vec![
                entry(1, 9),
            ])),
            at(),
        )
        .triggered_by(Some(UserId(9)));

        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "leaderboard_update");
        assert_eq!(value["data"]["total_entries"], 1);
        assert_eq!(value["data"]["leaderboard"][0]["rank"], 1);
        assert_eq!(value["data"]["leaderboard"][0]["username"], "player9");
        assert_eq!(value["timestamp"], "2026-03-01T12:00:00.000Z");
        assert_eq!(value["triggered_by_user"], 9);
    }

    #[test]
    fn test_pong_envelope_has_no_timestamp() {
        let envelope = ServerEnvelope::bare(ServerEvent::Pong {
            message: "Connection alive".into(),
        });

        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({ "type": "pong", "data": { "message": "Connection alive" } })
        );
    }

    #[test]
    fn test_error_envelope_json_format() {
        let value =
            serde_json::to_value(ServerEnvelope::error("Invalid JSON format"))
                .unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["message"], "Invalid JSON format");
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_rank_change_json_format() {
        let envelope = ServerEnvelope::stamped(
            ServerEvent::RankChange {
                user_id: UserId(4),
                new_rank: 1,
                old_rank: None,
                improved: false,
            },
            at(),
        );

        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "rank_change");
        assert_eq!(value["data"]["new_rank"], 1);
        assert!(value["data"]["old_rank"].is_null());
        assert_eq!(value["data"]["improved"], false);
        assert!(value.get("triggered_by_user").is_none());
    }

    #[test]
    fn test_connection_established_json_format() {
        let envelope = ServerEnvelope::stamped(
            ServerEvent::ConnectionEstablished {
                message: "Connected to leaderboard updates".into(),
                current_leaderboard: LeaderboardSnapshot::new(vec![]),
                active_connections: 3,
            },
            at(),
        );

        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "connection_established");
        assert_eq!(value["data"]["active_connections"], 3);
        assert_eq!(value["data"]["current_leaderboard"]["total_entries"], 0);
    }

    #[test]
    fn test_client_request_json_format() {
        let ping = serde_json::to_value(ClientRequest::Ping).unwrap();
        assert_eq!(ping, json!({ "type": "ping" }));

        let sub = serde_json::to_value(ClientRequest::SubscribeUserUpdates {
            user_id: UserId(5),
        })
        .unwrap();
        assert_eq!(
            sub,
            json!({
                "type": "subscribe_user_updates",
                "data": { "user_id": 5 }
            })
        );
    }
}
