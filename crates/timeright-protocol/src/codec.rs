//! Converting between protocol types and JSON text frames.
//!
//! Outbound frames are encoded with `serde_json` straight from any
//! `Serialize` type. Inbound frames go through [`parse_request`], which
//! parses in two steps (JSON first, then the `type` tag) so the channel can
//! tell a malformed frame apart from a well-formed frame with an unknown
//! request type.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{ClientRequest, ProtocolError, UserId};

/// Serializes a value into a single-line JSON text frame.
///
/// # Errors
/// Returns [`ProtocolError::Encode`] if the value can't be represented as
/// JSON (e.g. a map with non-string keys).
pub fn encode_frame<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(ProtocolError::Encode)
}

/// Parses an inbound text frame into a [`ClientRequest`].
///
/// # Errors
/// - [`ProtocolError::InvalidJson`]: the frame is not JSON at all
/// - [`ProtocolError::UnknownType`]: `type` is missing or unrecognized
/// - [`ProtocolError::InvalidMessage`]: a known request lacks its payload
pub fn parse_request(text: &str) -> Result<ClientRequest, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

    let kind = value.get("type").and_then(Value::as_str).unwrap_or("");

    match kind {
        "ping" => Ok(ClientRequest::Ping),
        "request_leaderboard" => Ok(ClientRequest::RequestLeaderboard),
        "subscribe_user_updates" => {
            let user_id = value
                .get("data")
                .and_then(|data| data.get("user_id"))
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    ProtocolError::InvalidMessage(
                        "subscribe_user_updates requires data.user_id".into(),
                    )
                })?;
            Ok(ClientRequest::SubscribeUserUpdates {
                user_id: UserId(user_id),
            })
        }
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

/// Renders a timestamp as ISO-8601 UTC with millisecond precision and a
/// trailing `Z`, e.g. `2026-03-01T12:00:00.250Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
