//! The game session state machine.
//!
//! A session records one attempt to stop a timer at exactly the target
//! duration. It is created `Active`, and leaves that state exactly once:
//!
//! ```text
//! start() ──→ [Active] ──complete()──→ [Completed]   (terminal)
//!                 │
//!                 └──────expire()────→ [Expired]     (terminal)
//! ```
//!
//! Terminal sessions never change again. `stop_time`, `duration_ms` and
//! `deviation_ms` are written by `complete()` and nowhere else.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use timeright_protocol::{SessionId, UserId};

use crate::{GameError, accuracy_percentage};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    /// `true` for `Completed` and `Expired`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timing attempt by one user.
///
/// Fields are private so the lifecycle rules can't be bypassed; stores
/// persist and rehydrate sessions through serde or [`with_id`](Self::with_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    id: Option<SessionId>,
    user_id: UserId,
    start_time: DateTime<Utc>,
    stop_time: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    deviation_ms: Option<i64>,
    status: SessionStatus,
    created_at: DateTime<Utc>,
}

impl GameSession {
    /// Begins a new, not-yet-persisted session for `user_id` at `now`.
    pub fn start(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            start_time: now,
            stop_time: None,
            duration_ms: None,
            deviation_ms: None,
            status: SessionStatus::Active,
            created_at: now,
        }
    }

    /// Returns the session with its store-assigned identifier.
    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Stops the timer at `stop_time` and scores the attempt against
    /// `target_ms`.
    ///
    /// The duration is the elapsed time rounded to the nearest
    /// millisecond; the deviation is its absolute distance from the target.
    ///
    /// # Errors
    /// [`GameError::InvalidState`] unless the session is `Active`.
    pub fn complete(
        &mut self,
        stop_time: DateTime<Utc>,
        target_ms: i64,
    ) -> Result<(), GameError> {
        if self.status != SessionStatus::Active {
            return Err(GameError::InvalidState(format!(
                "cannot complete a session that is {}",
                self.status
            )));
        }

        let duration_ms = round_to_millis(stop_time - self.start_time);
        self.stop_time = Some(stop_time);
        self.duration_ms = Some(duration_ms);
        self.deviation_ms = Some((duration_ms - target_ms).abs());
        self.status = SessionStatus::Completed;
        Ok(())
    }

    /// Marks an `Active` session as `Expired`. Terminal sessions are left
    /// untouched.
    pub fn expire(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Expired;
        }
    }

    /// `true` when the session is `Active` and more than `ttl_minutes`
    /// have passed since it started.
    ///
    /// A TTL too large to represent as a duration never lapses.
    pub fn is_expired_by_policy(
        &self,
        now: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> bool {
        self.status == SessionStatus::Active
            && Duration::try_minutes(ttl_minutes)
                .is_some_and(|ttl| now - self.start_time > ttl)
    }

    /// Accuracy percentage for a completed session, `0.0` otherwise.
    pub fn accuracy_score(&self, target_ms: i64) -> f64 {
        match (self.status, self.deviation_ms) {
            (SessionStatus::Completed, Some(deviation)) => {
                accuracy_percentage(deviation as f64, target_ms)
            }
            _ => 0.0,
        }
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        self.stop_time
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    pub fn deviation_ms(&self) -> Option<i64> {
        self.deviation_ms
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

fn round_to_millis(elapsed: Duration) -> i64 {
    match elapsed.num_microseconds() {
        Some(micros) => (micros as f64 / 1000.0).round() as i64,
        None => elapsed.num_milliseconds(),
    }
}
