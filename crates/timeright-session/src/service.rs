//! Game use cases.
//!
//! [`GameService`] is the only place the game rules are enforced end to
//! end: one active session per user, ownership on stop, lazy expiry of
//! lapsed sessions, and leaderboard reads.
//!
//! ## Lifecycle
//!
//! ```text
//! start_game() ──→ [Active] ──stop_game()──→ [Completed] ──→ board
//!                     │
//!                     ├── stop after TTL ──→ [Expired] + Err(Expired)
//!                     ├── start after TTL ─→ [Expired], new session
//!                     └── sweeper ─────────→ [Expired]
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use timeright_protocol::{
    LeaderboardEntry, LeaderboardSnapshot, SessionId, UserId,
};

use crate::{Clock, GameConfig, GameError, GameSession, GameStore, ScoreCard};

/// Start, stop and query games over a [`GameStore`].
///
/// Cheap to clone: the store and clock are shared.
pub struct GameService<R> {
    store: Arc<R>,
    clock: Arc<dyn Clock>,
    config: GameConfig,
}

impl<R> Clone for GameService<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<R: GameStore> GameService<R> {
    pub fn new(
        store: Arc<R>,
        clock: Arc<dyn Clock>,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The current time according to the service's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Starts a new game for `user_id`.
    ///
    /// An existing active session that has outlived the TTL is expired
    /// first and does not block the new one.
    ///
    /// # Errors
    /// [`GameError::Conflict`] if the user still has a live active session.
    pub async fn start_game(
        &self,
        user_id: UserId,
    ) -> Result<GameSession, GameError> {
        let now = self.clock.now();
        let ttl = self.config.session_expire_minutes;

        if let Some(mut existing) =
            self.store.get_active_by_user(user_id).await?
        {
            if !existing.is_expired_by_policy(now, ttl) {
                return Err(GameError::Conflict(format!(
                    "user {user_id} already has an active session"
                )));
            }
            existing.expire();
            let existing = self.store.update(existing).await?;
            tracing::info!(
                %user_id,
                session_id = ?existing.id(),
                "lapsed session expired before new start"
            );
        }

        let session =
            self.store.create(GameSession::start(user_id, now)).await?;
        tracing::info!(%user_id, session_id = ?session.id(), "game started");
        Ok(session)
    }

    /// Stops `session_id` on behalf of `user_id` and records the result.
    ///
    /// # Errors
    /// - [`GameError::NotFound`]: no such session
    /// - [`GameError::Authorization`]: the session belongs to someone else
    /// - [`GameError::InvalidState`]: the session is not active
    /// - [`GameError::Expired`]: the TTL lapsed; the session is now
    ///   `Expired`
    pub async fn stop_game(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<GameSession, GameError> {
        let mut session = self
            .store
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| {
                GameError::NotFound(format!("session {session_id}"))
            })?;

        if session.user_id() != user_id {
            return Err(GameError::Authorization(format!(
                "session {session_id} does not belong to user {user_id}"
            )));
        }
        if !session.is_active() {
            return Err(GameError::InvalidState(format!(
                "session {session_id} is not active ({})",
                session.status()
            )));
        }

        let now = self.clock.now();
        let ttl = self.config.session_expire_minutes;
        if session.is_expired_by_policy(now, ttl) {
            session.expire();
            self.store.update(session).await?;
            tracing::info!(
                %session_id,
                %user_id,
                "stop attempted after session lapsed"
            );
            return Err(GameError::Expired(session_id));
        }

        session.complete(now, self.config.target_time_ms)?;
        let session = self.store.update(session).await?;

        tracing::info!(
            %session_id,
            %user_id,
            duration_ms = session.duration_ms(),
            deviation_ms = session.deviation_ms(),
            "game completed"
        );
        Ok(session)
    }

    /// The score card for a completed session.
    pub fn score_card(&self, session: &GameSession) -> Option<ScoreCard> {
        ScoreCard::from_session(session, self.config.target_time_ms)
    }

    /// Up to `limit` of the user's sessions, newest first.
    pub async fn get_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<GameSession>, GameError> {
        self.store.get_by_user(user_id, limit).await
    }

    /// [`get_history`](Self::get_history) with the configured
    /// `history_limit`.
    pub async fn recent_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<GameSession>, GameError> {
        self.get_history(user_id, self.config.history_limit).await
    }

    /// The user's active session. A lapsed one is expired and reported as
    /// absent.
    pub async fn get_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<GameSession>, GameError> {
        let Some(mut session) = self.store.get_active_by_user(user_id).await?
        else {
            return Ok(None);
        };
        let ttl = self.config.session_expire_minutes;
        if session.is_expired_by_policy(self.clock.now(), ttl) {
            session.expire();
            self.store.update(session).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Expires every active session older than `ttl_minutes`.
    ///
    /// # Errors
    /// [`GameError::InvalidInput`] when the cutoff `now - ttl_minutes`
    /// falls outside the representable time range.
    pub async fn expire_stale_sessions(
        &self,
        ttl_minutes: i64,
    ) -> Result<usize, GameError> {
        let cutoff = Duration::try_minutes(ttl_minutes)
            .and_then(|ttl| self.clock.now().checked_sub_signed(ttl))
            .ok_or_else(|| {
                GameError::InvalidInput(format!(
                    "session TTL of {ttl_minutes} minutes is out of range"
                ))
            })?;
        let count = self.store.expire_old_sessions(cutoff).await?;
        if count > 0 {
            tracing::info!(count, ttl_minutes, "stale sessions expired");
        }
        Ok(count)
    }

    /// [`expire_stale_sessions`](Self::expire_stale_sessions) with the
    /// configured TTL.
    pub async fn expire_old_sessions(&self) -> Result<usize, GameError> {
        self.expire_stale_sessions(self.config.session_expire_minutes).await
    }

    /// Top `limit` players, with accuracy against the configured target.
    pub async fn get_leaderboard(
        &self,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, GameError> {
        let target = self.config.target_time_ms;
        Ok(self
            .store
            .get_leaderboard(limit)
            .await?
            .into_iter()
            .map(|standing| standing.into_entry(target))
            .collect())
    }

    /// The broadcast leaderboard: top `leaderboard_top_count` players.
    pub async fn leaderboard_snapshot(
        &self,
    ) -> Result<LeaderboardSnapshot, GameError> {
        let entries =
            self.get_leaderboard(self.config.leaderboard_top_count).await?;
        Ok(LeaderboardSnapshot::new(entries))
    }

    /// The user's lowest deviation across completed games.
    pub async fn personal_best(
        &self,
        user_id: UserId,
    ) -> Result<Option<i64>, GameError> {
        Ok(self
            .store
            .get_completed_by_user(user_id)
            .await?
            .iter()
            .filter_map(GameSession::deviation_ms)
            .min())
    }

    /// The user's 1-based position on the full leaderboard.
    pub async fn rank_of(
        &self,
        user_id: UserId,
    ) -> Result<Option<u32>, GameError> {
        Ok(self
            .store
            .get_leaderboard(usize::MAX)
            .await?
            .into_iter()
            .find(|standing| standing.user_id == user_id)
            .map(|standing| standing.rank))
    }

    /// The registered username, if the user exists.
    pub async fn username(
        &self,
        user_id: UserId,
    ) -> Result<Option<String>, GameError> {
        Ok(self.store.get_user(user_id).await?.map(|user| user.username))
    }
}
