//! Persistence seams for sessions and users.
//!
//! The use cases in [`GameService`](crate::GameService) only talk to
//! storage through these traits. [`InMemoryStore`](crate::InMemoryStore)
//! implements both; a SQL-backed store would too.
//!
//! Methods return `impl Future + Send` (rather than using `async fn` in the
//! trait declaration) so the futures can be driven from spawned tasks.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeright_protocol::{LeaderboardEntry, SessionId, UserId};

use crate::{GameError, GameSession, accuracy_percentage};

/// Storage for [`GameSession`]s.
pub trait SessionRepository: Send + Sync + 'static {
    /// Persists a new session and assigns its id.
    ///
    /// # Errors
    /// [`GameError::Conflict`] if the session is `Active` and the user
    /// already has an `Active` session. Implementations must check and
    /// insert atomically.
    fn create(
        &self,
        session: GameSession,
    ) -> impl Future<Output = Result<GameSession, GameError>> + Send;

    fn get_by_id(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<GameSession>, GameError>> + Send;

    /// The user's single `Active` session, if any.
    fn get_active_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<GameSession>, GameError>> + Send;

    /// Up to `limit` of the user's sessions, newest `created_at` first.
    fn get_by_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<GameSession>, GameError>> + Send;

    /// Every completed session of the user, newest first.
    fn get_completed_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<GameSession>, GameError>> + Send;

    /// Persists a mutated session.
    ///
    /// # Errors
    /// - [`GameError::NotFound`] if no row exists for the session's id
    /// - [`GameError::InvalidState`] if the stored row is terminal and the
    ///   update would change it
    fn update(
        &self,
        session: GameSession,
    ) -> impl Future<Output = Result<GameSession, GameError>> + Send;

    /// Moves every `Active` session that started before `cutoff` to
    /// `Expired`. Returns how many were changed.
    fn expire_old_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<usize, GameError>> + Send;

    /// Top `limit` users by average deviation over completed sessions.
    fn get_leaderboard(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardStanding>, GameError>>
    + Send;
}

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Storage for [`UserRecord`]s.
pub trait UserRepository: Send + Sync + 'static {
    /// Inserts a user and assigns its id.
    ///
    /// # Errors
    /// [`GameError::Conflict`] when the username or email is taken.
    fn create_user(
        &self,
        username: String,
        email: String,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<UserRecord, GameError>> + Send;

    fn get_user(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<UserRecord>, GameError>> + Send;

    fn get_user_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, GameError>> + Send;

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, GameError>> + Send;
}

/// A store that holds both sessions and users.
pub trait GameStore: SessionRepository + UserRepository {}

impl<T: SessionRepository + UserRepository> GameStore for T {}

/// One leaderboard row as a store computes it.
///
/// Ranks are 1-based and contiguous; `avg_deviation_ms` is rounded to two
/// decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardStanding {
    pub rank: u32,
    pub user_id: UserId,
    pub username: Option<String>,
    pub avg_deviation_ms: f64,
    pub best_deviation_ms: i64,
    pub total_games: u64,
}

impl LeaderboardStanding {
    /// Adds the accuracy derived from the average deviation.
    pub fn into_entry(self, target_ms: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            rank: self.rank,
            user_id: self.user_id,
            username: self.username,
            avg_deviation_ms: self.avg_deviation_ms,
            best_deviation_ms: self.best_deviation_ms,
            total_games: self.total_games,
            accuracy_percentage: accuracy_percentage(
                self.avg_deviation_ms,
                target_ms,
            ),
        }
    }
}
