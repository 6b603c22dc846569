//! An in-process store for sessions and users.
//!
//! Everything lives in `BTreeMap`s behind a single async mutex, so each
//! repository call observes and mutates a consistent snapshot. That is
//! what makes the "one active session per user" check in [`create`]
//! atomic with the insert.
//!
//! [`create`]: SessionRepository::create

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use timeright_protocol::{SessionId, UserId};
use tokio::sync::Mutex;

use crate::{
    GameError, GameSession, LeaderboardStanding, SessionRepository,
    SessionStatus, UserRecord, UserRepository, round2,
};

/// Sessions and users held in memory. Ids start at 1.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: BTreeMap<SessionId, GameSession>,
    users: BTreeMap<UserId, UserRecord>,
    last_session_id: u64,
    last_user_id: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions in any state.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

impl SessionRepository for InMemoryStore {
    async fn create(
        &self,
        session: GameSession,
    ) -> Result<GameSession, GameError> {
        let mut state = self.state.lock().await;

        if let Some(id) = session.id() {
            return Err(GameError::InvalidState(format!(
                "session {id} is already persisted"
            )));
        }

        let user_id = session.user_id();
        if session.is_active()
            && state
                .sessions
                .values()
                .any(|s| s.user_id() == user_id && s.is_active())
        {
            return Err(GameError::Conflict(format!(
                "user {user_id} already has an active session"
            )));
        }

        state.last_session_id += 1;
        let id = SessionId(state.last_session_id);
        let stored = session.with_id(id);
        state.sessions.insert(id, stored.clone());

        tracing::debug!(session_id = %id, %user_id, "session row inserted");
        Ok(stored)
    }

    async fn get_by_id(
        &self,
        id: SessionId,
    ) -> Result<Option<GameSession>, GameError> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn get_active_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<GameSession>, GameError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .find(|s| s.user_id() == user_id && s.is_active())
            .cloned())
    }

    async fn get_by_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<GameSession>, GameError> {
        let state = self.state.lock().await;
        let mut sessions = newest_first(
            state.sessions.values().filter(|s| s.user_id() == user_id),
        );
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn get_completed_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<GameSession>, GameError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .sessions
                .values()
                .filter(|s| s.user_id() == user_id && s.is_completed()),
        ))
    }

    async fn update(
        &self,
        session: GameSession,
    ) -> Result<GameSession, GameError> {
        let id = session.id().ok_or_else(|| {
            GameError::InvalidState(
                "cannot update a session that was never persisted".into(),
            )
        })?;

        let mut state = self.state.lock().await;
        let stored = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| GameError::NotFound(format!("session {id}")))?;

        if stored.user_id() != session.user_id() {
            return Err(GameError::InvalidState(format!(
                "session {id} cannot change owner"
            )));
        }
        if stored.status().is_terminal() && *stored != session {
            return Err(GameError::InvalidState(format!(
                "session {id} is already {}",
                stored.status()
            )));
        }

        *stored = session.clone();
        Ok(session)
    }

    async fn expire_old_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, GameError> {
        let mut state = self.state.lock().await;
        let mut expired = 0;
        for session in state.sessions.values_mut() {
            if session.is_active() && session.start_time() < cutoff {
                session.expire();
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn get_leaderboard(
        &self,
        limit: usize,
    ) -> Result<Vec<LeaderboardStanding>, GameError> {
        let state = self.state.lock().await;

        // user -> (sum, best, count)
        let mut totals: BTreeMap<UserId, (i64, i64, u64)> = BTreeMap::new();
        for session in state.sessions.values() {
            if session.status() != SessionStatus::Completed {
                continue;
            }
            let Some(deviation) = session.deviation_ms() else {
                continue;
            };
            let entry = totals
                .entry(session.user_id())
                .or_insert((0, i64::MAX, 0));
            entry.0 += deviation;
            entry.1 = entry.1.min(deviation);
            entry.2 += 1;
        }

        let mut rows: Vec<(UserId, f64, i64, u64)> = totals
            .into_iter()
            .map(|(user_id, (sum, best, count))| {
                (user_id, sum as f64 / count as f64, best, count)
            })
            .collect();
        rows.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(rows
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(idx, (user_id, avg, best, count))| LeaderboardStanding {
                rank: idx as u32 + 1,
                user_id,
                username: state.users.get(&user_id).map(|u| u.username.clone()),
                avg_deviation_ms: round2(avg),
                best_deviation_ms: best,
                total_games: count,
            })
            .collect())
    }
}

impl UserRepository for InMemoryStore {
    async fn create_user(
        &self,
        username: String,
        email: String,
        created_at: DateTime<Utc>,
    ) -> Result<UserRecord, GameError> {
        let mut state = self.state.lock().await;

        if state.users.values().any(|u| u.username == username) {
            return Err(GameError::Conflict("Username already exists".into()));
        }
        if state.users.values().any(|u| u.email == email) {
            return Err(GameError::Conflict("Email already exists".into()));
        }

        state.last_user_id += 1;
        let user = UserRecord {
            id: UserId(state.last_user_id),
            username,
            email,
            created_at,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(
        &self,
        id: UserId,
    ) -> Result<Option<UserRecord>, GameError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, GameError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserRecord>, GameError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }
}

/// Clones and sorts by `created_at` descending, newer ids first on ties.
fn newest_first<'a>(
    sessions: impl Iterator<Item = &'a GameSession>,
) -> Vec<GameSession> {
    let mut sessions: Vec<GameSession> = sessions.cloned().collect();
    sessions.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
    sessions
}

#[cfg(test)]
mod tests {
    //! Unit tests for `InMemoryStore`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn uid(id: u64) -> UserId {
        UserId(id)
    }

    /// Inserts a completed session for `user` with the given deviation.
    async fn completed(
        store: &InMemoryStore,
        user: UserId,
        deviation_ms: i64,
    ) -> GameSession {
        let session =
            store.create(GameSession::start(user, t0())).await.unwrap();
        let mut session = session;
        session
            .complete(
                t0() + Duration::milliseconds(10_000 + deviation_ms),
                10_000,
            )
            .unwrap();
        store.update(session).await.unwrap()
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = InMemoryStore::new();
        let a = store.create(GameSession::start(uid(1), t0())).await.unwrap();
        let b = store.create(GameSession::start(uid(2), t0())).await.unwrap();
        assert_eq!(a.id(), Some(SessionId(1)));
        assert_eq!(b.id(), Some(SessionId(2)));
    }

    #[tokio::test]
    async fn test_create_second_active_for_user_returns_conflict() {
        let store = InMemoryStore::new();
        store.create(GameSession::start(uid(1), t0())).await.unwrap();

        let result = store.create(GameSession::start(uid(1), t0())).await;
        assert!(matches!(result, Err(GameError::Conflict(_))));
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_after_completion_succeeds() {
        let store = InMemoryStore::new();
        completed(&store, uid(1), 5).await;
        assert!(store.create(GameSession::start(uid(1), t0())).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_persisted_session_returns_invalid_state() {
        let store = InMemoryStore::new();
        let session =
            store.create(GameSession::start(uid(1), t0())).await.unwrap();
        let result = store.create(session).await;
        assert!(matches!(result, Err(GameError::InvalidState(_))));
    }

    // =====================================================================
    // update()
    // =====================================================================

    #[tokio::test]
    async fn test_update_unknown_session_returns_not_found() {
        let store = InMemoryStore::new();
        let ghost = GameSession::start(uid(1), t0()).with_id(SessionId(99));
        let result = store.update(ghost).await;
        assert!(matches!(result, Err(GameError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_terminal_row_with_changes_returns_invalid_state() {
        let store = InMemoryStore::new();
        let session =
            store.create(GameSession::start(uid(1), t0())).await.unwrap();
        let mut expired = session.clone();
        expired.expire();
        store.update(expired).await.unwrap();

        // A stale copy still thinks it is active and tries to complete.
        let mut stale = session;
        stale.complete(t0() + Duration::seconds(10), 10_000).unwrap();
        let result = store.update(stale).await;
        assert!(matches!(result, Err(GameError::InvalidState(_))));

        let stored = store.get_by_id(SessionId(1)).await.unwrap().unwrap();
        assert_eq!(stored.status(), SessionStatus::Expired);
    }

    // =====================================================================
    // queries
    // =====================================================================

    #[tokio::test]
    async fn test_get_by_user_returns_newest_first_with_limit() {
        let store = InMemoryStore::new();
        for offset in 0..3 {
            let mut s = store
                .create(GameSession::start(
                    uid(1),
                    t0() + Duration::minutes(offset),
                ))
                .await
                .unwrap();
            s.expire();
            store.update(s).await.unwrap();
        }
        store.create(GameSession::start(uid(2), t0())).await.unwrap();

        let history = store.get_by_user(uid(1), 2).await.unwrap();
        let ids: Vec<_> = history.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![Some(SessionId(3)), Some(SessionId(2))]);
    }

    #[tokio::test]
    async fn test_get_active_by_user_ignores_terminal_sessions() {
        let store = InMemoryStore::new();
        completed(&store, uid(1), 0).await;
        assert!(store.get_active_by_user(uid(1)).await.unwrap().is_none());

        store.create(GameSession::start(uid(1), t0())).await.unwrap();
        assert!(store.get_active_by_user(uid(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expire_old_sessions_only_touches_active_before_cutoff() {
        let store = InMemoryStore::new();
        store.create(GameSession::start(uid(1), t0())).await.unwrap();
        store
            .create(GameSession::start(uid(2), t0() + Duration::minutes(10)))
            .await
            .unwrap();
        completed(&store, uid(3), 0).await;

        let count = store
            .expire_old_sessions(t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(count, 1);

        let first = store.get_by_id(SessionId(1)).await.unwrap().unwrap();
        let second = store.get_by_id(SessionId(2)).await.unwrap().unwrap();
        let third = store.get_by_id(SessionId(3)).await.unwrap().unwrap();
        assert_eq!(first.status(), SessionStatus::Expired);
        assert_eq!(second.status(), SessionStatus::Active);
        assert_eq!(third.status(), SessionStatus::Completed);
    }

    // =====================================================================
    // get_leaderboard()
    // =====================================================================

    #[tokio::test]
    async fn test_get_leaderboard_orders_by_average_deviation() {
        let store = InMemoryStore::new();
        completed(&store, uid(1), 500).await;
        completed(&store, uid(2), 50).await;

        let board = store.get_leaderboard(10).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, uid(2));
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].avg_deviation_ms, 50.0);
        assert_eq!(board[1].user_id, uid(1));
        assert_eq!(board[1].rank, 2);
    }

    #[tokio::test]
    async fn test_get_leaderboard_aggregates_per_user() {
        let store = InMemoryStore::new();
        completed(&store, uid(1), 10).await;
        completed(&store, uid(1), 21).await;
        store.create(GameSession::start(uid(1), t0())).await.unwrap();

        let board = store.get_leaderboard(10).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].total_games, 2);
        assert_eq!(board[0].best_deviation_ms, 10);
        assert_eq!(board[0].avg_deviation_ms, 15.5);
    }

    #[tokio::test]
    async fn test_get_leaderboard_ties_break_by_user_id() {
        let store = InMemoryStore::new();
        completed(&store, uid(7), 40).await;
        completed(&store, uid(3), 40).await;

        let board = store.get_leaderboard(10).await.unwrap();
        assert_eq!(board[0].user_id, uid(3));
        assert_eq!(board[1].user_id, uid(7));
        assert_eq!(board[1].rank, 2);
    }

    #[tokio::test]
    async fn test_get_leaderboard_respects_limit_and_usernames() {
        let store = InMemoryStore::new();
        let alice = store
            .create_user("alice".into(), "a@x.io".into(), t0())
            .await
            .unwrap();
        completed(&store, alice.id, 1).await;
        completed(&store, uid(50), 2).await;

        let board = store.get_leaderboard(1).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].username.as_deref(), Some("alice"));

        let board = store.get_leaderboard(5).await.unwrap();
        assert_eq!(board[1].username, None);
    }

    #[tokio::test]
    async fn test_get_leaderboard_empty_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.get_leaderboard(10).await.unwrap().is_empty());
    }

    // =====================================================================
    // users
    // =====================================================================

    #[tokio::test]
    async fn test_create_user_duplicate_username_returns_conflict() {
        let store = InMemoryStore::new();
        store
            .create_user("alice".into(), "a@x.io".into(), t0())
            .await
            .unwrap();
        let result = store
            .create_user("alice".into(), "other@x.io".into(), t0())
            .await;
        assert!(matches!(result, Err(GameError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_get_user_by_email_finds_record() {
        let store = InMemoryStore::new();
        let user = store
            .create_user("bob".into(), "b@x.io".into(), t0())
            .await
            .unwrap();
        let found = store.get_user_by_email("b@x.io").await.unwrap();
        assert_eq!(found, Some(user));
        assert!(store.get_user_by_username("nobody").await.unwrap().is_none());
    }
}
