//! Game use cases wired to leaderboard notifications.
//!
//! [`GameApi`] is what a front end (HTTP routes, a CLI, the demo) calls.
//! It delegates the rules to [`GameService`] and, after a successful stop,
//! publishes the follow-up events:
//!
//! 1. `leaderboard_update` to every leaderboard subscriber
//! 2. `new_high_score` if the game is the player's personal best *and* at
//!    least as good as the best on the board
//! 3. `rank_change` to the player's own connections if their position moved
//!
//! All three are best-effort. The score card is returned whether or not
//! any of them could be delivered.

use timeright_leaderboard::LeaderboardNotifier;
use timeright_protocol::{LeaderboardEntry, SessionId, UserId};
use timeright_session::{
    GameError, GameService, GameSession, GameStore, ScoreCard, UserStats,
};
use timeright_transport::Connection;

pub struct GameApi<R, C> {
    games: GameService<R>,
    notifier: LeaderboardNotifier<R, C>,
}

impl<R, C> Clone for GameApi<R, C> {
    fn clone(&self) -> Self {
        Self {
            games: self.games.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<R: GameStore, C: Connection> GameApi<R, C> {
    pub fn new(
        games: GameService<R>,
        notifier: LeaderboardNotifier<R, C>,
    ) -> Self {
        Self { games, notifier }
    }

    pub fn games(&self) -> &GameService<R> {
        &self.games
    }

    pub fn notifier(&self) -> &LeaderboardNotifier<R, C> {
        &self.notifier
    }

    pub async fn start_game(
        &self,
        user_id: UserId,
    ) -> Result<GameSession, GameError> {
        self.games.start_game(user_id).await
    }

    /// Stops a game, scores it and publishes the resulting events.
    pub async fn stop_game(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<ScoreCard, GameError> {
        let old_rank =
            self.games.rank_of(user_id).await.unwrap_or_else(|e| {
                tracing::warn!(%user_id, error = %e, "rank before stop failed");
                None
            });

        let session = self.games.stop_game(session_id, user_id).await?;
        let card = self.games.score_card(&session).ok_or_else(|| {
            GameError::InvalidState(format!(
                "session {session_id} did not complete"
            ))
        })?;

        self.publish_completion(user_id, card.deviation_ms, old_rank).await;
        Ok(card)
    }

    pub async fn get_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<GameSession>, GameError> {
        self.games.get_history(user_id, limit).await
    }

    pub async fn recent_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<GameSession>, GameError> {
        self.games.recent_history(user_id).await
    }

    pub async fn get_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<GameSession>, GameError> {
        self.games.get_active_session(user_id).await
    }

    pub async fn get_leaderboard(
        &self,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, GameError> {
        self.games.get_leaderboard(limit).await
    }

    pub async fn expire_old_sessions(&self) -> Result<usize, GameError> {
        self.games.expire_old_sessions().await
    }

    pub async fn user_stats(
        &self,
        requester: UserId,
        user_id: UserId,
        limit: usize,
    ) -> Result<UserStats, GameError> {
        self.games.user_stats(requester, user_id, limit).await
    }

    async fn publish_completion(
        &self,
        user_id: UserId,
        deviation_ms: i64,
        old_rank: Option<u32>,
    ) {
        self.notifier.notify_leaderboard_update(Some(user_id)).await;

        if let Err(e) = self.announce_high_score(user_id, deviation_ms).await {
            tracing::warn!(%user_id, error = %e, "high score check failed");
        }
        if let Err(e) = self.announce_rank_change(user_id, old_rank).await {
            tracing::warn!(%user_id, error = %e, "rank change check failed");
        }
    }

    async fn announce_high_score(
        &self,
        user_id: UserId,
        deviation_ms: i64,
    ) -> Result<(), GameError> {
        if self.games.personal_best(user_id).await? != Some(deviation_ms) {
            return Ok(());
        }

        let top = self
            .games
            .get_leaderboard(self.games.config().leaderboard_top_count)
            .await?;
        let global_best =
            top.iter().map(|entry| entry.best_deviation_ms).min();
        if global_best.is_some_and(|best| deviation_ms > best) {
            return Ok(());
        }

        let username = self
            .games
            .username(user_id)
            .await?
            .unwrap_or_else(|| user_id.to_string());
        self.notifier
            .notify_new_high_score(user_id, &username, deviation_ms)
            .await;
        Ok(())
    }

    async fn announce_rank_change(
        &self,
        user_id: UserId,
        old_rank: Option<u32>,
    ) -> Result<(), GameError> {
        let Some(new_rank) = self.games.rank_of(user_id).await? else {
            return Ok(());
        };
        if old_rank != Some(new_rank) {
            self.notifier
                .notify_user_rank_change(user_id, new_rank, old_rank)
                .await;
        }
        Ok(())
    }
}
