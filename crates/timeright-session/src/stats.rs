//! Per-user analytics.

use serde::Serialize;
use timeright_protocol::UserId;

use crate::{
    GameError, GameService, GameSession, GameStore, accuracy_percentage, round2,
};

/// Aggregate statistics for one player.
///
/// `total_games` and `completed_games` count the returned history window;
/// the deviation figures cover every completed game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub username: String,
    pub total_games: usize,
    pub completed_games: usize,
    pub avg_deviation_ms: Option<f64>,
    pub best_deviation_ms: Option<i64>,
    pub avg_accuracy: Option<f64>,
    pub games_history: Vec<GameSession>,
}

impl<R: GameStore> GameService<R> {
    /// Statistics for `user_id`, visible only to that user.
    ///
    /// # Errors
    /// - [`GameError::Authorization`]: `requester` is someone else
    /// - [`GameError::NotFound`]: the user is not registered
    pub async fn user_stats(
        &self,
        requester: UserId,
        user_id: UserId,
        limit: usize,
    ) -> Result<UserStats, GameError> {
        if requester != user_id {
            return Err(GameError::Authorization(
                "Can only view your own analytics".into(),
            ));
        }
        let user = self
            .store()
            .get_user(user_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("user {user_id}")))?;

        let games_history = self.get_history(user_id, limit).await?;
        let completed = self.store().get_completed_by_user(user_id).await?;
        let deviations: Vec<i64> =
            completed.iter().filter_map(GameSession::deviation_ms).collect();

        let average = (!deviations.is_empty()).then(|| {
            deviations.iter().sum::<i64>() as f64 / deviations.len() as f64
        });
        let target = self.config().target_time_ms;

        Ok(UserStats {
            user_id,
            username: user.username,
            total_games: games_history.len(),
            completed_games: games_history
                .iter()
                .filter(|s| s.is_completed())
                .count(),
            avg_deviation_ms: average.map(round2),
            best_deviation_ms: deviations.iter().copied().min(),
            avg_accuracy: average.map(|avg| accuracy_percentage(avg, target)),
            games_history,
        })
    }
}
