//! Leaderboard notifications.
//!
//! Each `notify_*` method builds one frame and pushes it through the
//! [`ConnectionRegistry`]. They never return errors: the game flow that
//! triggers them must succeed regardless, so failures are logged here and
//! dropped.

use std::sync::Arc;

use timeright_protocol::{ServerEnvelope, ServerEvent, UserId, encode_frame};
use timeright_session::{GameService, GameStore, accuracy_percentage};
use timeright_transport::Connection;

use crate::{ConnectionRegistry, Delivery, LEADERBOARD_TOPIC, NotifyError};

/// Greeting carried by every `connection_established` frame.
pub const CONNECTED_MESSAGE: &str = "Connected to leaderboard updates";

/// Publishes leaderboard events to connected clients.
pub struct LeaderboardNotifier<R, C> {
    games: GameService<R>,
    registry: Arc<ConnectionRegistry<C>>,
}

impl<R, C> Clone for LeaderboardNotifier<R, C> {
    fn clone(&self) -> Self {
        Self {
            games: self.games.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: GameStore, C: Connection> LeaderboardNotifier<R, C> {
    pub fn new(
        games: GameService<R>,
        registry: Arc<ConnectionRegistry<C>>,
    ) -> Self {
        Self { games, registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry<C>> {
        &self.registry
    }

    pub fn games(&self) -> &GameService<R> {
        &self.games
    }

    /// Broadcasts the current top leaderboard to the leaderboard topic.
    pub async fn notify_leaderboard_update(
        &self,
        triggered_by: Option<UserId>,
    ) {
        match self.try_notify_leaderboard_update(triggered_by).await {
            Ok(delivery) => tracing::info!(
                triggered_by = ?triggered_by,
                delivered = delivery.delivered,
                "leaderboard update sent"
            ),
            Err(e) => {
                tracing::error!(error = %e, "leaderboard update not sent")
            }
        }
    }

    async fn try_notify_leaderboard_update(
        &self,
        triggered_by: Option<UserId>,
    ) -> Result<Delivery, NotifyError> {
        let snapshot = self.games.leaderboard_snapshot().await?;
        let envelope = ServerEnvelope::stamped(
            ServerEvent::LeaderboardUpdate(snapshot),
            self.games.now(),
        )
        .triggered_by(triggered_by);
        Ok(self
            .registry
            .broadcast_to_topic(LEADERBOARD_TOPIC, &envelope)
            .await?)
    }

    /// Announces a new global best to the leaderboard topic.
    ///
    /// The caller decides whether the score really is a new best.
    pub async fn notify_new_high_score(
        &self,
        user_id: UserId,
        username: &str,
        deviation_ms: i64,
    ) {
        let envelope = ServerEnvelope::stamped(
            ServerEvent::NewHighScore {
                user_id,
                username: username.to_owned(),
                deviation_ms,
                accuracy_percentage: accuracy_percentage(
                    deviation_ms as f64,
                    self.games.config().target_time_ms,
                ),
            },
            self.games.now(),
        );
        match self
            .registry
            .broadcast_to_topic(LEADERBOARD_TOPIC, &envelope)
            .await
        {
            Ok(_) => tracing::info!(
                %user_id,
                username,
                deviation_ms,
                "new high score sent"
            ),
            Err(e) => tracing::error!(
                %user_id,
                error = %e,
                "new high score not sent"
            ),
        }
    }

    /// Tells `user_id`'s own connections that their rank moved.
    pub async fn notify_user_rank_change(
        &self,
        user_id: UserId,
        new_rank: u32,
        old_rank: Option<u32>,
    ) {
        let envelope = ServerEnvelope::stamped(
            ServerEvent::RankChange {
                user_id,
                new_rank,
                old_rank,
                improved: old_rank.is_some_and(|old| new_rank < old),
            },
            self.games.now(),
        );
        match self.registry.send_to_owner(user_id, &envelope).await {
            Ok(delivery) => tracing::info!(
                %user_id,
                old_rank = ?old_rank,
                new_rank,
                delivered = delivery.delivered,
                "rank change sent"
            ),
            Err(e) => {
                tracing::error!(%user_id, error = %e, "rank change not sent")
            }
        }
    }

    /// Sends the `connection_established` frame to one connection.
    ///
    /// Unlike the broadcasts this reports failure, so the caller can drop
    /// a connection that can't even take its first frame.
    pub async fn send_connection_status(
        &self,
        conn: &C,
    ) -> Result<(), NotifyError> {
        let snapshot = self.games.leaderboard_snapshot().await?;
        let active_connections =
            self.registry.count(Some(LEADERBOARD_TOPIC)).await;
        let envelope = ServerEnvelope::stamped(
            ServerEvent::ConnectionEstablished {
                message: CONNECTED_MESSAGE.to_owned(),
                current_leaderboard: snapshot,
                active_connections,
            },
            self.games.now(),
        );
        let text = encode_frame(&envelope)?;
        conn.send(&text)
            .await
            .map_err(|e| NotifyError::Send(e.to_string()))
    }
}
