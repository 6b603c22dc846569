//! Per-connection handler for the leaderboard push channel.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Resolve the owner from the upgrade query (`token=` or `user_id=`)
//!   2. Register under the `leaderboard` topic
//!   3. Send `connection_established` with the current board
//!   4. Loop: receive text frames → dispatch `ping` /
//!      `request_leaderboard` / `subscribe_user_updates`
//!
//! Malformed frames get an `error` reply and the loop continues. The loop
//! ends when the client closes, a receive fails, or a reply can't be sent.

use std::sync::Arc;

use timeright_leaderboard::{ConnectionRegistry, LEADERBOARD_TOPIC};
use timeright_protocol::{
    ClientRequest, ServerEnvelope, ServerEvent, UserId, encode_frame,
    parse_request,
};
use timeright_session::{GameStore, TokenService};
use timeright_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::TimerightError;
use crate::server::ServerState;

/// Reply body for `ping`.
pub const PONG_MESSAGE: &str = "Connection alive";

/// Drop guard that unregisters the connection when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, the async unregister runs in a spawned task.
struct RegistrationGuard<C: Connection> {
    conn_id: ConnectionId,
    registry: Arc<ConnectionRegistry<C>>,
}

impl<C: Connection> Drop for RegistrationGuard<C> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let registry = Arc::clone(&self.registry);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                registry.unregister(conn_id).await;
            });
        }
    }
}

/// Handles a single push-channel connection from accept to close.
pub(crate) async fn handle_connection<R, A>(
    conn: WebSocketConnection,
    state: Arc<ServerState<R, A>>,
) -> Result<(), TimerightError>
where
    R: GameStore,
    A: TokenService,
{
    let conn_id = conn.id();
    let owner = resolve_owner(&conn, state.tokens.as_ref()).await;
    let notifier = state.api.notifier();
    let registry = notifier.registry();

    let conn = Arc::new(conn);
    registry
        .register(Arc::clone(&conn), LEADERBOARD_TOPIC, owner)
        .await;
    let _guard = RegistrationGuard {
        conn_id,
        registry: Arc::clone(registry),
    };

    notifier.send_connection_status(&conn).await?;

    loop {
        let text = match conn.recv().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        match parse_request(&text) {
            Ok(ClientRequest::Ping) => {
                let pong = ServerEnvelope::bare(ServerEvent::Pong {
                    message: PONG_MESSAGE.to_owned(),
                });
                send_envelope(&conn, &pong).await?;
            }
            Ok(ClientRequest::RequestLeaderboard) => {
                notifier.send_connection_status(&conn).await?;
            }
            Ok(ClientRequest::SubscribeUserUpdates { user_id }) => {
                registry.subscribe_user(conn_id, user_id).await;
                let confirmed = ServerEnvelope::stamped(
                    ServerEvent::SubscriptionConfirmed {
                        message: format!(
                            "Subscribed to updates for user {}",
                            user_id.0
                        ),
                        user_id,
                    },
                    state.api.games().now(),
                );
                send_envelope(&conn, &confirmed).await?;
                tracing::debug!(%conn_id, %user_id, "user updates subscribed");
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "rejected client frame");
                let reply = ServerEnvelope::error(e.to_string());
                send_envelope(&conn, &reply).await?;
            }
        }
    }

    // _guard drops here → the connection is unregistered.
    Ok(())
}

/// Picks the owning user from the upgrade request's query string.
///
/// A `token` wins over `user_id`; an invalid token leaves the connection
/// anonymous rather than falling back.
async fn resolve_owner<A: TokenService>(
    conn: &WebSocketConnection,
    tokens: &A,
) -> Option<UserId> {
    if let Some(token) = conn.query_param("token") {
        return match tokens.verify(token).await {
            Ok(principal) => Some(principal.user_id),
            Err(e) => {
                tracing::debug!(
                    conn_id = %conn.id(),
                    error = %e,
                    "push channel token rejected"
                );
                None
            }
        };
    }
    conn.query_param("user_id")
        .and_then(|raw| raw.parse().ok())
        .map(UserId)
}

async fn send_envelope(
    conn: &WebSocketConnection,
    envelope: &ServerEnvelope,
) -> Result<(), TimerightError> {
    let text = encode_frame(envelope)?;
    conn.send(&text).await?;
    Ok(())
}
