//! Runs a Time It Right server on `TIMERIGHT_BIND` (default
//! `127.0.0.1:8080`) with an in-memory store.
//!
//! A demo player plays a few rounds in the background so that clients
//! connecting to `ws://<addr>/ws/leaderboard` see live updates.

use std::sync::Arc;
use std::time::Duration;

use timeright::prelude::*;

/// How long the demo player holds each round, in milliseconds.
const DEMO_ROUNDS_MS: [u64; 3] = [9_400, 10_250, 10_030];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let server_config = ServerConfig::from_env()?;
    let game_config = GameConfig::from_env()?;

    let store = Arc::new(InMemoryStore::new());
    let tokens = Arc::new(OpaqueTokenService::new());

    let server = TimerightServer::<InMemoryStore, OpaqueTokenService>::builder()
        .server_config(server_config)
        .game_config(game_config)
        .build(Arc::clone(&store), Arc::clone(&tokens))
        .await?;

    let accounts = Accounts::new(store, tokens, Arc::new(SystemClock));
    let demo = accounts.register("demo_player", "demo@example.com").await?;
    tracing::info!(
        user_id = %demo.user.id,
        token = %demo.token,
        "demo player registered"
    );

    let api = server.api().clone();
    let player = demo.user.id;
    tokio::spawn(async move {
        for hold_ms in DEMO_ROUNDS_MS {
            if let Err(e) = play_round(&api, player, hold_ms).await {
                tracing::warn!(error = %e, "demo round failed");
            }
        }
    });

    server.run().await?;
    Ok(())
}

async fn play_round<R: GameStore, C: Connection>(
    api: &GameApi<R, C>,
    player: UserId,
    hold_ms: u64,
) -> Result<(), GameError> {
    let session = api.start_game(player).await?;
    let Some(session_id) = session.id() else {
        return Ok(());
    };
    tokio::time::sleep(Duration::from_millis(hold_ms)).await;

    let card = api.stop_game(session_id, player).await?;
    tracing::info!(
        deviation_ms = card.deviation_ms,
        grade = %card.grade,
        "{}",
        card.message
    );
    Ok(())
}
