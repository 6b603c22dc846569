//! `TimerightServer` builder and server loop.
//!
//! This is the entry point for running a Time It Right server. It ties
//! together all the layers: transport → protocol → game rules →
//! leaderboard fan-out, and runs the periodic expiry sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use timeright_leaderboard::{
    ConnectionRegistry, DEFAULT_SEND_TIMEOUT, LeaderboardNotifier,
};
use timeright_session::{
    Clock, GameConfig, GameService, GameStore, SystemClock, TokenService,
};
use timeright_transport::{
    Transport, TransportError, WebSocketConnection, WebSocketTransport,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::handler::handle_connection;
use crate::{GameApi, TimerightError};

/// The only request path upgraded to the push channel.
pub const PUSH_CHANNEL_PATH: &str = "/ws/leaderboard";

/// Network and housekeeping settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Default: `127.0.0.1:8080`.
    pub bind_addr: String,
    /// How often lapsed sessions are swept. Default: 60 s.
    pub sweep_interval: Duration,
    /// How long one push frame may take before the peer is evicted.
    /// Default: 1 s.
    pub send_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            sweep_interval: Duration::from_secs(60),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Reads `TIMERIGHT_BIND`, `TIMERIGHT_SWEEP_SECS` and
    /// `TIMERIGHT_SEND_TIMEOUT_MS`, falling back to defaults for unset
    /// variables.
    pub fn from_env() -> Result<Self, TimerightError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with a caller-supplied lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TimerightError> {
        let mut config = Self::default();
        if let Some(addr) = lookup("TIMERIGHT_BIND") {
            config.bind_addr = addr;
        }
        if let Some(raw) = lookup("TIMERIGHT_SWEEP_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                TimerightError::Config(format!(
                    "TIMERIGHT_SWEEP_SECS has invalid value {raw:?}"
                ))
            })?;
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("TIMERIGHT_SEND_TIMEOUT_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                TimerightError::Config(format!(
                    "TIMERIGHT_SEND_TIMEOUT_MS has invalid value {raw:?}"
                ))
            })?;
            config.send_timeout = Duration::from_millis(millis);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TimerightError> {
        if self.sweep_interval.is_zero() {
            return Err(TimerightError::Config(
                "sweep_interval must be greater than zero".into(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(TimerightError::Config(
                "send_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<R, A> {
    pub(crate) api: GameApi<R, WebSocketConnection>,
    pub(crate) tokens: Arc<A>,
}

/// Builder for configuring and starting a Time It Right server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use timeright::prelude::*;
///
/// # async fn run() -> Result<(), TimerightError> {
/// let store = Arc::new(InMemoryStore::new());
/// let tokens = Arc::new(OpaqueTokenService::new());
/// let server = TimerightServer::<InMemoryStore, OpaqueTokenService>::builder()
///     .bind("0.0.0.0:8080")
///     .build(store, tokens)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TimerightServerBuilder {
    config: ServerConfig,
    game_config: GameConfig,
    clock: Arc<dyn Clock>,
}

impl TimerightServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            game_config: GameConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.config.sweep_interval = every;
        self
    }

    /// Sets how long a push frame may take before the peer is evicted.
    pub fn send_timeout(mut self, limit: Duration) -> Self {
        self.config.send_timeout = limit;
        self
    }

    /// Replaces the whole server configuration.
    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Sets the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the configuration, binds the listener and wires the
    /// layers together over `store` and `tokens`.
    pub async fn build<R: GameStore, A: TokenService>(
        self,
        store: Arc<R>,
        tokens: Arc<A>,
    ) -> Result<TimerightServer<R, A>, TimerightError> {
        self.config.validate()?;
        self.game_config.validate()?;

        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_path(PUSH_CHANNEL_PATH);

        let games = GameService::new(store, self.clock, self.game_config);
        let registry =
            ConnectionRegistry::with_send_timeout(self.config.send_timeout);
        let notifier =
            LeaderboardNotifier::new(games.clone(), Arc::new(registry));
        let state = Arc::new(ServerState {
            api: GameApi::new(games, notifier),
            tokens,
        });

        Ok(TimerightServer {
            transport,
            state,
            sweep_interval: self.config.sweep_interval,
        })
    }
}

impl Default for TimerightServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Time It Right server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct TimerightServer<R, A> {
    transport: WebSocketTransport,
    state: Arc<ServerState<R, A>>,
    sweep_interval: Duration,
}

impl<R: GameStore, A: TokenService> TimerightServer<R, A> {
    /// Creates a new builder.
    pub fn builder() -> TimerightServerBuilder {
        TimerightServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The game API sharing this server's store and connection registry.
    /// Games started and stopped through it notify push-channel clients.
    pub fn api(&self) -> &GameApi<R, WebSocketConnection> {
        &self.state.api
    }

    pub fn tokens(&self) -> &Arc<A> {
        &self.state.tokens
    }

    /// Runs the expiry sweeper and the accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), TimerightError> {
        tracing::info!(
            addr = ?self.local_addr().ok(),
            "Time It Right server running"
        );

        let _sweeper = spawn_sweeper(
            self.state.api.games().clone(),
            self.sweep_interval,
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e @ TransportError::Handshake(_)) => {
                    tracing::debug!(error = %e, "upgrade refused");
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Expires lapsed sessions every `every`, starting one period from now.
fn spawn_sweeper<R: GameStore>(
    games: GameService<R>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match games.expire_old_sessions().await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "sweeper expired sessions"),
                Err(e) => tracing::warn!(error = %e, "sweeper pass failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.send_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_server_config_from_lookup_overrides() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("TIMERIGHT_BIND", "0.0.0.0:9000"),
            ("TIMERIGHT_SWEEP_SECS", "5"),
            ("TIMERIGHT_SEND_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.send_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_server_config_zero_send_timeout_is_rejected() {
        let lookup = lookup_from(&[("TIMERIGHT_SEND_TIMEOUT_MS", "0")]);
        let result = ServerConfig::from_lookup(lookup);
        assert!(matches!(result, Err(TimerightError::Config(_))));
    }

    #[test]
    fn test_server_config_zero_sweep_is_rejected() {
        let lookup = lookup_from(&[("TIMERIGHT_SWEEP_SECS", "0")]);
        let result = ServerConfig::from_lookup(lookup);
        assert!(matches!(result, Err(TimerightError::Config(_))));
    }

    #[test]
    fn test_server_config_garbage_sweep_is_rejected() {
        let lookup = lookup_from(&[("TIMERIGHT_SWEEP_SECS", "soon")]);
        let result = ServerConfig::from_lookup(lookup);
        assert!(matches!(result, Err(TimerightError::Config(_))));
    }
}
