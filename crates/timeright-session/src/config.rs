//! Game rules configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::GameError;

/// Upper bound for `session_expire_minutes`: one hundred years.
pub const MAX_SESSION_EXPIRE_MINUTES: i64 = 525_600 * 100;

/// Tunable game rules.
///
/// Construct with `GameConfig::default()` and override the fields you care
/// about, or read them from the environment with [`GameConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// The duration players aim for. Default: 10 000 ms.
    pub target_time_ms: i64,

    /// How long an `Active` session may run before it lapses.
    /// Default: 30 minutes.
    pub session_expire_minutes: i64,

    /// Number of rows in the broadcast leaderboard. Default: 10.
    pub leaderboard_top_count: usize,

    /// Page size of [`GameService::recent_history`]. Default: 10.
    ///
    /// [`GameService::recent_history`]: crate::GameService::recent_history
    pub history_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            target_time_ms: 10_000,
            session_expire_minutes: 30,
            leaderboard_top_count: 10,
            history_limit: 10,
        }
    }
}

impl GameConfig {
    /// Reads `TARGET_TIME_MS`, `SESSION_EXPIRE_MINUTES`,
    /// `LEADERBOARD_TOP_COUNT` and `HISTORY_LIMIT`, falling back to
    /// defaults for unset keys.
    ///
    /// # Errors
    /// [`GameError::InvalidInput`] when a variable is set but unparsable or
    /// out of range.
    pub fn from_env() -> Result<Self, GameError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with a caller-supplied lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, GameError> {
        let defaults = Self::default();
        let config = Self {
            target_time_ms: parse_var(
                &lookup,
                "TARGET_TIME_MS",
                defaults.target_time_ms,
            )?,
            session_expire_minutes: parse_var(
                &lookup,
                "SESSION_EXPIRE_MINUTES",
                defaults.session_expire_minutes,
            )?,
            leaderboard_top_count: parse_var(
                &lookup,
                "LEADERBOARD_TOP_COUNT",
                defaults.leaderboard_top_count,
            )?,
            history_limit: parse_var(
                &lookup,
                "HISTORY_LIMIT",
                defaults.history_limit,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.target_time_ms <= 0 {
            return Err(GameError::InvalidInput(
                "target_time_ms must be positive".into(),
            ));
        }
        if self.session_expire_minutes <= 0 {
            return Err(GameError::InvalidInput(
                "session_expire_minutes must be positive".into(),
            ));
        }
        if self.session_expire_minutes > MAX_SESSION_EXPIRE_MINUTES {
            return Err(GameError::InvalidInput(format!(
                "session_expire_minutes must be at most \
                 {MAX_SESSION_EXPIRE_MINUTES}"
            )));
        }
        if self.leaderboard_top_count == 0 {
            return Err(GameError::InvalidInput(
                "leaderboard_top_count must be at least 1".into(),
            ));
        }
        if self.history_limit == 0 {
            return Err(GameError::InvalidInput(
                "history_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, GameError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            GameError::InvalidInput(format!("{key} has invalid value {raw:?}"))
        }),
    }
}
