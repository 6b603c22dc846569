//! Player registration.

use std::sync::Arc;

use crate::{Clock, GameError, TokenService, UserRecord, UserRepository};

/// A freshly registered player and their first access token.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: UserRecord,
    pub token: String,
}

/// Registration and token resolution over a [`UserRepository`].
pub struct Accounts<R, T> {
    store: Arc<R>,
    tokens: Arc<T>,
    clock: Arc<dyn Clock>,
}

impl<R, T> Clone for Accounts<R, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tokens: Arc::clone(&self.tokens),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R: UserRepository, T: TokenService> Accounts<R, T> {
    pub fn new(store: Arc<R>, tokens: Arc<T>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tokens,
            clock,
        }
    }

    /// Creates a user and issues them a token.
    ///
    /// # Errors
    /// - [`GameError::Conflict`]: username or email already registered
    /// - [`GameError::InvalidInput`]: username is not 3–50 characters of
    ///   letters, digits and underscores, or the email is malformed
    pub async fn register(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Registration, GameError> {
        if self.store.get_user_by_username(username).await?.is_some() {
            return Err(GameError::Conflict("Username already exists".into()));
        }
        if self.store.get_user_by_email(email).await?.is_some() {
            return Err(GameError::Conflict("Email already exists".into()));
        }
        validate_username(username)?;
        validate_email(email)?;

        let user = self
            .store
            .create_user(
                username.to_owned(),
                email.to_owned(),
                self.clock.now(),
            )
            .await?;
        let token = self.tokens.issue(user.id, &user.username).await?;

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            "user registered"
        );
        Ok(Registration { user, token })
    }

    /// Resolves a token to the stored user it was issued for.
    pub async fn authenticate(
        &self,
        token: &str,
    ) -> Result<UserRecord, GameError> {
        let principal = self.tokens.verify(token).await?;
        let user_id = principal.user_id;
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("user {user_id}")))
    }
}

fn validate_username(username: &str) -> Result<(), GameError> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(GameError::InvalidInput(
            "Username must be between 3 and 50 characters".into(),
        ));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GameError::InvalidInput(
            "Username can only contain letters, numbers, and underscores"
                .into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), GameError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split_once('.').is_some_and(|(host, tld)| {
                    !host.is_empty() && !tld.is_empty()
                })
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GameError::InvalidInput("Invalid email address".into()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{InMemoryStore, ManualClock, OpaqueTokenService};

    fn accounts() -> Accounts<InMemoryStore, OpaqueTokenService> {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        );
        Accounts::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(OpaqueTokenService::new()),
            Arc::new(clock),
        )
    }

    #[tokio::test]
    async fn test_register_valid_user_returns_token() {
        let accounts = accounts();
        let reg = accounts.register("player_one", "p1@game.io").await.unwrap();
        assert_eq!(reg.user.username, "player_one");
        assert_eq!(reg.token.len(), 32);

        let user = accounts.authenticate(&reg.token).await.unwrap();
        assert_eq!(user, reg.user);
    }

    #[tokio::test]
    async fn test_register_duplicate_username_returns_conflict() {
        let accounts = accounts();
        accounts.register("dup", "a@game.io").await.unwrap();
        let result = accounts.register("dup", "b@game.io").await;
        assert!(matches!(
            result,
            Err(GameError::Conflict(m)) if m == "Username already exists"
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_returns_conflict() {
        let accounts = accounts();
        accounts.register("first", "same@game.io").await.unwrap();
        let result = accounts.register("second", "same@game.io").await;
        assert!(matches!(
            result,
            Err(GameError::Conflict(m)) if m == "Email already exists"
        ));
    }

    #[tokio::test]
    async fn test_register_bad_username_returns_invalid_input() {
        let accounts = accounts();
        let too_long = "x".repeat(51);
        for name in ["ab", "has space", "dash-name", too_long.as_str()] {
            let result = accounts.register(name, "ok@game.io").await;
            assert!(
                matches!(result, Err(GameError::InvalidInput(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_authenticate_unknown_token_fails() {
        let accounts = accounts();
        let result = accounts.authenticate("missing").await;
        assert!(matches!(result, Err(GameError::AuthFailed(_))));
    }

    #[test]
    fn test_validate_email_shapes() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("first.last@sub.domain.org").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a@nodot").is_err());
        assert!(validate_email("a@.co").is_err());
        assert!(validate_email("a@b@c.co").is_err());
    }
}
