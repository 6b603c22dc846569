//! Access tokens for registered players.
//!
//! Token minting and checking sit behind the [`TokenService`] trait: the
//! game rules only need "who is this token for?". [`OpaqueTokenService`]
//! is the built-in implementation, handing out random 128-bit tokens and
//! remembering them in memory. A deployment that wants signed tokens
//! plugs in its own implementation without touching the use cases.

use std::collections::HashMap;
use std::future::Future;

use rand::Rng;
use timeright_protocol::UserId;
use tokio::sync::Mutex;

use crate::GameError;

/// The identity a token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
}

/// Issues and verifies access tokens.
///
/// # Example
///
/// ```rust
/// use timeright_protocol::UserId;
/// use timeright_session::{GameError, Principal, TokenService};
///
/// /// Treats the token as a numeric user id. Development only.
/// struct DevTokens;
///
/// impl TokenService for DevTokens {
///     async fn issue(
///         &self,
///         user_id: UserId,
///         _username: &str,
///     ) -> Result<String, GameError> {
///         Ok(user_id.0.to_string())
///     }
///
///     async fn verify(&self, token: &str) -> Result<Principal, GameError> {
///         let id: u64 = token.parse().map_err(|_| {
///             GameError::AuthFailed("token must be a number".into())
///         })?;
///         Ok(Principal { user_id: UserId(id), username: token.to_owned() })
///     }
/// }
/// ```
pub trait TokenService: Send + Sync + 'static {
    /// Mints a token for `user_id`.
    fn issue(
        &self,
        user_id: UserId,
        username: &str,
    ) -> impl Future<Output = Result<String, GameError>> + Send;

    /// Resolves a token back to its principal.
    ///
    /// # Errors
    /// [`GameError::AuthFailed`] for unknown or revoked tokens.
    fn verify(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Principal, GameError>> + Send;
}

/// Random opaque tokens kept in a process-local table.
#[derive(Debug, Default)]
pub struct OpaqueTokenService {
    tokens: Mutex<HashMap<String, Principal>>,
}

impl OpaqueTokenService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets a token. Returns `false` if it was not known.
    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.lock().await.remove(token).is_some()
    }
}

impl TokenService for OpaqueTokenService {
    async fn issue(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<String, GameError> {
        let token = generate_token();
        self.tokens.lock().await.insert(
            token.clone(),
            Principal {
                user_id,
                username: username.to_owned(),
            },
        );
        tracing::debug!(%user_id, "access token issued");
        Ok(token)
    }

    async fn verify(&self, token: &str) -> Result<Principal, GameError> {
        self.tokens
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| GameError::AuthFailed("unknown token".into()))
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_verify_issued_token_returns_principal() {
        let tokens = OpaqueTokenService::new();
        let token = tokens.issue(UserId(3), "carol").await.unwrap();

        let principal = tokens.verify(&token).await.unwrap();
        assert_eq!(principal.user_id, UserId(3));
        assert_eq!(principal.username, "carol");
    }

    #[tokio::test]
    async fn test_verify_unknown_token_returns_auth_failed() {
        let tokens = OpaqueTokenService::new();
        let result = tokens.verify("nope").await;
        assert!(matches!(result, Err(GameError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_verify_revoked_token_returns_auth_failed() {
        let tokens = OpaqueTokenService::new();
        let token = tokens.issue(UserId(3), "carol").await.unwrap();
        assert!(tokens.revoke(&token).await);
        assert!(tokens.verify(&token).await.is_err());
        assert!(!tokens.revoke(&token).await);
    }
}
