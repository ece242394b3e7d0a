use crate::error::AuthError;

use async_trait::async_trait;

/// Who is calling, as far as the identity provider is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub user_id: String,
}

/// Resolves the `Authorization` header of a request into a user.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<TokenInfo, AuthError>;
}

/// Treats the token itself as the user id. Stands in for a real identity service.
#[derive(Debug, Clone, Default)]
pub struct PassthroughResolver;

#[async_trait]
impl TokenResolver for PassthroughResolver {
    async fn resolve(&self, token: &str) -> Result<TokenInfo, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        Ok(TokenInfo {
            user_id: token.to_string(),
        })
    }
}
