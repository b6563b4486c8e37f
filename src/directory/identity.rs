//! Credential verification.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::identity::Identity;
use crate::network::auth::{validate_token, AuthConfig, AuthError};

/// Identity lookup errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Credential missing, malformed, expired or forged.
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] AuthError),
}

/// Verifies bearer credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify `credential` and return its owner.
    async fn verify(&self, credential: &str) -> Result<Identity, IdentityError>;
}

/// Identity provider backed by signed JWTs.
///
/// The token itself carries the account id, display name and admin flag.
#[derive(Debug, Clone)]
pub struct JwtIdentityProvider {
    config: AuthConfig,
}

impl JwtIdentityProvider {
    /// Create a provider with the given validation config.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity, IdentityError> {
        // Accept both the raw token and an "Authorization"-style value.
        let token = credential
            .trim()
            .strip_prefix("Bearer ")
            .unwrap_or(credential.trim());
        let claims = validate_token(token, &self.config)?;
        Ok(claims.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::tests::{create_test_token, test_claims, SECRET};

    #[tokio::test]
    async fn test_verify_valid_token() {
        let provider = JwtIdentityProvider::new(AuthConfig::with_secret(SECRET));
        let token = create_test_token(&test_claims("u1", Some("Ana"), false), SECRET);

        let identity = provider.verify(&token).await.unwrap();
        assert_eq!(identity, Identity::new("u1", "Ana"));
    }

    #[tokio::test]
    async fn test_verify_bearer_prefix() {
        let provider = JwtIdentityProvider::new(AuthConfig::with_secret(SECRET));
        let token = create_test_token(&test_claims("u1", None, true), SECRET);

        let identity = provider.verify(&format!("Bearer {}", token)).await.unwrap();
        assert!(identity.is_admin);
    }

    #[tokio::test]
    async fn test_verify_rejects_forged_token() {
        let provider = JwtIdentityProvider::new(AuthConfig::with_secret(SECRET));
        let token = create_test_token(&test_claims("u1", None, true), "another-secret-entirely!!");

        let result = provider.verify(&token).await;
        assert!(matches!(
            result,
            Err(IdentityError::InvalidCredential(AuthError::InvalidSignature))
        ));
    }
}
