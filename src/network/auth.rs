//! Access Token Validation
//!
//! Chat clients present a JWT minted by the account service. The server never
//! issues tokens; it checks the signature (HS256 shared secret or RS256 public
//! key), the optional issuer, expiry, and that a subject is present.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::{AccountId, Identity};

/// Token verification settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// RS256 public key (PEM). Takes precedence over `secret`.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Accept expired tokens. Local development only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Read `AUTH_ISSUER`, `AUTH_PUBLIC_KEY_PEM`, `AUTH_SECRET` and
    /// `AUTH_SKIP_EXPIRY`. Blank values count as unset.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            issuer: var("AUTH_ISSUER"),
            public_key_pem: var("AUTH_PUBLIC_KEY_PEM"),
            secret: var("AUTH_SECRET"),
            skip_expiry: matches!(var("AUTH_SKIP_EXPIRY").as_deref(), Some("1" | "true")),
        }
    }

    /// HS256 config with the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Whether any verification key is set.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        match (&self.public_key_pem, &self.secret) {
            (Some(pem), _) => DecodingKey::from_rsa_pem(pem.as_bytes())
                .map(|key| (key, Algorithm::RS256))
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e))),
            (None, Some(secret)) => Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)),
            (None, None) => Err(AuthError::NotConfigured),
        }
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        // `exp` is optional: a token without it does not expire.
        validation.required_spec_claims.clear();
        validation.validate_exp = !self.skip_expiry;
        validation.validate_aud = false;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

/// Claims carried by chat access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Account id.
    pub sub: String,
    /// Display name. Falls back to `sub` when absent or blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Admin flag.
    #[serde(default)]
    pub admin: bool,
    /// Expiry (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    /// Identity described by these claims.
    pub fn identity(&self) -> Identity {
        let display_name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.sub)
            .to_string();

        Identity {
            account_id: AccountId::new(self.sub.clone()),
            display_name,
            is_admin: self.admin,
        }
    }
}

/// Token validation errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Not a JWT.
    #[error("malformed token")]
    Malformed,
    /// Signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Past `exp`.
    #[error("token expired")]
    Expired,
    /// `iss` does not match.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Required claim absent or empty.
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    /// Any other decoding failure.
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => AuthError::Malformed,
            _ => AuthError::DecodeError(err.to_string()),
        }
    }
}

/// Validate `token` and return its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let (key, algorithm) = config.key()?;
    let claims = decode::<TokenClaims>(token, &key, &config.validation(algorithm))?.claims;

    if claims.sub.trim().is_empty() {
        return Err(AuthError::MissingClaim("sub"));
    }
    Ok(claims)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const SECRET: &str = "test-secret-key-256-bits-long!!";

    pub(crate) fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key).unwrap()
    }

    pub(crate) fn test_claims(sub: &str, name: Option<&str>, admin: bool) -> TokenClaims {
        TokenClaims {
            sub: sub.into(),
            name: name.map(String::from),
            admin,
            exp: Some(chrono::Utc::now().timestamp() as u64 + 3600),
            iss: Some("account-service".into()),
        }
    }

    #[test]
    fn test_valid_token() {
        let token = create_test_token(&test_claims("user123", Some("Ana"), false), SECRET);

        let claims = validate_token(&token, &AuthConfig::with_secret(SECRET)).unwrap();
        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = test_claims("user123", None, false);
        claims.exp = Some(1);
        let token = create_test_token(&claims, SECRET);

        let result = validate_token(&token, &AuthConfig::with_secret(SECRET));
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_token_without_expiry_accepted() {
        let mut claims = test_claims("user123", None, false);
        claims.exp = None;
        let token = create_test_token(&claims, SECRET);

        assert!(validate_token(&token, &AuthConfig::with_secret(SECRET)).is_ok());
    }

    #[test]
    fn test_skip_expiry() {
        let mut claims = test_claims("user123", None, false);
        claims.exp = Some(1);
        let token = create_test_token(&claims, SECRET);

        let config = AuthConfig {
            skip_expiry: true,
            ..AuthConfig::with_secret(SECRET)
        };
        assert!(validate_token(&token, &config).is_ok());
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = create_test_token(&test_claims("user123", None, false), "some-other-secret!!!");

        let result = validate_token(&token, &AuthConfig::with_secret(SECRET));
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_blank_sub_rejected() {
        let token = create_test_token(&test_claims("  ", None, false), SECRET);

        let result = validate_token(&token, &AuthConfig::with_secret(SECRET));
        assert!(matches!(result, Err(AuthError::MissingClaim("sub"))));
    }

    #[test]
    fn test_issuer_checked_when_configured() {
        let token = create_test_token(&test_claims("user123", None, false), SECRET);

        let wrong = AuthConfig {
            issuer: Some("someone-else".into()),
            ..AuthConfig::with_secret(SECRET)
        };
        assert!(matches!(validate_token(&token, &wrong), Err(AuthError::InvalidIssuer)));

        let right = AuthConfig {
            issuer: Some("account-service".into()),
            ..AuthConfig::with_secret(SECRET)
        };
        assert!(validate_token(&token, &right).is_ok());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = validate_token("not-a-jwt", &AuthConfig::with_secret(SECRET));
        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[test]
    fn test_not_configured() {
        let result = validate_token("some.jwt.token", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_identity_from_claims() {
        let identity = test_claims("u1", Some("Ana"), true).identity();
        assert_eq!(identity.account_id.as_str(), "u1");
        assert_eq!(identity.display_name, "Ana");
        assert!(identity.is_admin);

        let unnamed = test_claims("u2", Some("   "), false).identity();
        assert_eq!(unnamed.display_name, "u2");
    }
}
