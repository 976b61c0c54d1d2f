//! Bearer token issuance and validation
//!
//! Tokens are HS256 JWTs with claims `{id, role, exp, authorized}`.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

const BEARER_PREFIX: &str = "Bearer ";

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("user id must be provided")]
    MissingUserId,

    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedHeader,

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("role {actual} does not match required role {required}")]
    RoleMismatch { actual: String, required: String },
}

/// Caller roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub authorized: bool,
}

/// Identity of a validated caller. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

/// Issues and validates signed bearer tokens with a shared secret
pub struct TokenService {
    secret: String,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a token for `user_id` carrying `role`
    pub fn issue(&self, user_id: &str, role: Role) -> Result<String, JwtError> {
        if user_id.is_empty() {
            return Err(JwtError::MissingUserId);
        }

        let claims = Claims {
            id: Some(user_id.to_string()),
            role: Some(role.as_str().to_string()),
            exp: (Utc::now() + self.ttl).timestamp(),
            authorized: true,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            JwtError::EncodingFailed(e.to_string())
        })
    }

    /// Validate a raw `Authorization` header value
    pub fn validate_bearer(&self, header: &str, required: Role) -> Result<AuthContext, JwtError> {
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.contains(' '))
            .ok_or(JwtError::MalformedHeader)?;

        self.validate(token, required)
    }

    /// Verify signature and expiry, then require `id`, `role` and a role match
    pub fn validate(&self, token: &str, required: Role) -> Result<AuthContext, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            _ => JwtError::DecodingFailed(e.to_string()),
        })?
        .claims;

        let role = claims
            .role
            .ok_or_else(|| JwtError::InvalidToken("role claim missing".to_string()))?;
        let user_id = claims
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| JwtError::InvalidToken("id claim missing".to_string()))?;

        if role != required.as_str() {
            tracing::info!(provided = %role, required = %required.as_str(), "role mismatch");
            return Err(JwtError::RoleMismatch {
                actual: role,
                required: required.as_str().to_string(),
            });
        }

        Ok(AuthContext {
            user_id,
            role: required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key";

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let service = TokenService::new(SECRET);
        let token = service.issue("user1", Role::Customer).unwrap();
        assert!(!token.is_empty());

        let ctx = service.validate(&token, Role::Customer).unwrap();
        assert_eq!(ctx.user_id, "user1");
        assert_eq!(ctx.role, Role::Customer);
    }

    #[test]
    fn test_issue_rejects_empty_user() {
        let service = TokenService::new(SECRET);
        assert!(matches!(
            service.issue("", Role::Admin),
            Err(JwtError::MissingUserId)
        ));
    }

    #[test]
    fn test_role_mismatch() {
        let service = TokenService::new(SECRET);
        let token = service.issue("user1", Role::Customer).unwrap();
        assert!(matches!(
            service.validate(&token, Role::Admin),
            Err(JwtError::RoleMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = TokenService::new("secret1")
            .issue("user1", Role::Admin)
            .unwrap();
        let result = TokenService::new("secret2").validate(&token, Role::Admin);
        assert!(matches!(result, Err(JwtError::DecodingFailed(_))));
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims {
            id: Some("user1".to_string()),
            role: Some("customer".to_string()),
            exp: (Utc::now() - Duration::minutes(5)).timestamp(),
            authorized: true,
        };
        let token = sign(&claims, SECRET);
        assert!(matches!(
            TokenService::new(SECRET).validate(&token, Role::Customer),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn test_missing_claims() {
        let exp = (Utc::now() + Duration::minutes(5)).timestamp();
        let service = TokenService::new(SECRET);

        let no_role = sign(
            &Claims {
                id: Some("user1".to_string()),
                role: None,
                exp,
                authorized: true,
            },
            SECRET,
        );
        assert!(matches!(
            service.validate(&no_role, Role::Customer),
            Err(JwtError::InvalidToken(_))
        ));

        let no_id = sign(
            &Claims {
                id: None,
                role: Some("customer".to_string()),
                exp,
                authorized: true,
            },
            SECRET,
        );
        assert!(matches!(
            service.validate(&no_id, Role::Customer),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_bearer_prefix() {
        let service = TokenService::new(SECRET);
        let token = service.issue("admin1", Role::Admin).unwrap();

        let ctx = service
            .validate_bearer(&format!("Bearer {}", token), Role::Admin)
            .unwrap();
        assert_eq!(ctx.user_id, "admin1");

        assert!(matches!(
            service.validate_bearer(&token, Role::Admin),
            Err(JwtError::MalformedHeader)
        ));
        assert!(matches!(
            service.validate_bearer("Bearer ", Role::Admin),
            Err(JwtError::MalformedHeader)
        ));
        assert!(matches!(
            service.validate_bearer(&format!("Basic {}", token), Role::Admin),
            Err(JwtError::MalformedHeader)
        ));
    }

    #[test]
    fn test_garbage_token() {
        let result = TokenService::new(SECRET).validate("invalid.token.here", Role::Customer);
        assert!(result.is_err());
    }
}
