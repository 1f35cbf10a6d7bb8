//! Session tokens
//!
//! Shoppers get an HS256 access token (30 minutes unless configured) and a
//! refresh token (30 days) at register/login. Both carry the account's role
//! at issue time, but the request layer reloads the role from the database,
//! so an approved seller does not need to log in again.
//!
//! ```
//! use chrono::Duration;
//! use matrix_shared::auth::jwt::{issue_pair, validate_access_token};
//! use matrix_shared::models::user::Role;
//! use uuid::Uuid;
//!
//! # fn example() -> Result<(), matrix_shared::auth::jwt::JwtError> {
//! let shopper = Uuid::new_v4();
//! let pair = issue_pair(shopper, Role::Buyer, "a-secret-of-at-least-32-bytes!!", Duration::minutes(30), Duration::days(30))?;
//!
//! assert_eq!(validate_access_token(&pair.access_token, "a-secret-of-at-least-32-bytes!!")?.sub, shopper);
//! # Ok(())
//! # }
//! ```

use chrono::{Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::Role;

pub const ISSUER: &str = "matrix-commerce";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid issuer: expected {expected}")]
    InvalidIssuer { expected: String },

    #[error("Expected {expected} token, got {actual} token")]
    WrongTokenType {
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    /// Lifetime used when the caller does not configure one
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::minutes(30),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Token payload: `sub`, `iss`, `iat`, `exp`, `nbf` plus the role and kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub role: Role,
    pub token_type: TokenType,
}

impl Claims {
    pub fn new(user_id: Uuid, role: Role, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, role, token_type, token_type.default_expiration())
    }

    /// A negative `expires_in` yields claims that are already expired
    pub fn with_expiration(
        user_id: Uuid,
        role: Role,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let issued = Utc::now().timestamp();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: issued,
            nbf: issued,
            exp: issued + expires_in.num_seconds(),
            role,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    pub fn time_until_expiration(&self) -> Option<Duration> {
        let left = self.exp - Utc::now().timestamp();
        (left > 0).then(|| Duration::seconds(left))
    }
}

/// Access and refresh token handed out at register and login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Signs a fresh access/refresh pair for an account
pub fn issue_pair(
    user_id: Uuid,
    role: Role,
    secret: &str,
    access_ttl: Duration,
    refresh_ttl: Duration,
) -> Result<TokenPair, JwtError> {
    let access = Claims::with_expiration(user_id, role, TokenType::Access, access_ttl);
    let refresh = Claims::with_expiration(user_id, role, TokenType::Refresh, refresh_ttl);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
    })
}

/// Checks signature, issuer, `exp` and `nbf` (no leeway) and returns the claims
///
/// # Errors
///
/// `Expired` and `InvalidIssuer` are reported separately; every other
/// failure is a `ValidationError`.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_nbf = true;
    validation.leeway = 0;

    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
                expected: ISSUER.to_string(),
            },
            _ => JwtError::ValidationError(e.to_string()),
        })
}

fn validate_kind(token: &str, secret: &str, kind: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;
    if claims.token_type == kind {
        Ok(claims)
    } else {
        Err(JwtError::WrongTokenType {
            expected: kind.as_str(),
            actual: claims.token_type.as_str(),
        })
    }
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_kind(token, secret, TokenType::Access)
}

pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_kind(token, secret, TokenType::Refresh)
}

/// Trades a refresh token for a new access token with the same subject and role
pub fn refresh_access_token(
    refresh_token: &str,
    secret: &str,
    access_ttl: Duration,
) -> Result<String, JwtError> {
    let claims = validate_refresh_token(refresh_token, secret)?;
    create_token(
        &Claims::with_expiration(claims.sub, claims.role, TokenType::Access, access_ttl),
        secret,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "storefront-signing-key-0123456789abcdef";

    fn pair_for(role: Role) -> (Uuid, TokenPair) {
        let id = Uuid::new_v4();
        let pair = issue_pair(id, role, SECRET, Duration::minutes(30), Duration::days(30)).unwrap();
        (id, pair)
    }

    #[test]
    fn test_issued_pair_carries_subject_role_and_kind() {
        let (seller, pair) = pair_for(Role::Seller);

        let access = validate_access_token(&pair.access_token, SECRET).unwrap();
        assert_eq!(access.sub, seller);
        assert_eq!(access.role, Role::Seller);
        assert_eq!(access.iss, ISSUER);
        assert_eq!(access.exp - access.iat, 30 * 60);

        let refresh = validate_refresh_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.exp - refresh.iat, 30 * 24 * 3600);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let (_, pair) = pair_for(Role::Buyer);

        assert!(matches!(
            validate_access_token(&pair.refresh_token, SECRET),
            Err(JwtError::WrongTokenType { expected: "access", actual: "refresh" })
        ));
        assert!(validate_refresh_token(&pair.access_token, SECRET).is_err());
        assert!(refresh_access_token(&pair.access_token, SECRET, Duration::minutes(30)).is_err());
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let (_, pair) = pair_for(Role::Admin);
        assert!(matches!(
            validate_token(&pair.access_token, "some-other-shop-key-0123456789abcdef"),
            Err(JwtError::ValidationError(_))
        ));
    }

    #[test]
    fn test_expired_session() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            Role::Buyer,
            TokenType::Access,
            Duration::minutes(-90),
        );
        assert!(claims.is_expired());
        assert_eq!(claims.time_until_expiration(), None);

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_refresh_issues_short_access_token() {
        let (buyer, pair) = pair_for(Role::Buyer);

        let access = refresh_access_token(&pair.refresh_token, SECRET, Duration::minutes(5)).unwrap();
        let claims = validate_access_token(&access, SECRET).unwrap();

        assert_eq!(claims.sub, buyer);
        assert_eq!(claims.role, Role::Buyer);
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn test_default_lifetimes() {
        let claims = Claims::new(Uuid::new_v4(), Role::Superadmin, TokenType::Access);
        let left = claims.time_until_expiration().unwrap();
        assert!(left <= Duration::minutes(30) && left > Duration::minutes(29));

        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }
}
