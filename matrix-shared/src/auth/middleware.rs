/// Authentication middleware for Axum
///
/// Validates `Authorization: Bearer <token>` access tokens, loads the user row
/// and adds an [`AuthContext`] to the request extensions.
///
/// The role in the context always comes from the database, not from the token,
/// so promotions and deactivations apply to already-issued tokens.
///
/// Browsers cannot attach headers to `EventSource` requests, so the token is
/// also accepted from an `access_token` query parameter.
///
/// # Example
///
/// ```no_run
/// use axum::{extract::Request, middleware::{self, Next}, routing::get, Extension, Router};
/// use matrix_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
/// use sqlx::PgPool;
///
/// async fn protected_handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, user {}!", auth.user_id)
/// }
///
/// fn router(pool: PgPool) -> Router {
///     Router::new()
///         .route("/protected", get(protected_handler))
///         .layer(middleware::from_fn(move |req: Request, next: Next| {
///             jwt_auth_middleware(pool.clone(), "secret".to_string(), req, next)
///         }))
/// }
/// ```

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};
use crate::models::user::{Role, User};

/// Authentication context added to request extensions
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use matrix_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {}, Role: {}", auth.user_id, auth.role.as_str())
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Current role of the user
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// True for admins and superadmins
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }
}

/// Error type for authentication middleware
#[derive(Debug)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Invalid authorization header format
    InvalidFormat(String),

    /// Token validation failed
    InvalidToken(String),

    /// Token subject no longer exists
    UnknownUser,

    /// Account has been deactivated
    InactiveUser,

    /// Database error
    DatabaseError(String),
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Not authenticated".to_string(),
            ),
            AuthError::InvalidFormat(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AuthError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AuthError::UnknownUser => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Could not validate credentials".to_string(),
            ),
            AuthError::InactiveUser => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                "Inactive user".to_string(),
            ),
            AuthError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::DatabaseError(ref msg) = self {
            tracing::error!(error = %msg, "Authentication lookup failed");
        }

        let (status, code, message) = self.parts();
        let mut response = (
            status,
            Json(serde_json::json!({ "error": code, "message": message })),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
        }

        response
    }
}

/// Extracts the bearer token from the request
///
/// Looks at the `Authorization` header first, then at the `access_token`
/// query parameter.
pub fn bearer_token(headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AuthError::InvalidFormat("Invalid authorization header".to_string()))?;

        return value
            .strip_prefix("Bearer ")
            .map(|t| t.trim().to_string())
            .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()));
    }

    uri.query()
        .and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "access_token")
                .map(|(_, value)| value.to_string())
        })
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredentials)
}

/// Validates a token and resolves it into an [`AuthContext`]
///
/// # Errors
///
/// - `AuthError::InvalidToken` for bad, expired or refresh tokens
/// - `AuthError::UnknownUser` when the user was deleted
/// - `AuthError::InactiveUser` when the account is deactivated
pub async fn authenticate(pool: &PgPool, secret: &str, token: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
        _ => AuthError::InvalidToken("Could not validate credentials".to_string()),
    })?;

    let user = User::find_by_id(pool, claims.sub)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?
        .ok_or(AuthError::UnknownUser)?;

    if !user.is_active {
        return Err(AuthError::InactiveUser);
    }

    Ok(AuthContext::new(user.id, user.role))
}

/// JWT authentication middleware
///
/// # Errors
///
/// Returns 401 when the token is missing, invalid or expired, and 400 for a
/// malformed header or an inactive account.
pub async fn jwt_auth_middleware(
    pool: PgPool,
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers(), req.uri())?;
    let auth_context = authenticate(&pool, &secret, &token).await?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_auth_context_roles() {
        let admin = AuthContext::new(Uuid::new_v4(), Role::Admin);
        assert!(admin.is_admin());
        assert!(!admin.is_superadmin());

        let root = AuthContext::new(Uuid::new_v4(), Role::Superadmin);
        assert!(root.is_admin());
        assert!(root.is_superadmin());

        let seller = AuthContext::new(Uuid::new_v4(), Role::Seller);
        assert!(seller.is_seller());
        assert!(!seller.is_admin());
    }

    #[test]
    fn test_bearer_token_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        let uri: Uri = "/api/users/me".parse().unwrap();

        assert_eq!(bearer_token(&headers, &uri).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        let uri: Uri = "/".parse().unwrap();

        assert!(matches!(
            bearer_token(&headers, &uri),
            Err(AuthError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_bearer_token_from_query() {
        let headers = HeaderMap::new();
        let uri: Uri = "/api/notifications/stream?foo=1&access_token=tok123"
            .parse()
            .unwrap();

        assert_eq!(bearer_token(&headers, &uri).unwrap(), "tok123");
    }

    #[test]
    fn test_bearer_token_missing() {
        let headers = HeaderMap::new();
        let uri: Uri = "/api/cart?access_token=".parse().unwrap();

        assert!(matches!(
            bearer_token(&headers, &uri),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_auth_error_into_response() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = AuthError::InvalidFormat("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::InactiveUser.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::DatabaseError("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
