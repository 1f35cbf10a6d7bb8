/// Authentication and authorization utilities
///
/// This module provides the authentication primitives for Matrix Commerce:
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength checks
/// - [`jwt`]: JWT access/refresh token generation and validation
/// - [`middleware`]: Request-scoped authentication context
/// - [`authorization`]: Role-based access checks
///
/// # Example
///
/// ```no_run
/// use matrix_shared::auth::password::{hash_password, verify_password};
/// use matrix_shared::auth::jwt::{create_token, Claims, TokenType};
/// use matrix_shared::models::user::Role;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password1")?;
/// assert!(verify_password("user_password1", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), Role::Buyer, TokenType::Access);
/// let token = create_token(&claims, "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
