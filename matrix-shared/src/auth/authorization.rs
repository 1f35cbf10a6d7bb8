/// Authorization helpers and permission checks
///
/// Role-based access control for Matrix Commerce.
///
/// # Permission Model
///
/// 1. **Role**: `buyer`, `seller`, `admin`, `superadmin`
/// 2. **Ownership**: sellers own products, buyers own orders and carts
/// 3. **Role override**: admins (and superadmins) may act on resources they
///    don't own, where the endpoint allows it
///
/// Roles are not a strict ladder. A seller is not "more" than a buyer for
/// every endpoint, so checks name the accepted roles explicitly.
///
/// # Example
///
/// ```
/// use matrix_shared::auth::authorization::{require_any_role, require_owner_or_role};
/// use matrix_shared::auth::middleware::AuthContext;
/// use matrix_shared::models::user::Role;
/// use uuid::Uuid;
///
/// let seller = AuthContext::new(Uuid::new_v4(), Role::Seller);
///
/// assert!(require_any_role(&seller, &[Role::Seller, Role::Superadmin]).is_ok());
/// assert!(require_owner_or_role(&seller, Uuid::new_v4(), &[Role::Superadmin]).is_err());
/// ```

use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::user::Role;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// User doesn't have any of the accepted roles
    #[error("Insufficient permissions: requires one of {required:?}, has {actual:?}")]
    InsufficientRole { required: Vec<Role>, actual: Role },

    /// User doesn't own the resource
    #[error("Not authorized to access this resource")]
    NotAuthorized,
}

/// Checks that the user has exactly the given role
pub fn require_role(auth: &AuthContext, role: Role) -> Result<(), AuthzError> {
    require_any_role(auth, &[role])
}

/// Checks that the user has one of the given roles
///
/// # Errors
///
/// Returns `AuthzError::InsufficientRole` listing the accepted roles
pub fn require_any_role(auth: &AuthContext, roles: &[Role]) -> Result<(), AuthzError> {
    if roles.contains(&auth.role) {
        return Ok(());
    }

    Err(AuthzError::InsufficientRole {
        required: roles.to_vec(),
        actual: auth.role,
    })
}

/// Checks that the user is an admin or superadmin
pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    require_any_role(auth, &[Role::Admin, Role::Superadmin])
}

/// Allows access when the user is `subject_id` or has one of `roles`
///
/// Used for per-user resources such as seller revenue or statistics.
///
/// # Example
///
/// ```
/// use matrix_shared::auth::authorization::require_self_or_role;
/// use matrix_shared::auth::middleware::AuthContext;
/// use matrix_shared::models::user::Role;
/// use uuid::Uuid;
///
/// let me = Uuid::new_v4();
/// let auth = AuthContext::new(me, Role::Seller);
///
/// assert!(require_self_or_role(&auth, me, &[Role::Admin]).is_ok());
/// ```
pub fn require_self_or_role(
    auth: &AuthContext,
    subject_id: Uuid,
    roles: &[Role],
) -> Result<(), AuthzError> {
    if auth.user_id == subject_id {
        return Ok(());
    }

    require_any_role(auth, roles).map_err(|_| AuthzError::NotAuthorized)
}

/// Allows access when the user owns the resource or has one of `roles`
///
/// # Errors
///
/// Returns `AuthzError::NotAuthorized`
pub fn require_owner_or_role(
    auth: &AuthContext,
    resource_owner_id: Uuid,
    roles: &[Role],
) -> Result<(), AuthzError> {
    if auth.user_id == resource_owner_id || roles.contains(&auth.role) {
        return Ok(());
    }

    Err(AuthzError::NotAuthorized)
}
