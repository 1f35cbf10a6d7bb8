//! Superadmin seeding
//!
//! With `BOOTSTRAP_ADMIN_EMAIL` and `BOOTSTRAP_ADMIN_PASSWORD` set, startup
//! makes sure that account exists with the `superadmin` role. An existing
//! account keeps its password and is only promoted.

use matrix_shared::auth::password::hash_password;
use matrix_shared::models::user::{CreateUser, Role, User};
use sqlx::PgPool;

use crate::config::BootstrapAdmin;

/// Username derived from the email's local part
pub fn username_from_email(email: &str) -> String {
    let local: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(50)
        .collect();

    if local.is_empty() {
        "superadmin".to_string()
    } else {
        local
    }
}

pub async fn ensure_superadmin(pool: &PgPool, admin: &BootstrapAdmin) -> anyhow::Result<User> {
    if let Some(user) = User::find_by_email(pool, &admin.email).await? {
        if user.role != Role::Superadmin {
            User::set_role(pool, user.id, Role::Superadmin).await?;
            tracing::info!(user_id = %user.id, "Promoted bootstrap account to superadmin");
        }
        return Ok(user);
    }

    let mut username = username_from_email(&admin.email);
    if User::find_by_username(pool, &username).await?.is_some() {
        username = format!("{}_admin", username);
    }

    let user = User::create(
        pool,
        CreateUser {
            email: admin.email.clone(),
            username,
            password_hash: hash_password(&admin.password)?,
            full_name: Some("Super Admin".to_string()),
            role: Role::Superadmin,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "Created bootstrap superadmin");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("ops.lead@example.com"), "opslead");
        assert_eq!(username_from_email("root_1@example.com"), "root_1");
        assert_eq!(username_from_email("@example.com"), "superadmin");
    }
}
