/// User model and database operations
///
/// Every account is a user with exactly one [`Role`]. New accounts are buyers;
/// buyers become sellers through an approved seller application.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_role AS ENUM ('buyer', 'seller', 'admin', 'superadmin');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL,
///     username VARCHAR(50) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     full_name VARCHAR(255),
///     avatar_url VARCHAR(512),
///     role user_role NOT NULL DEFAULT 'buyer',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     balance NUMERIC(12, 2) NOT NULL DEFAULT 0,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// -- email and username are unique case-insensitively
/// ```
///
/// # Example
///
/// ```no_run
/// use matrix_shared::models::user::{User, CreateUser, Role};
/// use matrix_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "runner@example.com".to_string(),
///     username: "runner".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     full_name: Some("Road Runner".to_string()),
///     role: Role::Buyer,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "RUNNER@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Browses, buys and reviews products
    Buyer,

    /// Lists products and receives order revenue
    Seller,

    /// Reviews seller applications and sees platform data
    Admin,

    /// Full access, including payout decisions
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    /// Admins and superadmins
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// User model representing an account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Email address, unique case-insensitively
    pub email: String,

    /// Public handle, unique case-insensitively
    pub username: String,

    /// Argon2id password hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub full_name: Option<String>,

    pub avatar_url: Option<String>,

    pub role: Role,

    /// Deactivated users cannot log in or use existing tokens
    pub is_active: bool,

    /// Seller earnings not yet paid out
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

/// Public subset of a user shown next to products and chat messages
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
}

impl User {
    /// Name shown to other users: full name when set, username otherwise
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name.clone(),
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,

    pub username: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    pub full_name: Option<String>,

    pub role: Role,
}

/// Input for updating a profile
///
/// Only `Some` fields are updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

const USER_COLUMNS: &str = "id, email, username, password_hash, full_name, avatar_url, role, \
                            is_active, balance, created_at, updated_at, last_login_at";

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns a database error on unique violation of `users_email_key` or
    /// `users_username_key`.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash, full_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(data.email.trim())
        .bind(data.username.trim())
        .bind(data.password_hash)
        .bind(data.full_name)
        .bind(data.role)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email.trim())
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by username (case-insensitive)
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username.trim())
        .fetch_optional(pool)
        .await
    }

    /// Loads the public summaries of several users
    pub async fn summaries(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            "SELECT id, username, full_name FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Updates profile fields
    ///
    /// # Returns
    ///
    /// The updated user, or None if the user doesn't exist
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                full_name = COALESCE($3, full_name),
                avatar_url = COALESCE($4, avatar_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.username.map(|u| u.trim().to_string()))
        .bind(data.full_name)
        .bind(data.avatar_url)
        .fetch_optional(pool)
        .await
    }

    /// Changes a user's role
    pub async fn set_role<'e, E>(executor: E, id: Uuid, role: Role) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(role)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Updates the last login timestamp
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Adds `amount` to a seller's balance
    pub async fn credit_balance<'e, E>(
        executor: E,
        id: Uuid,
        amount: Decimal,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE users SET balance = balance + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Subtracts `amount` from a seller's balance
    ///
    /// # Returns
    ///
    /// False when the user doesn't exist or the balance is insufficient
    pub async fn debit_balance<'e, E>(
        executor: E,
        id: Uuid,
        amount: Decimal,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET balance = balance - $2, updated_at = NOW()
            WHERE id = $1 AND balance >= $2
            "#,
        )
        .bind(id)
        .bind(amount)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users with a role, newest first
    pub async fn list_by_role(pool: &PgPool, role: Role) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY created_at DESC"
        ))
        .bind(role)
        .fetch_all(pool)
        .await
    }

    /// Searches active sellers by username, full name or business keyword
    pub async fn search_sellers(
        pool: &PgPool,
        term: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE role = 'seller' AND is_active
              AND ($1::TEXT IS NULL
                   OR username ILIKE '%' || $1 || '%'
                   OR full_name ILIKE '%' || $1 || '%')
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(term)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Counts users with a role
    pub async fn count_by_role(pool: &PgPool, role: Role) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "runner@example.com".to_string(),
            username: "runner".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            full_name: None,
            avatar_url: None,
            role: Role::Buyer,
            is_active: true,
            balance: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("seller".parse::<Role>().unwrap(), Role::Seller);
        assert_eq!("SuperAdmin".parse::<Role>().unwrap(), Role::Superadmin);
        assert!("customer".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_is_admin() {
        assert!(Role::Admin.is_admin());
        assert!(Role::Superadmin.is_admin());
        assert!(!Role::Seller.is_admin());
        assert!(!Role::Buyer.is_admin());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Superadmin).unwrap(), "\"superadmin\"");
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();

        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "runner");
        assert_eq!(json["role"], "buyer");
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut user = sample_user();
        assert_eq!(user.display_name(), "runner");

        user.full_name = Some("   ".to_string());
        assert_eq!(user.display_name(), "runner");

        user.full_name = Some("Road Runner".to_string());
        assert_eq!(user.display_name(), "Road Runner");
    }
}
