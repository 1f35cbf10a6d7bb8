/// Seller application model
///
/// A buyer asks to become a seller by submitting business details. An admin
/// approves (the user becomes a seller) or rejects it with a reason.
///
/// # State Machine
///
/// ```text
/// pending → approved
/// pending → rejected
/// ```
///
/// # Schema
///
/// ```sql
/// CREATE TYPE application_status AS ENUM ('pending', 'approved', 'rejected');
///
/// CREATE TABLE seller_applications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     business_name VARCHAR(255) NOT NULL,
///     business_type VARCHAR(100) NOT NULL,
///     category VARCHAR(100),
///     description TEXT NOT NULL,
///     address TEXT NOT NULL,
///     phone VARCHAR(50) NOT NULL,
///     tax_id VARCHAR(100),
///     status application_status NOT NULL DEFAULT 'pending',
///     rejection_reason TEXT,
///     submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     approved_at TIMESTAMPTZ,
///     rejected_at TIMESTAMPTZ
/// );
/// -- at most one pending application per user
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Only pending applications can be decided
    pub fn can_transition_to(&self, target: ApplicationStatus) -> bool {
        matches!(
            (self, target),
            (ApplicationStatus::Pending, ApplicationStatus::Approved)
                | (ApplicationStatus::Pending, ApplicationStatus::Rejected)
        )
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(format!("Invalid application status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SellerApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub business_type: String,
    pub category: Option<String>,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub tax_id: Option<String>,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

/// Application joined with the applicant, for the admin list
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SellerApplicationWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: SellerApplication,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSellerApplication {
    pub user_id: Uuid,
    pub business_name: String,
    pub business_type: String,
    pub category: Option<String>,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub tax_id: Option<String>,
}

const APPLICATION_COLUMNS: &str = "id, user_id, business_name, business_type, category, \
    description, address, phone, tax_id, status, rejection_reason, submitted_at, approved_at, \
    rejected_at";

impl SellerApplication {
    /// Creates a pending application
    ///
    /// # Errors
    ///
    /// Unique violation on `seller_applications_pending_key` when the user
    /// already has a pending application.
    pub async fn create(
        pool: &PgPool,
        data: CreateSellerApplication,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SellerApplication>(&format!(
            r#"
            INSERT INTO seller_applications
                (user_id, business_name, business_type, category, description, address, phone, tax_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(data.user_id)
        .bind(data.business_name)
        .bind(data.business_type)
        .bind(data.category)
        .bind(data.description)
        .bind(data.address)
        .bind(data.phone)
        .bind(data.tax_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SellerApplication>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM seller_applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Finds the user's pending application, if any
    pub async fn find_pending_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SellerApplication>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM seller_applications \
             WHERE user_id = $1 AND status = 'pending'"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists applications with applicant details, newest first
    pub async fn list(
        pool: &PgPool,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<SellerApplicationWithUser>, sqlx::Error> {
        sqlx::query_as::<_, SellerApplicationWithUser>(
            r#"
            SELECT a.id, a.user_id, a.business_name, a.business_type, a.category,
                   a.description, a.address, a.phone, a.tax_id, a.status,
                   a.rejection_reason, a.submitted_at, a.approved_at, a.rejected_at,
                   u.username, u.email, u.full_name
            FROM seller_applications a
            JOIN users u ON u.id = a.user_id
            WHERE $1::application_status IS NULL OR a.status = $1
            ORDER BY a.submitted_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Marks a pending application approved
    ///
    /// # Returns
    ///
    /// None when the application doesn't exist or is no longer pending
    pub async fn approve<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SellerApplication>(&format!(
            r#"
            UPDATE seller_applications
            SET status = 'approved', approved_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Marks a pending application rejected with a reason
    pub async fn reject<'e, E>(
        executor: E,
        id: Uuid,
        reason: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SellerApplication>(&format!(
            r#"
            UPDATE seller_applications
            SET status = 'rejected', rejected_at = NOW(), rejection_reason = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(reason)
        .fetch_optional(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_can_be_decided() {
        assert!(ApplicationStatus::Pending.can_transition_to(ApplicationStatus::Approved));
        assert!(ApplicationStatus::Pending.can_transition_to(ApplicationStatus::Rejected));
        assert!(!ApplicationStatus::Approved.can_transition_to(ApplicationStatus::Rejected));
        assert!(!ApplicationStatus::Rejected.can_transition_to(ApplicationStatus::Approved));
        assert!(!ApplicationStatus::Pending.can_transition_to(ApplicationStatus::Pending));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "approved".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::Approved
        );
        assert!("accepted".parse::<ApplicationStatus>().is_err());
    }
}
