/// Database models for Matrix Commerce
///
/// Each module owns one table (or a small group of tables) and exposes its
/// queries as associated functions taking a `PgPool` or, where the call must
/// join a caller's transaction, any `PgExecutor`.
///
/// # Models
///
/// - `user`: Accounts, roles and seller balances
/// - `seller_application`: Requests to become a seller
/// - `product`: Catalog and denormalized counters
/// - `review`: Product reviews and rating summaries
/// - `cart`: Shopping cart and wishlist
/// - `order`: Orders, items and tracking history
/// - `payment`: Recorded payments and seller payout requests
/// - `notification`: Per-user and admin broadcast notifications
/// - `chat`: Chat rooms and direct messages
/// - `statistics`: Sales aggregates and daily snapshots
/// - `assistant_log`: Shopping assistant exchanges
///
/// # Example
///
/// ```no_run
/// use matrix_shared::models::user::{CreateUser, Role, User};
/// use matrix_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let new_user = CreateUser {
///     email: "runner@example.com".to_string(),
///     username: "runner".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     full_name: Some("Road Runner".to_string()),
///     role: Role::Buyer,
/// };
///
/// let user = User::create(&pool, new_user).await?;
/// # Ok(())
/// # }
/// ```

pub mod assistant_log;
pub mod cart;
pub mod chat;
pub mod notification;
pub mod order;
pub mod payment;
pub mod product;
pub mod review;
pub mod seller_application;
pub mod statistics;
pub mod user;
