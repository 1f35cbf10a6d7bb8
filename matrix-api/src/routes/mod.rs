/// API route handlers
///
/// One module per resource:
///
/// - `health`: Welcome and health check
/// - `users`: Registration, login, profile, seller onboarding
/// - `admin`: Seller application review
/// - `products`: Catalog and reviews
/// - `cart`: Cart and wishlist
/// - `orders`: Checkout, listing, status and tracking
/// - `payments`: Payments and seller payouts
/// - `notifications`: Notification inbox and live stream
/// - `chat`: Rooms and direct messages
/// - `statistics`: Sales statistics and overview
/// - `predictions`: Daily predictions, monthly forecasts, seller dashboard
/// - `chatbot`: Shopping assistant

pub mod admin;
pub mod cart;
pub mod chat;
pub mod chatbot;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod predictions;
pub mod products;
pub mod statistics;
pub mod users;
