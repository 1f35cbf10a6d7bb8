//! # Matrix Commerce Shared Library
//!
//! This crate contains shared types, utilities, and business logic used across
//! the Matrix Commerce API server and background worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures
//! - `auth`: Authentication and authorization utilities
//! - `db`: Connection pooling and migrations
//! - `pricing`: Cart totals, platform fees and seller earnings
//! - `analytics`: Growth rates, forecasting and dashboard reshaping
//! - `events`: In-process live event hub (chat messages, notifications)
//! - `redis`: Redis client used for rate limiting

pub mod analytics;
pub mod auth;
pub mod db;
pub mod events;
pub mod models;
pub mod pricing;
pub mod redis;

/// Current version of the Matrix Commerce shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
