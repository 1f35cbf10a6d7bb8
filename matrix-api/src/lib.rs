//! # Matrix Commerce API Server Library
//!
//! HTTP surface of the Matrix Commerce storefront.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `assistant`: Client for the shopping assistant's completion endpoint
//! - `bootstrap`: Superadmin seeding at startup
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers and rate limiting
//! - `routes`: API route handlers

pub mod app;
pub mod assistant;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
