//! Middleware for the loan API
//!
//! Request tracing and role-checking extractors.

pub mod auth;
mod tracing;

pub use auth::{AdminUser, CustomerUser};
pub use tracing::request_tracing;
