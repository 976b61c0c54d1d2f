//! API handlers for the loan service

pub mod auth;
pub mod loan;

pub use auth::{login_admin, login_customer, LoginRequest, LoginResponse};
pub use loan::{approve_loan, create_loan, list_loans, repay_loan, MessageResponse};

// Re-export the role extractors for handler use
pub use crate::middleware::auth::{AdminUser, CustomerUser};
