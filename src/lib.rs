//! Mini loan service library
//!
//! Loan issuance, approval and installment repayment over a transactional
//! repository, gated by HS256 bearer tokens.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod loan_service;
pub mod middleware;
pub mod repayment_service;
pub mod repository;
pub mod routes;
pub mod state;
