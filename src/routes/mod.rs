//! Route definitions for the loan API

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::middleware::request_tracing;
use crate::repository::LoanRepository;
use crate::state::AppState;

/// Open login routes
pub fn auth_routes<R: LoanRepository>() -> Router<AppState<R>> {
    Router::new()
        .route(
            "/api/v1/auth/customer/login",
            post(handlers::login_customer::<R>),
        )
        .route("/api/v1/auth/admin/login", post(handlers::login_admin::<R>))
}

/// Customer routes
pub fn user_routes<R: LoanRepository>() -> Router<AppState<R>> {
    Router::new()
        .route("/api/v1/user/loan", post(handlers::create_loan::<R>))
        .route("/api/v1/user/loans", get(handlers::list_loans::<R>))
        .route(
            "/api/v1/user/loan/repayment",
            post(handlers::repay_loan::<R>),
        )
}

/// Admin routes
pub fn admin_routes<R: LoanRepository>() -> Router<AppState<R>> {
    Router::new().route(
        "/api/v1/admin/loan/approve",
        post(handlers::approve_loan::<R>),
    )
}

/// The full API with state applied and request tracing attached
pub fn api_router<R: LoanRepository>(state: AppState<R>) -> Router {
    Router::new()
        .merge(auth_routes())
        .merge(user_routes())
        .merge(admin_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(request_tracing))
}
