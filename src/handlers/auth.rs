//! Login HTTP handlers
//!
//! Logins issue a bearer token for the given username and the route's role.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::Role;
use crate::error::ApiResult;
use crate::repository::LoanRepository;
use crate::state::AppState;

/// Login request body. `secret` is accepted but not checked.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username must be provided"))]
    pub username: String,
    pub secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

fn login<R: LoanRepository>(
    state: &AppState<R>,
    req: &LoginRequest,
    role: Role,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;
    let token = state.token_service.issue(&req.username, role)?;
    tracing::info!(username = %req.username, role = role.as_str(), "token issued");
    Ok(Json(LoginResponse { token }))
}

/// POST /api/v1/auth/customer/login
pub async fn login_customer<R: LoanRepository>(
    State(state): State<AppState<R>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    login(&state, &req, Role::Customer)
}

/// POST /api/v1/auth/admin/login
pub async fn login_admin<R: LoanRepository>(
    State(state): State<AppState<R>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    login(&state, &req, Role::Admin)
}
