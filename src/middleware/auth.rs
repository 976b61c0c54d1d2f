//! Authorization extractors
//!
//! Each protected handler names the role it needs by taking [`CustomerUser`]
//! or [`AdminUser`]; the token is validated before the handler body runs.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::auth::{AuthContext, Role, TokenService};
use crate::error::ApiError;

/// Caller holding a valid customer token
#[derive(Debug, Clone)]
pub struct CustomerUser(pub AuthContext);

/// Caller holding a valid admin token
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthContext);

fn authorize<S>(parts: &Parts, state: &S, role: Role) -> Result<AuthContext, ApiError>
where
    Arc<TokenService>: FromRef<S>,
{
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Authorization header required".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Authorization header is not valid text".to_string()))?;

    let token_service = Arc::<TokenService>::from_ref(state);
    token_service
        .validate_bearer(header, role)
        .map_err(|e| {
            tracing::debug!(error = %e, path = %parts.uri.path(), "token rejected");
            ApiError::from(e)
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for CustomerUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authorize(parts, state, Role::Customer)
            .map(CustomerUser)
            .map_err(IntoResponse::into_response)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authorize(parts, state, Role::Admin)
            .map(AdminUser)
            .map_err(IntoResponse::into_response)
    }
}
