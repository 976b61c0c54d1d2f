//! Loan and repayment HTTP handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{AdminUser, CustomerUser};
use crate::error::ApiResult;
use crate::loan::{
    ApproveLoanRequest, CreateLoanRequest, LoanDetails, LoanListResponse, RepaymentRequest,
};
use crate::repository::LoanRepository;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// POST /api/v1/user/loan
pub async fn create_loan<R: LoanRepository>(
    State(state): State<AppState<R>>,
    CustomerUser(caller): CustomerUser,
    Json(req): Json<CreateLoanRequest>,
) -> ApiResult<Json<LoanDetails>> {
    let details = state
        .loan_service
        .create_loan(&caller.user_id, req.amount, req.term)
        .await?;
    Ok(Json(details))
}

/// GET /api/v1/user/loans
pub async fn list_loans<R: LoanRepository>(
    State(state): State<AppState<R>>,
    CustomerUser(caller): CustomerUser,
) -> ApiResult<Json<LoanListResponse>> {
    let loans = state
        .loan_service
        .loans_for_customer(&caller.user_id)
        .await?;
    Ok(Json(LoanListResponse { loans }))
}

/// POST /api/v1/user/loan/repayment
pub async fn repay_loan<R: LoanRepository>(
    State(state): State<AppState<R>>,
    CustomerUser(caller): CustomerUser,
    Json(req): Json<RepaymentRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .repayment_service
        .repay(&caller.user_id, &req.repayment_id, req.amount)
        .await?;
    Ok(MessageResponse::new("loan repayment successful"))
}

/// POST /api/v1/admin/loan/approve
pub async fn approve_loan<R: LoanRepository>(
    State(state): State<AppState<R>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<ApproveLoanRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.loan_service.approve_loan(&req.loan_id).await?;
    tracing::info!(admin = %admin.user_id, loan_id = %req.loan_id, "approval recorded");
    Ok(MessageResponse::new("successfully approved loan"))
}
