//! Application state shared across handlers

use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::LifecycleSettings;
use crate::loan_service::LoanService;
use crate::repayment_service::RepaymentService;
use crate::repository::LoanRepository;

use axum::extract::FromRef;

/// Shared application state
pub struct AppState<R> {
    pub loan_service: Arc<LoanService<R>>,
    pub repayment_service: Arc<RepaymentService<R>>,
    pub token_service: Arc<TokenService>,
}

impl<R: LoanRepository> AppState<R> {
    pub fn new(
        loan_service: Arc<LoanService<R>>,
        repayment_service: Arc<RepaymentService<R>>,
        token_service: Arc<TokenService>,
    ) -> Self {
        Self {
            loan_service,
            repayment_service,
            token_service,
        }
    }

    /// Build both services over one repository
    pub fn from_repository(
        repo: Arc<R>,
        settings: LifecycleSettings,
        token_service: TokenService,
    ) -> Self {
        Self::new(
            Arc::new(LoanService::new(repo.clone(), settings)),
            Arc::new(RepaymentService::new(repo, settings)),
            Arc::new(token_service),
        )
    }
}

// Manual impl: cloning the state must not require `R: Clone`.
impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            loan_service: self.loan_service.clone(),
            repayment_service: self.repayment_service.clone(),
            token_service: self.token_service.clone(),
        }
    }
}

impl<R> FromRef<AppState<R>> for Arc<TokenService> {
    fn from_ref(app_state: &AppState<R>) -> Self {
        app_state.token_service.clone()
    }
}
