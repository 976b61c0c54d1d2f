//! Loan service layer - creation and approval of loans

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{timeout, timeout_at, Instant};
use uuid::Uuid;

use crate::config::LifecycleSettings;
use crate::error::{ApiError, ApiResult};
use crate::loan::{LoanDetails, LoanStatus, ScheduleError, MAX_TERM};
use crate::repository::{self, IsolationLevel, LoanRepository};

/// Isolation for transitions that must not race
pub const TRANSITION_ISOLATION: IsolationLevel = IsolationLevel::RepeatableRead;

/// Loan service for managing the loan lifecycle
pub struct LoanService<R> {
    repo: Arc<R>,
    settings: LifecycleSettings,
}

impl<R: LoanRepository> LoanService<R> {
    pub fn new(repo: Arc<R>, settings: LifecycleSettings) -> Self {
        Self { repo, settings }
    }

    /// Create a PENDING loan with its full repayment schedule
    pub async fn create_loan(
        &self,
        customer_id: &str,
        amount: Decimal,
        term: i32,
    ) -> ApiResult<LoanDetails> {
        if customer_id.is_empty() {
            return Err(ApiError::ValidationError("customer id required".to_string()));
        }
        if amount <= Decimal::ZERO {
            tracing::info!(customer_id, %amount, "rejected loan without positive amount");
            return Err(ApiError::ValidationError("amount required".to_string()));
        }
        if term < 1 || term as u32 > MAX_TERM {
            tracing::info!(customer_id, term, "rejected loan with invalid term");
            return Err(ApiError::ValidationError("invalid term".to_string()));
        }

        let details = LoanDetails::originate(
            customer_id,
            amount,
            term as u32,
            Utc::now(),
            self.settings.repayment_frequency,
        )
        .map_err(|e| {
            tracing::info!(customer_id, %amount, term, error = %e, "rejected loan schedule");
            match e {
                ScheduleError::AmountTooSmall => {
                    ApiError::ValidationError("amount too small for term".to_string())
                }
                ScheduleError::InvalidTerm | ScheduleError::DueDateOutOfRange => {
                    ApiError::ValidationError("invalid term".to_string())
                }
            }
        })?;

        match timeout(self.settings.transaction_timeout, self.repo.create_loan(&details)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(customer_id, error = %e, "failed to create loan");
                return Err(ApiError::InternalError(e.to_string()));
            }
            Err(_) => {
                tracing::error!(customer_id, "loan creation timed out");
                return Err(ApiError::timed_out());
            }
        }

        tracing::info!(
            loan_id = %details.loan.id,
            customer_id,
            %amount,
            term,
            "loan created"
        );
        Ok(details)
    }

    /// Move a PENDING loan to APPROVED
    pub async fn approve_loan(&self, loan_id: &str) -> ApiResult<()> {
        if loan_id.trim().is_empty() {
            return Err(ApiError::ValidationError("loan id required".to_string()));
        }
        let loan_id = repository::parse_id(loan_id, "loan")?;

        let deadline = Instant::now() + self.settings.transaction_timeout;
        let mut tx = repository::begin_until(&*self.repo, TRANSITION_ISOLATION, deadline).await?;
        let outcome = timeout_at(deadline, self.approve_within(&mut tx, loan_id))
            .await
            .unwrap_or_else(|_| Err(ApiError::timed_out()));

        repository::finish(tx, outcome).await?;
        tracing::info!(%loan_id, "loan approved");
        Ok(())
    }

    async fn approve_within(&self, tx: &mut R::Tx, loan_id: Uuid) -> ApiResult<()> {
        let loan = self
            .repo
            .loan_by_id(tx, loan_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("loan not found".to_string()))?;

        if !loan.status.can_transition_to(LoanStatus::Approved) {
            tracing::warn!(%loan_id, status = loan.status.as_str(), "loan can not be approved");
            return Err(ApiError::Conflict("loan invalid status".to_string()));
        }

        self.repo
            .update_loan_status(tx, loan_id, LoanStatus::Approved)
            .await?;
        Ok(())
    }

    /// All loans of a customer with repayments in installment order
    pub async fn loans_for_customer(&self, customer_id: &str) -> ApiResult<Vec<LoanDetails>> {
        let mut loans = timeout(
            self.settings.transaction_timeout,
            self.repo.loans_for_customer(customer_id),
        )
        .await
        .map_err(|_| ApiError::timed_out())?
        .map_err(|e| {
            tracing::error!(customer_id, error = %e, "failed to get loans");
            ApiError::InternalError(e.to_string())
        })?;

        for loan in &mut loans {
            loan.sort_repayments();
        }
        Ok(loans)
    }
}
