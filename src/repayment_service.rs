//! Repayment service layer - paying installments and settling loans

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use crate::config::LifecycleSettings;
use crate::error::{ApiError, ApiResult};
use crate::loan::{LoanStatus, RepaymentStatus};
use crate::loan_service::TRANSITION_ISOLATION;
use crate::repository::{self, LoanRepository};

/// Applies repayments against approved loans
pub struct RepaymentService<R> {
    repo: Arc<R>,
    settings: LifecycleSettings,
}

impl<R: LoanRepository> RepaymentService<R> {
    pub fn new(repo: Arc<R>, settings: LifecycleSettings) -> Self {
        Self { repo, settings }
    }

    /// Pay one installment on behalf of `customer_id`.
    ///
    /// The installment and, when it is the last one outstanding, its loan move
    /// to PAID in the same transaction.
    pub async fn repay(
        &self,
        customer_id: &str,
        repayment_id: &str,
        amount: Decimal,
    ) -> ApiResult<()> {
        if repayment_id.trim().is_empty() {
            return Err(ApiError::ValidationError(
                "repayment id must be provided".to_string(),
            ));
        }
        if amount.is_zero() {
            return Err(ApiError::ValidationError("amount must be provided".to_string()));
        }
        let repayment_id = repository::parse_id(repayment_id, "repayment")?;

        let deadline = Instant::now() + self.settings.transaction_timeout;
        let mut tx = repository::begin_until(&*self.repo, TRANSITION_ISOLATION, deadline).await?;
        let outcome = timeout_at(
            deadline,
            self.repay_within(&mut tx, customer_id, repayment_id, amount),
        )
        .await
        .unwrap_or_else(|_| Err(ApiError::timed_out()));

        let loan_settled = repository::finish(tx, outcome).await?;
        tracing::info!(%repayment_id, customer_id, loan_settled, "repayment applied");
        Ok(())
    }

    async fn repay_within(
        &self,
        tx: &mut R::Tx,
        customer_id: &str,
        repayment_id: Uuid,
        amount: Decimal,
    ) -> ApiResult<bool> {
        let repayment = self
            .repo
            .repayment_by_id(tx, repayment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("repayment not found".to_string()))?;

        let loan = self
            .repo
            .loan_by_id(tx, repayment.loan_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(%repayment_id, loan_id = %repayment.loan_id, "repayment without loan");
                ApiError::InternalError(format!("loan {} missing", repayment.loan_id))
            })?;

        // Foreign repayments look exactly like missing ones.
        if loan.customer_id != customer_id {
            tracing::warn!(%repayment_id, customer_id, "repayment does not belong to customer");
            return Err(ApiError::NotFound("repayment not found".to_string()));
        }

        if loan.status != LoanStatus::Approved {
            tracing::info!(loan_id = %loan.id, status = loan.status.as_str(), "loan not repayable");
            return Err(ApiError::Conflict("invalid loan status".to_string()));
        }

        if repayment.status != RepaymentStatus::Pending {
            tracing::info!(%repayment_id, "repayment already paid");
            return Err(ApiError::Conflict("already paid".to_string()));
        }

        if amount < repayment.amount {
            tracing::info!(%repayment_id, %amount, due = %repayment.amount, "insufficient repayment");
            return Err(ApiError::Conflict("amount not sufficient".to_string()));
        }

        self.repo
            .update_repayment_status(tx, repayment_id, RepaymentStatus::Paid)
            .await?;

        let paid = self
            .repo
            .repayments_for_loan(tx, loan.id)
            .await?
            .iter()
            .filter(|r| r.status == RepaymentStatus::Paid)
            .count();

        if paid as i64 != i64::from(loan.term) {
            self.repo.touch_loan(tx, loan.id).await?;
            return Ok(false);
        }

        self.repo
            .update_loan_status(tx, loan.id, LoanStatus::Paid)
            .await?;
        tracing::info!(loan_id = %loan.id, "all repayments paid, loan settled");
        Ok(true)
    }
}
