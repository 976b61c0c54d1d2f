//! Persistence boundary for loans and repayments
//!
//! Services see storage only through [`LoanRepository`]. In-transaction reads
//! and writes take an explicit transaction handle created by
//! [`LoanRepository::begin`]; the handle is consumed by exactly one of
//! `commit` or `rollback`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use crate::error::ApiError;
use crate::loan::{Loan, LoanDetails, LoanStatus, Repayment, RepaymentStatus};

mod memory;
mod postgres;

pub use memory::{InMemoryLoanRepository, InMemoryTransaction, TransactionStats};
pub use postgres::{PgLoanRepository, PgTransaction};

/// Storage errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// The engine aborted the transaction because of a concurrent writer
    #[error("serialization conflict: {0}")]
    SerializationConflict(String),

    #[error("no rows affected when updating {0}")]
    NoRowsAffected(&'static str),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());

        match code.as_deref() {
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => {
                RepositoryError::SerializationConflict(err.to_string())
            }
            _ => RepositoryError::Database(err),
        }
    }
}

/// Isolation requested when opening a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// An open unit of work
#[async_trait]
pub trait TransactionHandle: Send + Sized + 'static {
    async fn commit(self) -> Result<(), RepositoryError>;
    async fn rollback(self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LoanRepository: Send + Sync + 'static {
    type Tx: TransactionHandle;

    /// Persist a loan and its full schedule, all or nothing
    async fn create_loan(&self, details: &LoanDetails) -> Result<(), RepositoryError>;

    /// All loans owned by `customer_id`, each with its repayments
    async fn loans_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<LoanDetails>, RepositoryError>;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, RepositoryError>;

    /// Point read that also locks the row until the transaction ends
    async fn loan_by_id(
        &self,
        tx: &mut Self::Tx,
        loan_id: Uuid,
    ) -> Result<Option<Loan>, RepositoryError>;

    /// Point read that also locks the row until the transaction ends
    async fn repayment_by_id(
        &self,
        tx: &mut Self::Tx,
        repayment_id: Uuid,
    ) -> Result<Option<Repayment>, RepositoryError>;

    async fn repayments_for_loan(
        &self,
        tx: &mut Self::Tx,
        loan_id: Uuid,
    ) -> Result<Vec<Repayment>, RepositoryError>;

    async fn update_loan_status(
        &self,
        tx: &mut Self::Tx,
        loan_id: Uuid,
        status: LoanStatus,
    ) -> Result<(), RepositoryError>;

    /// Write the loan row without changing its status.
    ///
    /// Every repayment writes its loan, so two concurrent repayments of one
    /// loan can not both commit against a stale view of its installments.
    async fn touch_loan(&self, tx: &mut Self::Tx, loan_id: Uuid) -> Result<(), RepositoryError>;

    async fn update_repayment_status(
        &self,
        tx: &mut Self::Tx,
        repayment_id: Uuid,
        status: RepaymentStatus,
    ) -> Result<(), RepositoryError>;
}

/// Open a transaction, failing with a timeout error past `deadline`
pub(crate) async fn begin_until<R: LoanRepository>(
    repo: &R,
    isolation: IsolationLevel,
    deadline: Instant,
) -> Result<R::Tx, ApiError> {
    match timeout_at(deadline, repo.begin(isolation)).await {
        Ok(Ok(tx)) => Ok(tx),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to initiate transaction");
            Err(ApiError::InternalError(e.to_string()))
        }
        Err(_) => Err(ApiError::timed_out()),
    }
}

/// Commit on success, roll back on error. Exactly one of the two runs.
pub(crate) async fn finish<X: TransactionHandle, T>(
    tx: X,
    outcome: Result<T, ApiError>,
) -> Result<T, ApiError> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(|e| {
                tracing::error!(error = %e, "transaction commit failed");
                ApiError::from(e)
            })?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(error = %err, "rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

/// Parse a caller-supplied id; anything unparseable cannot exist
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("{} not found", what)))
}
