//! PostgreSQL implementation of the loan repository

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::{IsolationLevel, LoanRepository, RepositoryError, TransactionHandle};
use crate::loan::{Loan, LoanDetails, LoanStatus, Repayment, RepaymentStatus};

const LOAN_COLUMNS: &str =
    "id, customer_id, amount, term, status, start_date, created_at, updated_at";
const REPAYMENT_COLUMNS: &str =
    "id, num, loan_id, amount, status, due_date, created_at, updated_at";

/// Transaction handle backed by a pooled connection
pub struct PgTransaction {
    inner: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransactionHandle for PgTransaction {
    async fn commit(self) -> Result<(), RepositoryError> {
        self.inner.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.inner.rollback().await?;
        Ok(())
    }
}

/// Loan repository over a Postgres pool
#[derive(Clone)]
pub struct PgLoanRepository {
    db_pool: PgPool,
}

impl PgLoanRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl LoanRepository for PgLoanRepository {
    type Tx = PgTransaction;

    async fn create_loan(&self, details: &LoanDetails) -> Result<(), RepositoryError> {
        // Dropping `tx` on any early return rolls the whole loan back.
        let mut tx = self.db_pool.begin().await?;
        let loan = &details.loan;

        sqlx::query(
            r#"
            INSERT INTO loans (id, customer_id, amount, term, status, start_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(loan.id)
        .bind(&loan.customer_id)
        .bind(loan.total_amount)
        .bind(loan.term)
        .bind(loan.status)
        .bind(loan.start_date)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(loan_id = %loan.id, error = %e, "failed to insert loan");
            RepositoryError::from(e)
        })?;

        for repayment in &details.repayments {
            sqlx::query(
                r#"
                INSERT INTO repayments (id, num, loan_id, amount, status, due_date, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(repayment.id)
            .bind(repayment.number)
            .bind(loan.id)
            .bind(repayment.amount)
            .bind(repayment.status)
            .bind(repayment.due_date)
            .bind(repayment.created_at)
            .bind(repayment.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!(
                    loan_id = %loan.id,
                    number = repayment.number,
                    error = %e,
                    "failed to insert repayment"
                );
                RepositoryError::from(e)
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn loans_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<LoanDetails>, RepositoryError> {
        let loans = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE customer_id = $1 ORDER BY created_at, id",
            LOAN_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.db_pool)
        .await?;

        if loans.is_empty() {
            return Ok(Vec::new());
        }

        let loan_ids: Vec<Uuid> = loans.iter().map(|l| l.id).collect();
        let repayments = sqlx::query_as::<_, Repayment>(&format!(
            "SELECT {} FROM repayments WHERE loan_id = ANY($1) ORDER BY loan_id, num",
            REPAYMENT_COLUMNS
        ))
        .bind(&loan_ids)
        .fetch_all(&self.db_pool)
        .await?;

        let mut by_loan: HashMap<Uuid, Vec<Repayment>> = HashMap::new();
        for repayment in repayments {
            by_loan.entry(repayment.loan_id).or_default().push(repayment);
        }

        Ok(loans
            .into_iter()
            .map(|loan| {
                let repayments = by_loan.remove(&loan.id).unwrap_or_default();
                LoanDetails { loan, repayments }
            })
            .collect())
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<PgTransaction, RepositoryError> {
        let mut inner = self.db_pool.begin().await?;
        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_sql()
        ))
        .execute(&mut *inner)
        .await?;

        Ok(PgTransaction { inner })
    }

    async fn loan_by_id(
        &self,
        tx: &mut PgTransaction,
        loan_id: Uuid,
    ) -> Result<Option<Loan>, RepositoryError> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .fetch_optional(&mut *tx.inner)
        .await?;

        Ok(loan)
    }

    async fn repayment_by_id(
        &self,
        tx: &mut PgTransaction,
        repayment_id: Uuid,
    ) -> Result<Option<Repayment>, RepositoryError> {
        let repayment = sqlx::query_as::<_, Repayment>(&format!(
            "SELECT {} FROM repayments WHERE id = $1 FOR UPDATE",
            REPAYMENT_COLUMNS
        ))
        .bind(repayment_id)
        .fetch_optional(&mut *tx.inner)
        .await?;

        Ok(repayment)
    }

    async fn repayments_for_loan(
        &self,
        tx: &mut PgTransaction,
        loan_id: Uuid,
    ) -> Result<Vec<Repayment>, RepositoryError> {
        let repayments = sqlx::query_as::<_, Repayment>(&format!(
            "SELECT {} FROM repayments WHERE loan_id = $1 ORDER BY num",
            REPAYMENT_COLUMNS
        ))
        .bind(loan_id)
        .fetch_all(&mut *tx.inner)
        .await?;

        Ok(repayments)
    }

    async fn update_loan_status(
        &self,
        tx: &mut PgTransaction,
        loan_id: Uuid,
        status: LoanStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status)
            .bind(Utc::now())
            .bind(loan_id)
            .execute(&mut *tx.inner)
            .await?;

        if result.rows_affected() != 1 {
            return Err(RepositoryError::NoRowsAffected("loans"));
        }
        Ok(())
    }

    async fn touch_loan(
        &self,
        tx: &mut PgTransaction,
        loan_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE loans SET updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(loan_id)
            .execute(&mut *tx.inner)
            .await?;

        if result.rows_affected() != 1 {
            return Err(RepositoryError::NoRowsAffected("loans"));
        }
        Ok(())
    }

    async fn update_repayment_status(
        &self,
        tx: &mut PgTransaction,
        repayment_id: Uuid,
        status: RepaymentStatus,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE repayments SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(status)
                .bind(Utc::now())
                .bind(repayment_id)
                .execute(&mut *tx.inner)
                .await?;

        if result.rows_affected() != 1 {
            return Err(RepositoryError::NoRowsAffected("repayments"));
        }
        Ok(())
    }
}
