//! In-memory loan repository
//!
//! A transaction holds the table lock for its whole lifetime and works on a
//! private copy of the tables, so transactions are serializable and a
//! rollback is just dropping the copy.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{IsolationLevel, LoanRepository, RepositoryError, TransactionHandle};
use crate::loan::{Loan, LoanDetails, LoanStatus, Repayment, RepaymentStatus};

#[derive(Default, Clone)]
struct Tables {
    loans: HashMap<Uuid, Loan>,
    repayments: HashMap<Uuid, Repayment>,
}

#[derive(Default)]
struct Counters {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

/// Snapshot of how transactions ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

/// Thread-safe in-memory repository for tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryLoanRepository {
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
    fail_on_repayment_number: Option<i32>,
    read_latency: Option<Duration>,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_loan` fail while inserting the repayment numbered `number`
    pub fn failing_on_repayment(mut self, number: i32) -> Self {
        self.fail_on_repayment_number = Some(number);
        self
    }

    /// Delay every in-transaction point read
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.counters.begun.load(Ordering::SeqCst),
            committed: self.counters.committed.load(Ordering::SeqCst),
            rolled_back: self.counters.rolled_back.load(Ordering::SeqCst),
        }
    }

    /// Committed state of one loan, outside any transaction
    pub async fn loan_details(&self, loan_id: Uuid) -> Option<LoanDetails> {
        let tables = self.tables.lock().await;
        tables
            .loans
            .get(&loan_id)
            .map(|loan| details_for(&tables, loan.clone()))
    }

    /// Committed state of one repayment, outside any transaction
    pub async fn repayment(&self, repayment_id: Uuid) -> Option<Repayment> {
        self.tables.lock().await.repayments.get(&repayment_id).cloned()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.read_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn details_for(tables: &Tables, loan: Loan) -> LoanDetails {
    let mut repayments: Vec<Repayment> = tables
        .repayments
        .values()
        .filter(|r| r.loan_id == loan.id)
        .cloned()
        .collect();
    repayments.sort_by_key(|r| r.number);
    LoanDetails { loan, repayments }
}

/// Transaction over the in-memory tables
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    counters: Arc<Counters>,
}

#[async_trait]
impl TransactionHandle for InMemoryTransaction {
    async fn commit(mut self) -> Result<(), RepositoryError> {
        *self.guard = std::mem::take(&mut self.working);
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanRepository {
    type Tx = InMemoryTransaction;

    async fn create_loan(&self, details: &LoanDetails) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let mut staged = (*tables).clone();

        staged.loans.insert(details.loan.id, details.loan.clone());
        for repayment in &details.repayments {
            if self.fail_on_repayment_number == Some(repayment.number) {
                return Err(RepositoryError::Storage(format!(
                    "insert of repayment {} failed",
                    repayment.number
                )));
            }
            staged.repayments.insert(repayment.id, repayment.clone());
        }

        *tables = staged;
        Ok(())
    }

    async fn loans_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<LoanDetails>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut loans: Vec<Loan> = tables
            .loans
            .values()
            .filter(|l| l.customer_id == customer_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(loans
            .into_iter()
            .map(|loan| details_for(&tables, loan))
            .collect())
    }

    async fn begin(&self, _isolation: IsolationLevel) -> Result<InMemoryTransaction, RepositoryError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = (*guard).clone();
        self.counters.begun.fetch_add(1, Ordering::SeqCst);

        Ok(InMemoryTransaction {
            guard,
            working,
            counters: self.counters.clone(),
        })
    }

    async fn loan_by_id(
        &self,
        tx: &mut InMemoryTransaction,
        loan_id: Uuid,
    ) -> Result<Option<Loan>, RepositoryError> {
        self.simulate_latency().await;
        Ok(tx.working.loans.get(&loan_id).cloned())
    }

    async fn repayment_by_id(
        &self,
        tx: &mut InMemoryTransaction,
        repayment_id: Uuid,
    ) -> Result<Option<Repayment>, RepositoryError> {
        self.simulate_latency().await;
        Ok(tx.working.repayments.get(&repayment_id).cloned())
    }

    async fn repayments_for_loan(
        &self,
        tx: &mut InMemoryTransaction,
        loan_id: Uuid,
    ) -> Result<Vec<Repayment>, RepositoryError> {
        let loan = tx
            .working
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or(RepositoryError::NoRowsAffected("loans"))?;
        Ok(details_for(&tx.working, loan).repayments)
    }

    async fn update_loan_status(
        &self,
        tx: &mut InMemoryTransaction,
        loan_id: Uuid,
        status: LoanStatus,
    ) -> Result<(), RepositoryError> {
        let loan = tx
            .working
            .loans
            .get_mut(&loan_id)
            .ok_or(RepositoryError::NoRowsAffected("loans"))?;
        loan.status = status;
        loan.updated_at = Utc::now();
        Ok(())
    }

    async fn touch_loan(
        &self,
        tx: &mut InMemoryTransaction,
        loan_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let loan = tx
            .working
            .loans
            .get_mut(&loan_id)
            .ok_or(RepositoryError::NoRowsAffected("loans"))?;
        loan.updated_at = Utc::now();
        Ok(())
    }

    async fn update_repayment_status(
        &self,
        tx: &mut InMemoryTransaction,
        repayment_id: Uuid,
        status: RepaymentStatus,
    ) -> Result<(), RepositoryError> {
        let repayment = tx
            .working
            .repayments
            .get_mut(&repayment_id)
            .ok_or(RepositoryError::NoRowsAffected("repayments"))?;
        repayment.status = status;
        repayment.updated_at = Utc::now();
        Ok(())
    }
}
