//! Installment repayment and loan settlement against the in-memory repository

use rust_decimal_macros::dec;
use std::sync::Arc;

use miniloan_server::config::LifecycleSettings;
use miniloan_server::error::ApiError;
use miniloan_server::loan::{LoanDetails, LoanStatus, RepaymentStatus};
use miniloan_server::loan_service::LoanService;
use miniloan_server::repayment_service::RepaymentService;
use miniloan_server::repository::InMemoryLoanRepository;

struct Harness {
    repo: Arc<InMemoryLoanRepository>,
    loans: LoanService<InMemoryLoanRepository>,
    repayments: RepaymentService<InMemoryLoanRepository>,
}

impl Harness {
    fn new() -> Self {
        let repo = Arc::new(InMemoryLoanRepository::new());
        let settings = LifecycleSettings::default();
        Self {
            loans: LoanService::new(repo.clone(), settings),
            repayments: RepaymentService::new(repo.clone(), settings),
            repo,
        }
    }

    /// Create and approve a loan for `customer`
    async fn approved_loan(
        &self,
        customer: &str,
        amount: rust_decimal::Decimal,
        term: i32,
    ) -> LoanDetails {
        let details = self.loans.create_loan(customer, amount, term).await.unwrap();
        self.loans
            .approve_loan(&details.loan.id.to_string())
            .await
            .unwrap();
        details
    }
}

#[tokio::test]
async fn test_repay_marks_installment_paid() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(100000), 2).await;
    let first = &details.repayments[0];

    h.repayments
        .repay("user1", &first.id.to_string(), dec!(50000))
        .await
        .unwrap();

    assert_eq!(
        h.repo.repayment(first.id).await.unwrap().status,
        RepaymentStatus::Paid
    );
    let stored = h.repo.loan_details(details.loan.id).await.unwrap();
    assert_eq!(stored.loan.status, LoanStatus::Approved);
    assert_eq!(stored.repayments[1].status, RepaymentStatus::Pending);
}

#[tokio::test]
async fn test_insufficient_amount_is_rejected() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(100000), 2).await;
    let first = &details.repayments[0];

    let result = h
        .repayments
        .repay("user1", &first.id.to_string(), dec!(49999.99))
        .await;

    assert!(matches!(result, Err(ApiError::Conflict(ref m)) if m == "amount not sufficient"));
    assert_eq!(
        h.repo.repayment(first.id).await.unwrap().status,
        RepaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_overpayment_is_accepted() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(300), 3).await;

    h.repayments
        .repay("user1", &details.repayments[0].id.to_string(), dec!(1000))
        .await
        .unwrap();

    assert_eq!(
        h.repo.repayment(details.repayments[0].id).await.unwrap().status,
        RepaymentStatus::Paid
    );
}

#[tokio::test]
async fn test_repay_requires_approved_loan() {
    let h = Harness::new();
    let details = h.loans.create_loan("user1", dec!(300), 3).await.unwrap();

    let result = h
        .repayments
        .repay("user1", &details.repayments[0].id.to_string(), dec!(100))
        .await;

    assert!(matches!(result, Err(ApiError::Conflict(ref m)) if m == "invalid loan status"));
    assert_eq!(
        h.repo.repayment(details.repayments[0].id).await.unwrap().status,
        RepaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_double_payment_is_rejected() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(300), 3).await;
    let id = details.repayments[0].id.to_string();

    h.repayments.repay("user1", &id, dec!(100)).await.unwrap();
    let second = h.repayments.repay("user1", &id, dec!(100)).await;

    assert!(matches!(second, Err(ApiError::Conflict(ref m)) if m == "already paid"));
}

#[tokio::test]
async fn test_concurrent_payments_of_same_installment() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(300), 3).await;
    let id = details.repayments[0].id.to_string();

    let (a, b) = tokio::join!(
        h.repayments.repay("user1", &id, dec!(100)),
        h.repayments.repay("user1", &id, dec!(100))
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(a, Err(ApiError::Conflict(_))) || matches!(b, Err(ApiError::Conflict(_))));
}

#[tokio::test]
async fn test_foreign_repayment_looks_missing() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(300), 3).await;
    let first = &details.repayments[0];

    let foreign = h
        .repayments
        .repay("user2", &first.id.to_string(), dec!(100))
        .await;
    let missing = h
        .repayments
        .repay("user2", &uuid::Uuid::new_v4().to_string(), dec!(100))
        .await;

    match (foreign, missing) {
        (Err(ApiError::NotFound(a)), Err(ApiError::NotFound(b))) => assert_eq!(a, b),
        other => panic!("expected two identical NotFound errors, got {:?}", other),
    }
    assert_eq!(
        h.repo.repayment(first.id).await.unwrap().status,
        RepaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_repay_input_validation() {
    let h = Harness::new();

    assert!(matches!(
        h.repayments.repay("user1", "", dec!(10)).await,
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        h.repayments
            .repay("user1", &uuid::Uuid::new_v4().to_string(), dec!(0))
            .await,
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        h.repayments.repay("user1", "garbage", dec!(10)).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_final_repayment_settles_loan_in_same_commit() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(100000), 2).await;

    h.repayments
        .repay("user1", &details.repayments[0].id.to_string(), dec!(50000))
        .await
        .unwrap();
    let committed_before = h.repo.transaction_stats().committed;

    h.repayments
        .repay("user1", &details.repayments[1].id.to_string(), dec!(50000))
        .await
        .unwrap();

    assert_eq!(h.repo.transaction_stats().committed, committed_before + 1);
    let stored = h.repo.loan_details(details.loan.id).await.unwrap();
    assert_eq!(stored.loan.status, LoanStatus::Paid);
    assert!(stored
        .repayments
        .iter()
        .all(|r| r.status == RepaymentStatus::Paid));
}

#[tokio::test]
async fn test_paid_loan_rejects_further_repayments() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(100), 1).await;
    let id = details.repayments[0].id.to_string();

    h.repayments.repay("user1", &id, dec!(100)).await.unwrap();
    let again = h.repayments.repay("user1", &id, dec!(100)).await;

    assert!(matches!(again, Err(ApiError::Conflict(ref m)) if m == "invalid loan status"));
}

#[tokio::test]
async fn test_end_to_end_lifecycle() {
    let h = Harness::new();
    let details = h.loans.create_loan("user1", dec!(10000), 3).await.unwrap();
    h.loans
        .approve_loan(&details.loan.id.to_string())
        .await
        .unwrap();

    for repayment in &details.repayments {
        h.repayments
            .repay("user1", &repayment.id.to_string(), repayment.amount)
            .await
            .unwrap();
    }

    let loans = h.loans.loans_for_customer("user1").await.unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].loan.status, LoanStatus::Paid);
    assert_eq!(loans[0].repayments.len(), 3);
    assert!(loans[0]
        .repayments
        .iter()
        .all(|r| r.status == RepaymentStatus::Paid));

    let stats = h.repo.transaction_stats();
    assert_eq!(stats.begun, stats.committed + stats.rolled_back);
    assert_eq!(stats.rolled_back, 0);
}

#[tokio::test]
async fn test_partial_repayment_writes_loan_row() {
    let h = Harness::new();
    let details = h.approved_loan("user1", dec!(300), 3).await;
    let before = h.repo.loan_details(details.loan.id).await.unwrap().loan;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    h.repayments
        .repay("user1", &details.repayments[0].id.to_string(), dec!(100))
        .await
        .unwrap();

    let after = h.repo.loan_details(details.loan.id).await.unwrap().loan;
    assert_eq!(after.status, LoanStatus::Approved);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn test_concurrent_repayments_of_different_installments_settle_loan() {
    let repo = Arc::new(InMemoryLoanRepository::new());
    let settings = LifecycleSettings::default();
    let loans = LoanService::new(repo.clone(), settings);
    let repayments = Arc::new(RepaymentService::new(repo.clone(), settings));

    let details = loans.create_loan("user1", dec!(200), 2).await.unwrap();
    loans
        .approve_loan(&details.loan.id.to_string())
        .await
        .unwrap();

    let handles: Vec<_> = details
        .repayments
        .iter()
        .map(|r| {
            let repayments = repayments.clone();
            let id = r.id.to_string();
            let amount = r.amount;
            tokio::spawn(async move { repayments.repay("user1", &id, amount).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = repo.loan_details(details.loan.id).await.unwrap();
    assert!(stored
        .repayments
        .iter()
        .all(|r| r.status == RepaymentStatus::Paid));
    assert_eq!(stored.loan.status, LoanStatus::Paid);
}
