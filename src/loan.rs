//! Loan and repayment models for the loan service
use chrono::Duration;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Decimal places each installment is truncated to before the last one
/// absorbs the remainder.
pub const INSTALLMENT_SCALE: u32 = 2;

/// Longest schedule a single loan may carry
pub const MAX_TERM: u32 = 1200;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Pending,
    Approved,
    Paid,
}

impl LoanStatus {
    /// PENDING -> APPROVED -> PAID, nothing else.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Approved) | (LoanStatus::Approved, LoanStatus::Paid)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Paid => "PAID",
        }
    }
}

/// Repayment status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RepaymentStatus {
    Pending,
    Paid,
}

/// Loan model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "kebab-case")]
pub struct Loan {
    pub id: Uuid,
    pub customer_id: String,
    #[sqlx(rename = "amount")]
    pub total_amount: Decimal,
    pub term: i32,
    pub status: LoanStatus,
    pub start_date: DateTime<Utc>,
    #[serde(rename = "created-timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated-timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A single scheduled installment of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "kebab-case")]
pub struct Repayment {
    pub id: Uuid,
    #[sqlx(rename = "num")]
    pub number: i32,
    pub loan_id: Uuid,
    #[serde(rename = "due-amount")]
    pub amount: Decimal,
    pub status: RepaymentStatus,
    pub due_date: DateTime<Utc>,
    #[serde(rename = "created-timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated-timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A loan together with its repayment schedule, ordered by installment number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub repayments: Vec<Repayment>,
}

impl LoanDetails {
    /// Build a PENDING loan and its PENDING schedule starting at `start`.
    ///
    /// Callers validate `total_amount > 0` beforehand.
    pub fn originate(
        customer_id: &str,
        total_amount: Decimal,
        term: u32,
        start: DateTime<Utc>,
        frequency: Duration,
    ) -> Result<Self, ScheduleError> {
        let loan_id = Uuid::new_v4();
        let repayments = build_schedule(loan_id, total_amount, term, start, frequency)?;
        let loan = Loan {
            id: loan_id,
            customer_id: customer_id.to_string(),
            total_amount,
            term: term as i32,
            status: LoanStatus::Pending,
            start_date: start,
            created_at: start,
            updated_at: start,
        };

        Ok(Self { loan, repayments })
    }

    pub fn sort_repayments(&mut self) {
        self.repayments.sort_by_key(|r| r.number);
    }
}

/// Reasons a schedule can not be generated
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("term must be between 1 and {}", MAX_TERM)]
    InvalidTerm,

    #[error("amount does not cover one cent per installment")]
    AmountTooSmall,

    #[error("due dates fall outside the supported calendar range")]
    DueDateOutOfRange,
}

/// Smallest amount a single installment may carry
pub fn minimum_installment() -> Decimal {
    Decimal::new(1, INSTALLMENT_SCALE)
}

/// Split `total` into `term` installments.
///
/// Every installment but the last is `total / term` truncated to
/// [`INSTALLMENT_SCALE`] places; the last takes whatever is left so the
/// installments always sum to `total`. A `total` below one cent per
/// installment yields zero-amount installments; [`build_schedule`] rejects it.
pub fn split_installments(total: Decimal, term: u32) -> Vec<Decimal> {
    if term == 0 {
        return Vec::new();
    }

    let base = (total / Decimal::from(term))
        .round_dp_with_strategy(INSTALLMENT_SCALE, RoundingStrategy::ToZero);
    let mut amounts = vec![base; term as usize];
    let last = total - base * Decimal::from(term - 1);
    amounts[term as usize - 1] = last;
    amounts
}

/// Generate installments numbered 1..=term, the k-th due `start + k * frequency`.
///
/// All bounds are checked before anything is allocated.
pub fn build_schedule(
    loan_id: Uuid,
    total: Decimal,
    term: u32,
    start: DateTime<Utc>,
    frequency: Duration,
) -> Result<Vec<Repayment>, ScheduleError> {
    if term == 0 || term > MAX_TERM {
        return Err(ScheduleError::InvalidTerm);
    }
    if total < minimum_installment() * Decimal::from(term) {
        return Err(ScheduleError::AmountTooSmall);
    }
    // Every earlier due date lies between `start` and the last one.
    frequency
        .checked_mul(term as i32)
        .and_then(|span| start.checked_add_signed(span))
        .ok_or(ScheduleError::DueDateOutOfRange)?;

    Ok(split_installments(total, term)
        .into_iter()
        .enumerate()
        .map(|(idx, amount)| {
            let number = idx as i32 + 1;
            Repayment {
                id: Uuid::new_v4(),
                number,
                loan_id,
                amount,
                status: RepaymentStatus::Pending,
                due_date: start + frequency * number,
                created_at: start,
                updated_at: start,
            }
        })
        .collect())
}

/// Request to create a new loan
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateLoanRequest {
    pub amount: Decimal,
    pub term: i32,
}

/// Request to approve a pending loan
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApproveLoanRequest {
    pub loan_id: String,
}

/// Request to pay one installment
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RepaymentRequest {
    pub repayment_id: String,
    pub amount: Decimal,
}

/// Response listing a customer's loans
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanListResponse {
    pub loans: Vec<LoanDetails>,
}
