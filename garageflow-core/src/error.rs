//! Error taxonomy for the job lifecycle and billing engine.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::JobStatus;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, GarageError>;

/// Failure of the persistence gateway. Always transient from the caller's
/// point of view: the operation may be retried.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(String),

    #[error("persistence call timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("write conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                PersistenceError::Unavailable(e.to_string())
            }
            other => PersistenceError::Database(other.to_string()),
        }
    }
}

/// Every way a core operation can be rejected.
///
/// Validation variants leave state untouched and are not worth retrying.
/// `Persistence` is transient.
#[derive(Debug, Clone, Error)]
pub enum GarageError {
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("cannot complete job {job_id}: {}", payment_required_reason(.invoice_id, .outstanding))]
    PaymentRequired {
        job_id: Uuid,
        invoice_id: Option<Uuid>,
        total_amount: Decimal,
        paid_amount: Decimal,
        outstanding: Decimal,
    },

    #[error("estimate {estimate_id} is locked and can no longer be edited")]
    EstimateLocked { estimate_id: Uuid },

    #[error("invalid estimate item: {0}")]
    InvalidItem(String),

    #[error("tax rate {0} is outside the range 0 to 1")]
    InvalidTaxRate(Decimal),

    #[error("payment of ₹{amount} exceeds outstanding balance of ₹{balance} on invoice {invoice_id}")]
    Overpayment {
        invoice_id: Uuid,
        amount: Decimal,
        balance: Decimal,
    },

    #[error("invalid payment amount ₹{amount}: {reason}")]
    InvalidPaymentAmount { amount: Decimal, reason: String },

    #[error("job {job_id} is {actual}, not {expected}")]
    StaleStatus {
        job_id: Uuid,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("no estimate exists for job {0}")]
    EstimateNotFound(Uuid),

    #[error("invoice {0} not found")]
    InvoiceNotFound(Uuid),

    #[error("estimate item {0} not found")]
    ItemNotFound(Uuid),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

fn payment_required_reason(invoice_id: &Option<Uuid>, outstanding: &Decimal) -> String {
    match invoice_id {
        Some(_) => format!("₹{} outstanding", outstanding),
        None => "no invoice has been generated".to_string(),
    }
}

impl GarageError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GarageError::Persistence(_))
    }
}
