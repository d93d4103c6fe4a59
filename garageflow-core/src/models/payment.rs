use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sqlx(rename = "cash")]
    Cash,
    #[sqlx(rename = "card")]
    Card,
    #[sqlx(rename = "upi")]
    Upi,
    #[sqlx(rename = "bank_transfer")]
    BankTransfer,
    #[sqlx(rename = "other")]
    Other,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Upi => write!(f, "upi"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
            PaymentMethod::Other => write!(f, "other"),
        }
    }
}

/// Payment model. Append-only: a recorded payment is never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    /// Unique identifier for the payment
    pub id: Uuid,

    /// Garage (tenant) that received the payment
    pub tenant_id: Uuid,

    /// Invoice the payment is applied to
    pub invoice_id: Uuid,

    /// Amount received, always positive
    pub amount: Decimal,

    /// Payment method
    pub method: PaymentMethod,

    /// Timestamp when the payment was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Sum of `payments`, the source of truth for an invoice's paid amount.
pub fn total_paid(payments: &[Payment]) -> Decimal {
    payments.iter().map(|p| p.amount).sum()
}
