use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::estimate::{round_money, Estimate, EstimateItem};

/// Invoice status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[sqlx(rename = "pending")]
    Pending,
    #[sqlx(rename = "partial")]
    Partial,
    #[sqlx(rename = "paid")]
    Paid,
}

impl InvoiceStatus {
    /// Status implied by what has been paid against what is still owed.
    pub fn derive(paid_amount: Decimal, balance: Decimal) -> Self {
        if balance <= Decimal::ZERO {
            InvoiceStatus::Paid
        } else if paid_amount > Decimal::ZERO {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Pending
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "pending"),
            InvoiceStatus::Partial => write!(f, "partial"),
            InvoiceStatus::Paid => write!(f, "paid"),
        }
    }
}

/// Frozen copy of an estimate line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub name: String,
    pub part_number: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub labor_cost: Decimal,
    pub line_total: Decimal,
}

impl From<&EstimateItem> for InvoiceLine {
    fn from(item: &EstimateItem) -> Self {
        InvoiceLine {
            name: item.name.clone(),
            part_number: item.part_number.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            labor_cost: item.labor_cost,
            line_total: round_money(Decimal::from(item.quantity) * item.unit_price + item.labor_cost),
        }
    }
}

/// Invoice model representing the billable document of a job.
///
/// Holds a snapshot of the estimate it was generated from; later estimate
/// edits never reach it. Only `paid_amount`, `balance` and `status` change
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: Uuid,

    /// Garage (tenant) that owns this invoice
    pub tenant_id: Uuid,

    /// Job being billed (at most one invoice per job)
    pub job_id: Uuid,

    /// Estimate the snapshot was taken from
    pub estimate_id: Uuid,

    /// Line items copied from the estimate
    pub items: Vec<InvoiceLine>,

    /// Parts plus labor, before tax
    pub subtotal: Decimal,

    /// Tax rate applied
    pub tax_rate: Decimal,

    /// Tax charged
    pub tax_amount: Decimal,

    /// Amount billed
    pub total_amount: Decimal,

    /// Sum of recorded payments
    pub paid_amount: Decimal,

    /// `total_amount - paid_amount`
    pub balance: Decimal,

    /// Payment status
    pub status: InvoiceStatus,

    /// Timestamp when the invoice was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the invoice was last updated
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Snapshots `estimate` into a new, unpaid invoice.
    pub fn from_estimate(estimate: &Estimate) -> Self {
        let totals = estimate.totals.rounded();
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            tenant_id: estimate.tenant_id,
            job_id: estimate.job_id,
            estimate_id: estimate.id,
            items: estimate.items.iter().map(InvoiceLine::from).collect(),
            subtotal: totals.subtotal(),
            tax_rate: estimate.tax_rate,
            tax_amount: totals.tax_amount,
            total_amount: totals.total_amount,
            paid_amount: Decimal::ZERO,
            balance: totals.total_amount,
            status: InvoiceStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether nothing remains to be paid.
    pub fn is_settled(&self) -> bool {
        self.balance <= Decimal::ZERO
    }

    /// Balance figures implied by `paid_amount`, without mutating the invoice.
    pub fn balance_for(&self, paid_amount: Decimal) -> (Decimal, InvoiceStatus) {
        let balance = self.total_amount - paid_amount;
        (balance, InvoiceStatus::derive(paid_amount, balance))
    }
}

/// Invoice together with the payments applied to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice: Invoice,
    pub payments: Vec<crate::models::Payment>,
}
