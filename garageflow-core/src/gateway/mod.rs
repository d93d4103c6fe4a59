//! Boundaries to the outside world: persistence and document delivery.
//!
//! The core never talks to a database or a messaging provider directly. It
//! goes through these traits, which take the tenant id explicitly on every
//! call and hand back strongly typed models.

pub mod delivery;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::models::{
    EstimateItem, EstimateTotals, Estimate, Invoice, InvoiceStatus, Job, JobStatus, Payment,
    PaymentMethod,
};

pub use delivery::{DeliveryError, DeliveryGateway, LogDelivery};
pub use memory::InMemoryGateway;
pub use postgres::PgGateway;

/// Result type for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, PersistenceError>;

/// Bounds a gateway call; a call still pending after `limit` is reported as
/// [`PersistenceError::Timeout`] and dropped.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PersistenceError::Timeout(limit)),
    }
}

/// Persistence operations the lifecycle and billing engine relies on.
///
/// Implementations must map rows into the typed models eagerly and must
/// scope every query to `tenant_id`.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Loads a single job.
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> GatewayResult<Option<Job>>;

    /// Lists every job of a tenant, oldest first.
    async fn list_jobs(&self, tenant_id: Uuid) -> GatewayResult<Vec<Job>>;

    /// Writes a job's status.
    async fn save_job_status(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
    ) -> GatewayResult<()>;

    /// Loads the estimate of a job with its items in submission order.
    async fn load_estimate(&self, tenant_id: Uuid, job_id: Uuid)
        -> GatewayResult<Option<Estimate>>;

    /// Replaces the item list of an estimate together with its recomputed
    /// (already rounded) totals.
    async fn save_estimate_items(
        &self,
        tenant_id: Uuid,
        estimate_id: Uuid,
        items: &[EstimateItem],
        totals: &EstimateTotals,
    ) -> GatewayResult<()>;

    /// Marks an estimate read-only.
    async fn lock_estimate(&self, tenant_id: Uuid, estimate_id: Uuid) -> GatewayResult<()>;

    /// Loads the invoice generated for a job, if any.
    async fn load_invoice_by_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Invoice>>;

    /// Loads an invoice by id.
    async fn load_invoice(&self, tenant_id: Uuid, invoice_id: Uuid)
        -> GatewayResult<Option<Invoice>>;

    /// Upserts an invoice keyed on its job id.
    ///
    /// If an invoice already exists for `invoice.job_id` it is left untouched
    /// and returned instead of the argument.
    async fn save_invoice(&self, tenant_id: Uuid, invoice: &Invoice) -> GatewayResult<Invoice>;

    /// Writes the mutable payment counters of an invoice.
    async fn update_invoice_balance(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> GatewayResult<()>;

    /// Appends a payment record.
    async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> GatewayResult<Payment>;

    /// Lists the payments of an invoice, oldest first.
    async fn list_payments(&self, tenant_id: Uuid, invoice_id: Uuid)
        -> GatewayResult<Vec<Payment>>;

    /// Lists `(tenant_id, invoice_id)` for every invoice whose stored paid
    /// amount differs from the sum of its payments, oldest first, across
    /// tenants. Used by the reconciliation worker.
    async fn list_drifted_invoices(&self, limit: i64) -> GatewayResult<Vec<(Uuid, Uuid)>>;
}
