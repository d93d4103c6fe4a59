use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{GatewayResult, PersistenceGateway};
use crate::error::PersistenceError;
use crate::models::{
    Estimate, EstimateItem, EstimateTotals, Invoice, InvoiceStatus, Job, JobStatus, Payment,
    PaymentMethod,
};

#[derive(Default)]
struct Store {
    jobs: HashMap<Uuid, Job>,
    /// Keyed by job id.
    estimates: HashMap<Uuid, Estimate>,
    invoices: HashMap<Uuid, Invoice>,
    payments: Vec<Payment>,
}

/// Process-local persistence gateway.
///
/// Backs the server when no `DATABASE_URL` is configured, and the test
/// suite. Cloning shares the underlying store.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    store: Arc<RwLock<Store>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a job together with its empty estimate.
    pub async fn seed_job(&self, job: Job, tax_rate: Decimal) -> Estimate {
        let estimate = Estimate::empty(job.tenant_id, job.id, tax_rate);
        let mut store = self.store.write().await;
        store.estimates.insert(job.id, estimate.clone());
        store.jobs.insert(job.id, job);
        estimate
    }

    /// Number of invoices stored for `job_id`.
    pub async fn invoice_count(&self, job_id: Uuid) -> usize {
        self.store
            .read()
            .await
            .invoices
            .values()
            .filter(|invoice| invoice.job_id == job_id)
            .count()
    }

    /// Number of payments stored for `invoice_id`.
    pub async fn payment_count(&self, invoice_id: Uuid) -> usize {
        self.store
            .read()
            .await
            .payments
            .iter()
            .filter(|payment| payment.invoice_id == invoice_id)
            .count()
    }
}

fn missing(what: &str, id: Uuid) -> PersistenceError {
    PersistenceError::Database(format!("{} {} does not exist", what, id))
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> GatewayResult<Option<Job>> {
        let store = self.store.read().await;
        Ok(store
            .jobs
            .get(&job_id)
            .filter(|job| job.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_jobs(&self, tenant_id: Uuid) -> GatewayResult<Vec<Job>> {
        let store = self.store.read().await;
        let mut jobs: Vec<Job> = store
            .jobs
            .values()
            .filter(|job| job.tenant_id == tenant_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn save_job_status(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
    ) -> GatewayResult<()> {
        let mut store = self.store.write().await;
        let job = store
            .jobs
            .get_mut(&job_id)
            .filter(|job| job.tenant_id == tenant_id)
            .ok_or_else(|| missing("job", job_id))?;
        if job.status == JobStatus::Completed {
            return Err(PersistenceError::Conflict(format!(
                "job {} is missing or already completed",
                job_id
            )));
        }
        job.status = status;
        job.updated_at = Utc::now();
        debug!(job_id = %job_id, status = %status, "InMemory job status saved");
        Ok(())
    }

    async fn load_estimate(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Estimate>> {
        let store = self.store.read().await;
        Ok(store
            .estimates
            .get(&job_id)
            .filter(|estimate| estimate.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_estimate_items(
        &self,
        tenant_id: Uuid,
        estimate_id: Uuid,
        items: &[EstimateItem],
        totals: &EstimateTotals,
    ) -> GatewayResult<()> {
        let mut store = self.store.write().await;
        let estimate = store
            .estimates
            .values_mut()
            .find(|estimate| estimate.id == estimate_id && estimate.tenant_id == tenant_id)
            .ok_or_else(|| missing("estimate", estimate_id))?;
        if estimate.locked {
            return Err(PersistenceError::Conflict(format!(
                "estimate {} is locked",
                estimate_id
            )));
        }
        estimate.items = items.to_vec();
        estimate.totals = *totals;
        estimate.updated_at = Utc::now();
        Ok(())
    }

    async fn lock_estimate(&self, tenant_id: Uuid, estimate_id: Uuid) -> GatewayResult<()> {
        let mut store = self.store.write().await;
        let estimate = store
            .estimates
            .values_mut()
            .find(|estimate| estimate.id == estimate_id && estimate.tenant_id == tenant_id)
            .ok_or_else(|| missing("estimate", estimate_id))?;
        estimate.locked = true;
        Ok(())
    }

    async fn load_invoice_by_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Invoice>> {
        let store = self.store.read().await;
        Ok(store
            .invoices
            .values()
            .find(|invoice| invoice.job_id == job_id && invoice.tenant_id == tenant_id)
            .cloned())
    }

    async fn load_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> GatewayResult<Option<Invoice>> {
        let store = self.store.read().await;
        Ok(store
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_invoice(&self, tenant_id: Uuid, invoice: &Invoice) -> GatewayResult<Invoice> {
        let mut store = self.store.write().await;
        if let Some(existing) = store
            .invoices
            .values()
            .find(|existing| existing.job_id == invoice.job_id && existing.tenant_id == tenant_id)
        {
            return Ok(existing.clone());
        }
        store.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn update_invoice_balance(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> GatewayResult<()> {
        let mut store = self.store.write().await;
        let invoice = store
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
            .ok_or_else(|| missing("invoice", invoice_id))?;
        invoice.paid_amount = paid_amount;
        invoice.balance = balance;
        invoice.status = status;
        invoice.updated_at = Utc::now();
        Ok(())
    }

    async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> GatewayResult<Payment> {
        let mut store = self.store.write().await;
        if !store
            .invoices
            .get(&invoice_id)
            .is_some_and(|invoice| invoice.tenant_id == tenant_id)
        {
            return Err(missing("invoice", invoice_id));
        }
        let payment = Payment {
            id: Uuid::new_v4(),
            tenant_id,
            invoice_id,
            amount,
            method,
            recorded_at: Utc::now(),
        };
        store.payments.push(payment.clone());
        Ok(payment)
    }

    async fn list_payments(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> GatewayResult<Vec<Payment>> {
        let store = self.store.read().await;
        Ok(store
            .payments
            .iter()
            .filter(|payment| payment.invoice_id == invoice_id && payment.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_drifted_invoices(&self, limit: i64) -> GatewayResult<Vec<(Uuid, Uuid)>> {
        let store = self.store.read().await;
        let mut drifted: Vec<&Invoice> = store
            .invoices
            .values()
            .filter(|invoice| {
                let paid: Decimal = store
                    .payments
                    .iter()
                    .filter(|payment| payment.invoice_id == invoice.id)
                    .map(|payment| payment.amount)
                    .sum();
                invoice.paid_amount != paid
            })
            .collect();
        drifted.sort_by_key(|invoice| invoice.created_at);
        Ok(drifted
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|invoice| (invoice.tenant_id, invoice.id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateJob;

    fn job(tenant_id: Uuid) -> Job {
        Job::new(
            tenant_id,
            CreateJob {
                customer_id: Uuid::new_v4(),
                vehicle_id: Uuid::new_v4(),
                mechanic_id: None,
                complaint: "Engine light on".to_string(),
                notes: None,
            },
        )
    }

    #[tokio::test]
    async fn test_queries_are_tenant_scoped() {
        let gateway = InMemoryGateway::new();
        let tenant = Uuid::new_v4();
        let job = job(tenant);
        let job_id = job.id;
        gateway.seed_job(job, Decimal::ZERO).await;

        assert!(gateway.load_job(tenant, job_id).await.unwrap().is_some());
        assert!(gateway.load_job(Uuid::new_v4(), job_id).await.unwrap().is_none());
        assert!(gateway
            .save_job_status(Uuid::new_v4(), job_id, JobStatus::Working)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_completed_job_status_is_not_overwritten() {
        let gateway = InMemoryGateway::new();
        let tenant = Uuid::new_v4();
        let mut job = job(tenant);
        job.status = JobStatus::Completed;
        let job_id = job.id;
        gateway.seed_job(job, Decimal::ZERO).await;

        let err = gateway
            .save_job_status(tenant, job_id, JobStatus::Ready)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Conflict(_)));

        let stored = gateway.load_job(tenant, job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_drifted_invoices_are_listed_by_payment_sum() {
        let gateway = InMemoryGateway::new();
        let tenant = Uuid::new_v4();
        let mut invoice_ids = Vec::new();
        for _ in 0..3 {
            let mut estimate = gateway.seed_job(job(tenant), Decimal::ZERO).await;
            estimate.totals.parts_total = Decimal::from(500);
            estimate.totals.total_amount = Decimal::from(500);
            let invoice = gateway
                .save_invoice(tenant, &Invoice::from_estimate(&estimate))
                .await
                .unwrap();
            invoice_ids.push(invoice.id);
        }
        assert!(gateway.list_drifted_invoices(10).await.unwrap().is_empty());

        gateway
            .record_payment(tenant, invoice_ids[1], Decimal::from(200), PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(
            gateway.list_drifted_invoices(10).await.unwrap(),
            vec![(tenant, invoice_ids[1])]
        );

        gateway
            .update_invoice_balance(
                tenant,
                invoice_ids[1],
                Decimal::from(200),
                Decimal::from(300),
                InvoiceStatus::Partial,
            )
            .await
            .unwrap();
        assert!(gateway.list_drifted_invoices(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_invoice_is_an_upsert_on_job() {
        let gateway = InMemoryGateway::new();
        let tenant = Uuid::new_v4();
        let job = job(tenant);
        let job_id = job.id;
        let estimate = gateway.seed_job(job, Decimal::ZERO).await;

        let first = gateway
            .save_invoice(tenant, &Invoice::from_estimate(&estimate))
            .await
            .unwrap();
        let second = gateway
            .save_invoice(tenant, &Invoice::from_estimate(&estimate))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(gateway.invoice_count(job_id).await, 1);
    }
}
