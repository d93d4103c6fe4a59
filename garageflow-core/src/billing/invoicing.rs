use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::billing::totals::compute_totals;
use crate::error::{GarageError, Result};
use crate::gateway::delivery::deliver_invoice;
use crate::gateway::{with_deadline, DeliveryGateway, PersistenceGateway};
use crate::models::{Estimate, Invoice};
use crate::sequencer::Sequencer;

/// Freezes estimates into invoices, once per job.
pub struct InvoiceGenerator {
    gateway: Arc<dyn PersistenceGateway>,
    delivery: Arc<dyn DeliveryGateway>,
    jobs: Arc<Sequencer>,
    persistence_timeout: Duration,
}

impl InvoiceGenerator {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        delivery: Arc<dyn DeliveryGateway>,
        jobs: Arc<Sequencer>,
        persistence_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            delivery,
            jobs,
            persistence_timeout,
        }
    }

    /// Returns the job's invoice, generating it from the estimate if none
    /// exists yet.
    ///
    /// Safe to call any number of times, concurrently included: the job's
    /// sequencer turn serialises callers in this process and the gateway
    /// upserts on job id. Job status is not checked here.
    #[instrument(skip(self))]
    pub async fn generate_invoice(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Invoice> {
        let _turn = self.jobs.acquire(job_id).await;

        let existing = with_deadline(
            self.persistence_timeout,
            self.gateway.load_invoice_by_job(tenant_id, job_id),
        )
        .await?;

        if let Some(invoice) = existing {
            info!(invoice_id = %invoice.id, "Invoice already exists for job");
            self.relock_estimate(tenant_id, job_id).await?;
            return Ok(invoice);
        }

        let estimate = with_deadline(
            self.persistence_timeout,
            self.gateway.load_estimate(tenant_id, job_id),
        )
        .await?
        .ok_or(GarageError::EstimateNotFound(job_id))?;

        let snapshot = Invoice::from_estimate(&Self::with_fresh_totals(estimate.clone())?);

        let stored = with_deadline(
            self.persistence_timeout,
            self.gateway.save_invoice(tenant_id, &snapshot),
        )
        .await?;

        if stored.id != snapshot.id {
            // Another writer won the upsert.
            info!(invoice_id = %stored.id, "Invoice created concurrently, returning stored row");
            self.relock_estimate(tenant_id, job_id).await?;
            return Ok(stored);
        }

        // The invoice now exists, which already makes the estimate read-only;
        // the flag is repaired on the next call if setting it fails.
        if let Err(e) = with_deadline(
            self.persistence_timeout,
            self.gateway.lock_estimate(tenant_id, estimate.id),
        )
        .await
        {
            warn!(estimate_id = %estimate.id, "Failed to lock estimate after invoicing: {}", e);
        }

        info!(
            invoice_id = %stored.id,
            total = %stored.total_amount,
            lines = stored.items.len(),
            "Invoice generated"
        );

        let delivery = self.delivery.clone();
        let invoice = stored.clone();
        tokio::spawn(async move {
            deliver_invoice(delivery.as_ref(), &invoice).await;
        });

        Ok(stored)
    }

    /// Recomputes totals from the items so the invoice never carries stale
    /// stored figures.
    fn with_fresh_totals(mut estimate: Estimate) -> Result<Estimate> {
        let totals = compute_totals(&estimate.items, estimate.tax_rate)?.rounded();
        if totals != estimate.totals {
            warn!(
                estimate_id = %estimate.id,
                stored = %estimate.totals.total_amount,
                computed = %totals.total_amount,
                "Stored estimate totals were stale"
            );
        }
        estimate.totals = totals;
        Ok(estimate)
    }

    async fn relock_estimate(&self, tenant_id: Uuid, job_id: Uuid) -> Result<()> {
        let estimate = with_deadline(
            self.persistence_timeout,
            self.gateway.load_estimate(tenant_id, job_id),
        )
        .await?;

        if let Some(estimate) = estimate.filter(|estimate| !estimate.locked) {
            warn!(estimate_id = %estimate.id, "Invoiced estimate was unlocked, locking");
            with_deadline(
                self.persistence_timeout,
                self.gateway.lock_estimate(tenant_id, estimate.id),
            )
            .await?;
        }
        Ok(())
    }
}
