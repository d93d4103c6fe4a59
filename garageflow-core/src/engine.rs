use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::billing::{EstimateEditor, InvoiceGenerator, PaymentReconciler};
use crate::config::EngineConfig;
use crate::error::{GarageError, Result};
use crate::gateway::{with_deadline, DeliveryGateway, PersistenceGateway};
use crate::lifecycle::{BoardCoordinator, BoardEvent, BoardSnapshot, MoveOutcome};
use crate::models::{Estimate, EstimateItemInput, Invoice, InvoiceSummary, JobStatus, PaymentMethod};
use crate::sequencer::Sequencer;

/// Entry point of the lifecycle and billing engine.
///
/// Wires the board, the estimate editor, the invoice generator and the
/// payment reconciler to one persistence gateway. The estimate editor and
/// the invoice generator share the per-job sequencer so an edit can never
/// race the freeze of its estimate.
pub struct GarageEngine {
    gateway: Arc<dyn PersistenceGateway>,
    config: EngineConfig,
    board: BoardCoordinator,
    estimates: EstimateEditor,
    invoices: InvoiceGenerator,
    payments: PaymentReconciler,
}

impl GarageEngine {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        delivery: Arc<dyn DeliveryGateway>,
        config: EngineConfig,
    ) -> Self {
        let timeout = config.persistence_timeout;
        let jobs = Arc::new(Sequencer::new());

        Self {
            board: BoardCoordinator::new(gateway.clone(), timeout),
            estimates: EstimateEditor::new(gateway.clone(), jobs.clone(), timeout),
            invoices: InvoiceGenerator::new(gateway.clone(), delivery, jobs, timeout),
            payments: PaymentReconciler::new(
                gateway.clone(),
                config.overpayment_tolerance,
                timeout,
            ),
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to board events.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.board.subscribe()
    }

    /// Reloads a tenant's jobs and returns the board.
    pub async fn board(&self, tenant_id: Uuid) -> Result<BoardSnapshot> {
        self.board.load_tenant(tenant_id).await?;
        Ok(self.board.snapshot(tenant_id))
    }

    pub async fn move_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<MoveOutcome> {
        self.board.move_job(tenant_id, job_id, from, to).await
    }

    pub async fn estimate(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Estimate> {
        with_deadline(
            self.config.persistence_timeout,
            self.gateway.load_estimate(tenant_id, job_id),
        )
        .await?
        .ok_or(GarageError::EstimateNotFound(job_id))
    }

    pub async fn add_estimate_item(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        input: EstimateItemInput,
    ) -> Result<Estimate> {
        self.estimates
            .add_estimate_item(tenant_id, job_id, input)
            .await
    }

    pub async fn update_estimate_item(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        item_id: Uuid,
        input: EstimateItemInput,
    ) -> Result<Estimate> {
        self.estimates
            .update_estimate_item(tenant_id, job_id, item_id, input)
            .await
    }

    pub async fn remove_estimate_item(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        item_id: Uuid,
    ) -> Result<Estimate> {
        self.estimates
            .remove_estimate_item(tenant_id, job_id, item_id)
            .await
    }

    pub async fn generate_invoice(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Invoice> {
        self.invoices.generate_invoice(tenant_id, job_id).await
    }

    pub async fn apply_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Invoice> {
        self.payments
            .apply_payment(tenant_id, invoice_id, amount, method)
            .await
    }

    pub async fn reconcile_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice> {
        self.payments.reconcile_invoice(tenant_id, invoice_id).await
    }

    pub async fn invoice_summary(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<InvoiceSummary> {
        self.payments.invoice_summary(tenant_id, invoice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, LogDelivery};
    use crate::models::InvoiceStatus;
    use crate::testing::{d, item_input, job_in};

    async fn engine_with_job(status: JobStatus) -> (GarageEngine, Uuid, Uuid) {
        let gateway = InMemoryGateway::new();
        let tenant = Uuid::new_v4();
        let job = job_in(tenant, status);
        let job_id = job.id;
        gateway.seed_job(job, EngineConfig::default().tax_rate).await;

        let engine = GarageEngine::new(
            Arc::new(gateway),
            Arc::new(LogDelivery),
            EngineConfig::default(),
        );
        (engine, tenant, job_id)
    }

    /// Walks one job across the board from intake to completion:
    /// 1. received -> working -> ready
    /// 2. estimate edited, invoice generated
    /// 3. completion refused until the invoice is paid in full
    #[tokio::test]
    async fn test_job_lifecycle_end_to_end() {
        let (engine, tenant, job_id) = engine_with_job(JobStatus::Received).await;

        engine
            .move_job(tenant, job_id, JobStatus::Received, JobStatus::Working)
            .await
            .unwrap();
        engine
            .add_estimate_item(tenant, job_id, item_input("Clutch plate", 1, "2400.00", "800.00"))
            .await
            .unwrap();
        engine
            .move_job(tenant, job_id, JobStatus::Working, JobStatus::Ready)
            .await
            .unwrap();

        let invoice = engine.generate_invoice(tenant, job_id).await.unwrap();
        assert_eq!(invoice.total_amount, d("3776.00"));

        let err = engine
            .move_job(tenant, job_id, JobStatus::Ready, JobStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, GarageError::PaymentRequired { .. }));

        let paid = engine
            .apply_payment(tenant, invoice.id, d("3776.00"), PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);

        engine
            .move_job(tenant, job_id, JobStatus::Ready, JobStatus::Completed)
            .await
            .unwrap();

        let board = engine.board(tenant).await.unwrap();
        let completed = board
            .columns
            .iter()
            .find(|column| column.status == JobStatus::Completed)
            .unwrap();
        assert_eq!(completed.jobs.len(), 1);

        let err = engine
            .add_estimate_item(tenant, job_id, item_input("Coolant", 1, "300.00", "0"))
            .await
            .unwrap_err();
        assert!(matches!(err, GarageError::EstimateLocked { .. }));
    }

    #[tokio::test]
    async fn test_missing_estimate() {
        let (engine, tenant, _) = engine_with_job(JobStatus::Received).await;
        let err = engine.estimate(tenant, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GarageError::EstimateNotFound(_)));
    }
}
