//! Test doubles shared by the unit test modules.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify, Semaphore};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::gateway::{DeliveryError, DeliveryGateway, GatewayResult, InMemoryGateway, PersistenceGateway};
use crate::models::{
    CreateJob, Estimate, EstimateItem, EstimateItemInput, EstimateTotals, Invoice, InvoiceStatus,
    Job, JobStatus, Payment, PaymentMethod,
};

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn item_input(name: &str, quantity: i32, unit_price: &str, labor_cost: &str) -> EstimateItemInput {
    EstimateItemInput {
        name: name.to_string(),
        part_number: None,
        quantity,
        unit_price: d(unit_price),
        labor_cost: d(labor_cost),
    }
}

pub fn job_in(tenant_id: Uuid, status: JobStatus) -> Job {
    let mut job = Job::new(
        tenant_id,
        CreateJob {
            customer_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            mechanic_id: None,
            complaint: "Grinding noise when braking".to_string(),
            notes: None,
        },
    );
    job.status = status;
    job
}

/// Delivery channel whose every call fails.
#[derive(Default)]
pub struct FailingDelivery {
    attempts: AtomicUsize,
    notify: Notify,
}

impl FailingDelivery {
    /// Waits until at least `n` delivery calls have been made.
    pub async fn wait_for_attempts(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.attempts.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }

    fn attempt(&self, channel: &'static str) -> DeliveryError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        DeliveryError {
            channel,
            reason: "provider unreachable".to_string(),
        }
    }
}

#[async_trait]
impl DeliveryGateway for FailingDelivery {
    async fn export_pdf(&self, _invoice: &Invoice) -> Result<String, DeliveryError> {
        Err(self.attempt("pdf"))
    }

    async fn send_whatsapp(&self, _invoice: &Invoice, _message: &str) -> Result<(), DeliveryError> {
        Err(self.attempt("whatsapp"))
    }
}

/// Gateway operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SaveJobStatus,
    SaveEstimateItems,
    LockEstimate,
    SaveInvoice,
    UpdateInvoiceBalance,
    RecordPayment,
}

struct StatusGate {
    permits: Arc<Semaphore>,
    entered: mpsc::UnboundedSender<JobStatus>,
}

/// Lets a test observe and release held `save_job_status` calls.
pub struct GateHandle {
    permits: Arc<Semaphore>,
    entered: mpsc::UnboundedReceiver<JobStatus>,
}

impl GateHandle {
    /// Waits until a status save reaches the gateway; returns its status.
    pub async fn entered(&mut self) -> JobStatus {
        self.entered.recv().await.expect("gate sender dropped")
    }

    /// Lets `n` held saves proceed.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

/// In-memory gateway with injectable failures and a hold on status saves.
#[derive(Default)]
pub struct ScriptedGateway {
    pub inner: InMemoryGateway,
    failures: Mutex<HashMap<Op, usize>>,
    gate: Mutex<Option<StatusGate>>,
    status_writes: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail(&self, op: Op, times: usize) {
        self.failures.lock().unwrap().insert(op, times);
    }

    /// Holds every status save until released through the handle.
    pub fn hold_status_saves(&self) -> GateHandle {
        let permits = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        *self.gate.lock().unwrap() = Some(StatusGate {
            permits: permits.clone(),
            entered: tx,
        });
        GateHandle {
            permits,
            entered: rx,
        }
    }

    /// Number of status saves that reached the gateway.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn check(&self, op: Op) -> GatewayResult<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(PersistenceError::Unavailable(format!("scripted {:?} failure", op)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PersistenceGateway for ScriptedGateway {
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> GatewayResult<Option<Job>> {
        self.inner.load_job(tenant_id, job_id).await
    }

    async fn list_jobs(&self, tenant_id: Uuid) -> GatewayResult<Vec<Job>> {
        self.inner.list_jobs(tenant_id).await
    }

    async fn save_job_status(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
    ) -> GatewayResult<()> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gate
            .lock()
            .unwrap()
            .as_ref()
            .map(|gate| (gate.permits.clone(), gate.entered.clone()));
        if let Some((permits, entered)) = gate {
            let _ = entered.send(status);
            permits.acquire().await.expect("gate closed").forget();
        }
        self.check(Op::SaveJobStatus)?;
        self.inner.save_job_status(tenant_id, job_id, status).await
    }

    async fn load_estimate(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Estimate>> {
        self.inner.load_estimate(tenant_id, job_id).await
    }

    async fn save_estimate_items(
        &self,
        tenant_id: Uuid,
        estimate_id: Uuid,
        items: &[EstimateItem],
        totals: &EstimateTotals,
    ) -> GatewayResult<()> {
        self.check(Op::SaveEstimateItems)?;
        self.inner
            .save_estimate_items(tenant_id, estimate_id, items, totals)
            .await
    }

    async fn lock_estimate(&self, tenant_id: Uuid, estimate_id: Uuid) -> GatewayResult<()> {
        self.check(Op::LockEstimate)?;
        self.inner.lock_estimate(tenant_id, estimate_id).await
    }

    async fn load_invoice_by_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Invoice>> {
        self.inner.load_invoice_by_job(tenant_id, job_id).await
    }

    async fn load_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> GatewayResult<Option<Invoice>> {
        self.inner.load_invoice(tenant_id, invoice_id).await
    }

    async fn save_invoice(&self, tenant_id: Uuid, invoice: &Invoice) -> GatewayResult<Invoice> {
        self.check(Op::SaveInvoice)?;
        self.inner.save_invoice(tenant_id, invoice).await
    }

    async fn update_invoice_balance(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> GatewayResult<()> {
        self.check(Op::UpdateInvoiceBalance)?;
        self.inner
            .update_invoice_balance(tenant_id, invoice_id, paid_amount, balance, status)
            .await
    }

    async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> GatewayResult<Payment> {
        self.check(Op::RecordPayment)?;
        self.inner
            .record_payment(tenant_id, invoice_id, amount, method)
            .await
    }

    async fn list_payments(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> GatewayResult<Vec<Payment>> {
        self.inner.list_payments(tenant_id, invoice_id).await
    }

    async fn list_drifted_invoices(&self, limit: i64) -> GatewayResult<Vec<(Uuid, Uuid)>> {
        self.inner.list_drifted_invoices(limit).await
    }
}
