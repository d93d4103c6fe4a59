use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::billing::PaymentReconciler;
use crate::gateway::{with_deadline, PersistenceGateway};

/// Invoices checked per poll.
const BATCH_SIZE: i64 = 100;

/// Result of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub checked: usize,
    pub failed: usize,
}

/// Background poller that keeps stored invoice balances in step with the
/// recorded payments.
///
/// A payment whose balance update failed leaves the invoice behind its
/// payments; every poll picks up the invoices whose stored paid amount no
/// longer matches their payments and re-derives paid amount, balance and
/// status for them.
pub struct ReconciliationWorker {
    gateway: Arc<dyn PersistenceGateway>,
    reconciler: PaymentReconciler,
    persistence_timeout: Duration,

    /// Polling interval
    poll_interval: Duration,

    /// Whether the worker is running
    running: Arc<RwLock<bool>>,
}

impl ReconciliationWorker {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        reconciler: PaymentReconciler,
        persistence_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            persistence_timeout,
            poll_interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs passes until [`ReconciliationWorker::stop`] is called.
    ///
    /// A failed pass is logged and the loop keeps going.
    pub async fn start(&self) -> anyhow::Result<()> {
        *self.running.write().await = true;
        info!(
            "ReconciliationWorker started with poll interval: {:?}",
            self.poll_interval
        );

        while *self.running.read().await {
            match self.run_once().await {
                Ok(report) => {
                    if report.checked > 0 {
                        info!(
                            checked = report.checked,
                            failed = report.failed,
                            "Reconciliation pass finished"
                        );
                    }
                }
                Err(e) => {
                    error!("Error in reconciliation loop: {}", e);
                }
            }

            sleep(self.poll_interval).await;
        }

        info!("ReconciliationWorker stopped");
        Ok(())
    }

    /// Makes the loop exit after the current pass.
    pub async fn stop(&self) {
        info!("Stopping ReconciliationWorker...");
        *self.running.write().await = false;
    }

    /// Reconciles one batch of drifted invoices.
    pub async fn run_once(&self) -> anyhow::Result<PassReport> {
        let drifted = with_deadline(
            self.persistence_timeout,
            self.gateway.list_drifted_invoices(BATCH_SIZE),
        )
        .await?;

        let mut report = PassReport::default();
        for (tenant_id, invoice_id) in drifted {
            report.checked += 1;
            match self.reconciler.reconcile_invoice(tenant_id, invoice_id).await {
                Ok(invoice) => {
                    debug!(
                        invoice_id = %invoice_id,
                        status = %invoice.status,
                        "Invoice reconciled"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        tenant_id = %tenant_id,
                        invoice_id = %invoice_id,
                        "Failed to reconcile invoice: {}",
                        e
                    );
                }
            }
        }

        Ok(report)
    }
}
