use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::{GarageError, Result};
use crate::gateway::{with_deadline, PersistenceGateway};
use crate::models::estimate::MONEY_SCALE;
use crate::models::payment::total_paid;
use crate::models::{Invoice, InvoiceSummary, PaymentMethod};
use crate::sequencer::Sequencer;

/// Applies payments to invoices and keeps their balance in step.
///
/// The paid amount is always re-derived from the recorded payments, never
/// incremented, so a half-finished apply is repaired by simply reconciling
/// again.
pub struct PaymentReconciler {
    gateway: Arc<dyn PersistenceGateway>,
    invoices: Sequencer,
    overpayment_tolerance: Decimal,
    persistence_timeout: Duration,
}

impl PaymentReconciler {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        overpayment_tolerance: Decimal,
        persistence_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            invoices: Sequencer::new(),
            overpayment_tolerance,
            persistence_timeout,
        }
    }

    fn validate_amount(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(GarageError::InvalidPaymentAmount {
                amount,
                reason: "amount must be greater than zero".to_string(),
            });
        }
        if amount.normalize().scale() > MONEY_SCALE {
            return Err(GarageError::InvalidPaymentAmount {
                amount,
                reason: format!("amount has more than {} decimal places", MONEY_SCALE),
            });
        }
        Ok(())
    }

    async fn load(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice> {
        with_deadline(
            self.persistence_timeout,
            self.gateway.load_invoice(tenant_id, invoice_id),
        )
        .await?
        .ok_or(GarageError::InvoiceNotFound(invoice_id))
    }

    async fn paid_so_far(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Decimal> {
        let payments = with_deadline(
            self.persistence_timeout,
            self.gateway.list_payments(tenant_id, invoice_id),
        )
        .await?;
        Ok(total_paid(&payments))
    }

    /// Records a payment against an invoice and returns the updated invoice.
    ///
    /// Over-payment beyond the configured tolerance is rejected, not clamped.
    /// Once the payment is recorded the call succeeds, even if the invoice
    /// counters could not be written; the returned invoice carries the
    /// counters derived from the payments.
    #[instrument(skip(self))]
    pub async fn apply_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Invoice> {
        Self::validate_amount(amount)?;

        let _turn = self.invoices.acquire(invoice_id).await;

        let invoice = self.load(tenant_id, invoice_id).await?;
        let paid = self.paid_so_far(tenant_id, invoice_id).await?;
        let (balance, _) = invoice.balance_for(paid);

        if amount > balance + self.overpayment_tolerance {
            info!(
                invoice_id = %invoice_id,
                amount = %amount,
                balance = %balance,
                "Payment rejected as over-payment"
            );
            return Err(GarageError::Overpayment {
                invoice_id,
                amount,
                balance,
            });
        }

        let payment = with_deadline(
            self.persistence_timeout,
            self.gateway
                .record_payment(tenant_id, invoice_id, amount, method),
        )
        .await?;

        info!(
            payment_id = %payment.id,
            invoice_id = %invoice_id,
            amount = %amount,
            method = %method,
            "Payment recorded"
        );

        // The payment is on record from here on; a failed counter write is
        // left to reconcile_invoice and the worker.
        match self.write_balance(tenant_id, invoice.clone()).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                error!(
                    invoice_id = %invoice_id,
                    payment_id = %payment.id,
                    "Payment recorded but invoice balance not updated: {}",
                    e
                );
                Ok(with_counters(invoice, paid + amount))
            }
        }
    }

    /// Re-derives the invoice's paid amount, balance and status from its
    /// payments and persists them if they drifted.
    #[instrument(skip(self))]
    pub async fn reconcile_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice> {
        let _turn = self.invoices.acquire(invoice_id).await;
        let invoice = self.load(tenant_id, invoice_id).await?;
        self.write_balance(tenant_id, invoice).await
    }

    /// Invoice with its payment history.
    pub async fn invoice_summary(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<InvoiceSummary> {
        let invoice = self.load(tenant_id, invoice_id).await?;
        let payments = with_deadline(
            self.persistence_timeout,
            self.gateway.list_payments(tenant_id, invoice_id),
        )
        .await?;
        Ok(InvoiceSummary { invoice, payments })
    }

    async fn write_balance(&self, tenant_id: Uuid, invoice: Invoice) -> Result<Invoice> {
        let paid_amount = self.paid_so_far(tenant_id, invoice.id).await?;
        let (balance, status) = invoice.balance_for(paid_amount);

        if invoice.paid_amount == paid_amount && invoice.balance == balance && invoice.status == status
        {
            return Ok(invoice);
        }

        with_deadline(
            self.persistence_timeout,
            self.gateway
                .update_invoice_balance(tenant_id, invoice.id, paid_amount, balance, status),
        )
        .await?;

        info!(
            invoice_id = %invoice.id,
            paid = %paid_amount,
            balance = %balance,
            status = %status,
            "Invoice balance updated"
        );

        Ok(with_counters(invoice, paid_amount))
    }
}

/// The invoice as `paid_amount` of payments leaves it.
fn with_counters(mut invoice: Invoice, paid_amount: Decimal) -> Invoice {
    let (balance, status) = invoice.balance_for(paid_amount);
    invoice.paid_amount = paid_amount;
    invoice.balance = balance;
    invoice.status = status;
    invoice.updated_at = Utc::now();
    invoice
}
