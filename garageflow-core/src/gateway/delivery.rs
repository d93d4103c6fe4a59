use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::Invoice;

/// Failure of a document delivery channel. Never affects the invoice.
#[derive(Debug, Error)]
#[error("{channel} delivery failed: {reason}")]
pub struct DeliveryError {
    pub channel: &'static str,
    pub reason: String,
}

/// Outbound document channels, only used once an invoice exists.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Renders the invoice to PDF and returns a reference to the document.
    async fn export_pdf(&self, invoice: &Invoice) -> Result<String, DeliveryError>;

    /// Sends the invoice summary to the customer over WhatsApp.
    async fn send_whatsapp(&self, invoice: &Invoice, message: &str) -> Result<(), DeliveryError>;
}

/// Builds the customer-facing invoice message.
pub fn render_invoice_message(invoice: &Invoice) -> String {
    let mut body = format!(
        "Your vehicle is ready. Invoice {} has {} line(s):\n",
        invoice.id,
        invoice.items.len()
    );
    for line in &invoice.items {
        body.push_str(&format!(
            "- {} x{}: ₹{}\n",
            line.name, line.quantity, line.line_total
        ));
    }
    body.push_str(&format!(
        "Tax: ₹{}\nTotal: ₹{}\nBalance due: ₹{}",
        invoice.tax_amount, invoice.total_amount, invoice.balance
    ));
    body
}

/// Sends the invoice through every channel, logging failures.
///
/// Delivery is best-effort: errors are reported with `warn!` and swallowed
/// here so the caller never unwinds the invoice because of them.
pub async fn deliver_invoice(delivery: &dyn DeliveryGateway, invoice: &Invoice) {
    match delivery.export_pdf(invoice).await {
        Ok(document) => info!(invoice_id = %invoice.id, document = %document, "Invoice PDF exported"),
        Err(e) => warn!(invoice_id = %invoice.id, "Invoice PDF export failed: {}", e),
    }

    let message = render_invoice_message(invoice);
    if let Err(e) = delivery.send_whatsapp(invoice, &message).await {
        warn!(invoice_id = %invoice.id, "Invoice WhatsApp send failed: {}", e);
    }
}

/// Mock delivery channel.
///
/// In production this would call the PDF renderer and the WhatsApp Business
/// API; here it only logs what would be sent.
#[derive(Clone, Default)]
pub struct LogDelivery;

#[async_trait]
impl DeliveryGateway for LogDelivery {
    async fn export_pdf(&self, invoice: &Invoice) -> Result<String, DeliveryError> {
        info!("Mock PDF Service: Rendering invoice {}", invoice.id);

        // Simulate async rendering delay
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        Ok(format!("invoices/{}/{}.pdf", invoice.tenant_id, invoice.id))
    }

    async fn send_whatsapp(&self, invoice: &Invoice, message: &str) -> Result<(), DeliveryError> {
        info!("Mock WhatsApp Service: Sending invoice {}", invoice.id);
        info!("Body preview: {}...", message.chars().take(100).collect::<String>());

        // Simulate async send delay
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Estimate, EstimateItem, EstimateTotals};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    fn invoice() -> Invoice {
        let mut estimate = Estimate::empty(Uuid::new_v4(), Uuid::new_v4(), Decimal::ZERO);
        estimate.items.push(EstimateItem {
            id: Uuid::new_v4(),
            estimate_id: estimate.id,
            name: "Wiper blades".to_string(),
            part_number: None,
            quantity: 2,
            unit_price: Decimal::from_str("250").unwrap(),
            labor_cost: Decimal::ZERO,
        });
        estimate.totals = EstimateTotals {
            parts_total: Decimal::from_str("500").unwrap(),
            labor_total: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: Decimal::from_str("500").unwrap(),
        };
        Invoice::from_estimate(&estimate)
    }

    #[test]
    fn test_message_lists_lines_and_balance() {
        let message = render_invoice_message(&invoice());
        assert!(message.contains("Wiper blades x2"));
        assert!(message.contains("Balance due: ₹500.00"));
    }

    #[tokio::test]
    async fn test_log_delivery_exports_pdf_path() {
        let invoice = invoice();
        let document = LogDelivery.export_pdf(&invoice).await.unwrap();
        assert!(document.ends_with(&format!("{}.pdf", invoice.id)));
    }
}
