//! Estimate aggregation, invoicing and payment reconciliation.

pub mod estimates;
pub mod invoicing;
pub mod payments;
pub mod totals;


pub use estimates::EstimateEditor;
pub use invoicing::InvoiceGenerator;
pub use payments::PaymentReconciler;
pub use totals::{compute_totals, DEFAULT_TAX_RATE};
