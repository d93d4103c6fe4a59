pub mod estimate;
pub mod invoice;
pub mod job;
pub mod payment;

pub use estimate::{Estimate, EstimateItem, EstimateItemInput, EstimateTotals};
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus, InvoiceSummary};
pub use job::{CreateJob, Job, JobStatus};
pub use payment::{Payment, PaymentMethod};
