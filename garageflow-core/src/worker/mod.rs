pub mod scheduler;

pub use scheduler::{PassReport, ReconciliationWorker};
