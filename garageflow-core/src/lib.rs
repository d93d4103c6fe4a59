//! GarageFlow core: job lifecycle and billing reconciliation for auto
//! garages.
//!
//! Jobs move across a kanban board (`received -> working -> ready ->
//! completed`), their estimates are frozen into invoices, and payments are
//! reconciled against those invoices before a job may be completed.

pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod models;
pub mod sequencer;
pub mod worker;

#[cfg(test)]
mod testing;

pub use engine::GarageEngine;
pub use error::{GarageError, PersistenceError, Result};
