//! Batch job runner
//!
//! This crate drives the periodic maintenance passes over the billing and
//! inventory stores:
//!
//! - **recalculate-invoices**: recompute every invoice line's reconciliation
//!   fields and roll the balances up into the invoice headers
//! - **update-pending-submissions**: queue a pending submission for the
//!   current payer of every open line
//! - **refresh-inventory**: drop orphaned ledger rows and recompute every
//!   stock level
//!
//! Configuration comes from `DME_*` environment variables (see
//! [`config::JobConfig`]).

pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use config::JobConfig;
pub use error::JobError;
pub use jobs::{refresh_inventory, run_invoice_job, InventoryJobReport, InvoiceJob, InvoiceJobReport};
