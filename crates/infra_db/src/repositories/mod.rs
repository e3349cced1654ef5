//! Repository implementations for domain aggregates
//!
//! Repositories map between database rows and domain types. Each unit of
//! work follows the same shape:
//! - begin a database transaction and load the aggregate under row locks
//! - let the domain operate on the in-memory aggregate
//! - save appended ledger rows and derived fields, then commit
//!
//! Queries are built at runtime with `sqlx::query_as` and `FromRow` row
//! types, so the crate builds without a live database.

pub mod invoice;
pub mod inventory;
pub mod serial;

pub use invoice::{InvoiceRepository, SavedBook};
pub use inventory::{InventoryRepository, SavedLedger, StockKey};
pub use serial::{LockedSerial, SerialRepository};

/// Database transaction a unit of work runs in
pub type DbTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;
