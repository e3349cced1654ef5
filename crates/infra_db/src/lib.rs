//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the DME billing core using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern. The ledgers (invoice
//! transactions, inventory transactions, serial history) are append-only;
//! the summary columns next to them (invoice line balances, inventory
//! levels, serial status) are rewritten from the domain's recomputation in
//! the same database transaction that appends the rows.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, InvoiceRepository};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/dme")).await?;
//! let invoices = InvoiceRepository::new(pool);
//! let mut tx = invoices.begin().await?;
//! let mut book = invoices.load_book(&mut tx, &ids).await?;
//! book.recalculate(&LineSelector::All)?;
//! invoices.save_book(&mut tx, &book).await?;
//! tx.commit().await?;
//! ```

pub mod pool;
pub mod error;
pub mod repositories;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool, DEFAULT_APPLICATION_NAME, DEFAULT_DATABASE_URL};
pub use error::DatabaseError;
pub use repositories::{
    DbTransaction, InventoryRepository, InvoiceRepository, LockedSerial, SavedBook, SavedLedger, SerialRepository,
    StockKey,
};
