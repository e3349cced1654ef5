//! Database error types
//!
//! Storage failures are mapped onto a small set of variants by PostgreSQL
//! error code. Domain errors raised while rebuilding an aggregate from its
//! rows are carried through unchanged.

use thiserror::Error;

use domain_billing::BillingError;
use domain_inventory::InventoryError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Concurrent update lost a lock or serialization race
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row does not map onto the domain model
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Billing aggregate rejected the loaded or saved state
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Inventory aggregate rejected the loaded state
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Serial", "SER-12");
    /// assert!(error.to_string().contains("Serial"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    pub fn corrupt(table: &str, id: i64, detail: impl std::fmt::Display) -> Self {
        DatabaseError::CorruptRow(format!("{} #{}: {}", table, id, detail))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }

    /// Checks if retrying the unit of work may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::TransactionFailed(_) | DatabaseError::PoolExhausted)
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// The mapping is keyed on the PostgreSQL error code.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound("Record not found".to_string())
            }
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    Some("40001") | Some("40P01") | Some("55P03") => {
                        DatabaseError::TransactionFailed(message)
                    }
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            sqlx::Error::Migrate(migrate_err) => {
                DatabaseError::MigrationFailed(migrate_err.to_string())
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{InvoiceLineId, SerialId};

    #[test]
    fn test_not_found_message() {
        let error = DatabaseError::not_found("Invoice", "INV-9");
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "Entity not found: Invoice with id 'INV-9' not found");
    }

    #[test]
    fn test_sqlx_mapping() {
        assert!(DatabaseError::from(&sqlx::Error::RowNotFound).is_not_found());
        assert!(DatabaseError::from(&sqlx::Error::PoolTimedOut).is_connection_error());
        assert!(DatabaseError::from(&sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_domain_errors_pass_through() {
        let error: DatabaseError = BillingError::StaleView(InvoiceLineId::new(3)).into();
        assert!(error.to_string().contains("INVL-3"));

        let error: DatabaseError = InventoryError::SerialNotFound(SerialId::new(5)).into();
        assert_eq!(error.to_string(), "Serial not found: SER-5");
        assert!(!error.is_constraint_violation());
    }

    #[test]
    fn test_corrupt_row() {
        let error = DatabaseError::corrupt("invoice_transaction", 12, "unknown type 'Refund'");
        assert_eq!(error.to_string(), "Corrupt row: invoice_transaction #12: unknown type 'Refund'");
    }
}
