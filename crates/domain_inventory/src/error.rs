//! Inventory domain errors

use thiserror::Error;

use core_kernel::{CoreError, InventoryTransactionId, SerialId};

/// Errors that can occur in the inventory domain
///
/// Conditions that merely mean "nothing to do" are reported through
/// `Outcome::Skipped` instead.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Serial not found: {0}")]
    SerialNotFound(SerialId),

    #[error("Serial transaction belongs to {found}, expected {expected}")]
    SerialMismatch { expected: SerialId, found: SerialId },

    #[error("Inventory transaction not found: {0}")]
    TransactionNotFound(InventoryTransactionId),

    #[error("Unknown {kind}: '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl InventoryError {
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        InventoryError::UnknownValue {
            kind,
            value: value.into(),
        }
    }
}
