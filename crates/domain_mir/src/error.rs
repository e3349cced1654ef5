//! MIR domain errors

use thiserror::Error;

use core_kernel::{CoreError, UnknownMirToken};

/// Errors that can occur while recomputing MIR flags
#[derive(Debug, Error)]
pub enum MirError {
    /// A single-entity recompute named a row that does not exist
    #[error("{kind} not found: {id}")]
    EntityNotFound {
        kind: &'static str,
        id: String,
    },

    /// Unknown legacy enum string
    #[error("Unknown {kind}: {value}")]
    UnknownValue {
        kind: &'static str,
        value: String,
    },

    /// A persisted flag string held a token outside the vocabulary
    #[error(transparent)]
    UnknownToken(#[from] UnknownMirToken),

    /// Error from the kernel
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl MirError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        MirError::EntityNotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        MirError::UnknownValue {
            kind,
            value: value.into(),
        }
    }
}
