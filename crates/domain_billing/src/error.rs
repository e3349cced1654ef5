//! Billing domain errors

use thiserror::Error;

use core_kernel::{CoreError, InvoiceId, InvoiceLineId, MoneyError, OrderLineId};

/// Errors that can occur in the billing domain
///
/// Validation rejections that callers are expected to show to a user are not
/// errors; they come back as `PostingResult::Rejected`.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Invoice not present in the book
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Invoice line not present in the book
    #[error("Invoice line not found: {0}")]
    LineNotFound(InvoiceLineId),

    /// Order line not present on the order
    #[error("Order line not found: {0}")]
    OrderLineNotFound(OrderLineId),

    /// A derived view was read after a posting without recalculating
    #[error("Invoice line {0} has unreconciled postings; recalculate before reading it")]
    StaleView(InvoiceLineId),

    /// Malformed id list or option string
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Unknown legacy enum string
    #[error("Unknown {kind}: {value}")]
    UnknownValue {
        kind: &'static str,
        value: String,
    },

    /// Calculation error
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),

    /// Error from the kernel
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl BillingError {
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        BillingError::UnknownValue {
            kind,
            value: value.into(),
        }
    }
}
