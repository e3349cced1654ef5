//! Job runner errors

use thiserror::Error;

use domain_billing::BillingError;
use infra_db::DatabaseError;

/// Errors raised while configuring or running a batch job
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),
}

impl JobError {
    /// Whether rerunning the failed chunk may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Database(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::InvoiceLineId;

    #[test]
    fn test_billing_errors_are_not_retryable() {
        let error: JobError = BillingError::StaleView(InvoiceLineId::new(3)).into();
        assert!(!error.is_retryable());
        assert!(error.to_string().starts_with("Billing error"));
    }

    #[test]
    fn test_invalid_argument_message() {
        let error = JobError::InvalidArgument("stock key `x`".to_string());
        assert_eq!(error.to_string(), "Invalid argument: stock key `x`");
    }
}
