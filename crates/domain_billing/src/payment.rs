//! Payment payloads and posting results
//!
//! Remittance posting hands the ledger a small payload of optional amounts
//! plus a check number / posting guid pair. Automated posts carry a guid per
//! remittance run so re-running the same run is idempotent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{InvoiceTransactionId, Money};

/// Rejection returned when the invoice line does not exist
pub const LINE_NOT_FOUND: &str = "InvoiceDetailsID is wrong";
/// Rejection returned when the payload has no usable paid amount
pub const PAID_NOT_SPECIFIED: &str = "Paid amount is not specified";
/// Rejection returned when a remittance run re-posts the same check
pub const ALREADY_EXISTS: &str = "Transaction already exists";
/// Rejection returned when auto-submitting for a company that is not the current payer
pub const AUTOSUBMIT_COMPANY_WRONG: &str = "Autosubmitted Company ID is wrong";

/// Rejection for a check number already used by a different remittance run
pub fn duplicate_check_number(check_number: &str) -> String {
    format!("Payment with check number '{}' was already posted", check_number)
}

/// Amounts reported by a payer for one invoice line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentExtra {
    pub paid: Option<Money>,
    pub allowable: Option<Money>,
    pub deductible: Option<Money>,
    pub sequestration: Option<Money>,
    pub contractual_writeoff: Option<Money>,
    pub check_number: Option<String>,
    pub posting_guid: Option<Uuid>,
}

impl PaymentExtra {
    pub fn paid(amount: Money) -> Self {
        Self {
            paid: Some(amount),
            ..Self::default()
        }
    }

    /// Builds a payload from key/value pairs
    ///
    /// Recognised keys are `Paid`, `Allowable`, `Deductible`, `Sequestration`,
    /// `ContractualWriteoff`, `CheckNumber` and `PostingGuid`. Amount values
    /// that do not parse as decimals are treated as absent.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut extra = Self::default();
        for (key, value) in pairs {
            let value = value.trim();
            let amount = || Decimal::from_str(value).ok().map(Money::new);
            match key.trim() {
                "Paid" => extra.paid = amount(),
                "Allowable" => extra.allowable = amount(),
                "Deductible" => extra.deductible = amount(),
                "Sequestration" => extra.sequestration = amount(),
                "ContractualWriteoff" => extra.contractual_writeoff = amount(),
                "CheckNumber" if !value.is_empty() => extra.check_number = Some(value.to_string()),
                "PostingGuid" => extra.posting_guid = Uuid::parse_str(value).ok(),
                _ => {}
            }
        }
        extra
    }

    pub fn with_allowable(mut self, amount: Money) -> Self {
        self.allowable = Some(amount);
        self
    }

    pub fn with_deductible(mut self, amount: Money) -> Self {
        self.deductible = Some(amount);
        self
    }

    pub fn with_sequestration(mut self, amount: Money) -> Self {
        self.sequestration = Some(amount);
        self
    }

    pub fn with_contractual_writeoff(mut self, amount: Money) -> Self {
        self.contractual_writeoff = Some(amount);
        self
    }

    pub fn with_check(mut self, check_number: impl Into<String>, posting_guid: Option<Uuid>) -> Self {
        self.check_number = Some(check_number.into());
        self.posting_guid = posting_guid;
        self
    }
}

/// Options accepted by payment posting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOptions {
    /// Post an "Adjust Allowable" when the reported allowable differs
    pub adjust_allowable: bool,
    /// Record a zero payment as "Denied"
    pub post_denied: bool,
    /// Write off whatever balance remains after posting
    pub writeoff_balance: bool,
}

impl PaymentOptions {
    /// Parses the legacy comma-separated option list; unknown tokens are ignored
    pub fn parse(options: &str) -> Self {
        let mut parsed = Self::default();
        for token in options.split(',').map(str::trim) {
            match token {
                "Adjust Allowable" => parsed.adjust_allowable = true,
                "Post Denied" => parsed.post_denied = true,
                "Writeoff Balance" => parsed.writeoff_balance = true,
                _ => {}
            }
        }
        parsed
    }
}

/// Result of a posting operation that callers must inspect
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingResult {
    /// Transactions were appended and the lines recalculated
    Posted(Vec<InvoiceTransactionId>),
    /// Nothing needed posting
    Unchanged,
    /// The request was refused before anything was written
    Rejected(String),
}

impl PostingResult {
    pub fn rejected(message: impl Into<String>) -> Self {
        PostingResult::Rejected(message.into())
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PostingResult::Rejected(_))
    }

    /// Legacy result string: empty on success
    pub fn message(&self) -> &str {
        match self {
            PostingResult::Rejected(message) => message,
            _ => "",
        }
    }
}
