//! Invoice ledger transactions
//!
//! Transactions are immutable once appended to a line. What a transaction
//! does to the derived line state is described by its [`TransactionEffect`];
//! the three "Adjust" types replace a line field outright instead of
//! accumulating.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    CustomerInsuranceId, InsuranceCompanyId, InvoiceId, InvoiceLineId, InvoiceTransactionId, Money,
    UserId,
};

use crate::invoice::PayerSlot;
use crate::payment::PaymentExtra;

/// Transaction type vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Submit,
    AutoSubmit,
    VoidedSubmission,
    PendingSubmission,
    ChangeCurrentPayee,
    Payment,
    Denied,
    AdjustAllowable,
    AdjustCustomary,
    AdjustTaxes,
    Deductible,
    ContractualWriteoff,
    SequestrationWriteoff,
    Writeoff,
}

legacy_names!(TransactionKind, "transaction type" {
    Submit => "Submit",
    AutoSubmit => "Auto Submit",
    VoidedSubmission => "Voided Submission",
    PendingSubmission => "Pending Submission",
    ChangeCurrentPayee => "Change Current Payee",
    Payment => "Payment",
    Denied => "Denied",
    AdjustAllowable => "Adjust Allowable",
    AdjustCustomary => "Adjust Customary",
    AdjustTaxes => "Adjust Taxes",
    Deductible => "Deductible",
    ContractualWriteoff => "Contractual Writeoff",
    SequestrationWriteoff => "Sequestration Writeoff",
    Writeoff => "Writeoff",
});

/// Line field that an adjustment transaction replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineField {
    Allowable,
    Billable,
    Taxes,
}

/// Effect of a transaction on the derived line state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEffect {
    Submit,
    VoidSubmission,
    MarkPending,
    ProposePayer,
    /// Adds to the payer's paid total; zero amounts mark a confirmed zero payment
    Pay,
    WriteOff,
    Deductible,
    Replace(LineField),
}

impl TransactionKind {
    pub fn effect(&self) -> TransactionEffect {
        match self {
            TransactionKind::Submit | TransactionKind::AutoSubmit => TransactionEffect::Submit,
            TransactionKind::VoidedSubmission => TransactionEffect::VoidSubmission,
            TransactionKind::PendingSubmission => TransactionEffect::MarkPending,
            TransactionKind::ChangeCurrentPayee => TransactionEffect::ProposePayer,
            TransactionKind::Payment | TransactionKind::Denied => TransactionEffect::Pay,
            TransactionKind::Writeoff
            | TransactionKind::ContractualWriteoff
            | TransactionKind::SequestrationWriteoff => TransactionEffect::WriteOff,
            TransactionKind::Deductible => TransactionEffect::Deductible,
            TransactionKind::AdjustAllowable => TransactionEffect::Replace(LineField::Allowable),
            TransactionKind::AdjustCustomary => TransactionEffect::Replace(LineField::Billable),
            TransactionKind::AdjustTaxes => TransactionEffect::Replace(LineField::Taxes),
        }
    }
}

/// A ledger row against one invoice line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTransaction {
    pub id: InvoiceTransactionId,
    pub invoice_id: InvoiceId,
    pub line_id: InvoiceLineId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub quantity: Decimal,
    /// Policy the transaction is for; `None` means the patient
    pub customer_insurance_id: Option<CustomerInsuranceId>,
    pub insurance_company_id: Option<InsuranceCompanyId>,
    pub transaction_date: NaiveDate,
    pub extra: Option<PaymentExtra>,
    pub comments: Option<String>,
    pub actor: UserId,
}

/// A transaction to be appended, addressed by payer slot
///
/// The book resolves the slot into the invoice's policy and company ids.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub payer: PayerSlot,
    pub amount: Money,
    pub quantity: Decimal,
    pub transaction_date: NaiveDate,
    pub extra: Option<PaymentExtra>,
    pub comments: Option<String>,
    pub actor: UserId,
}

impl TransactionDraft {
    pub fn new(kind: TransactionKind, payer: PayerSlot, transaction_date: NaiveDate, actor: UserId) -> Self {
        Self {
            kind,
            payer,
            amount: Money::ZERO,
            quantity: Decimal::ZERO,
            transaction_date,
            extra: None,
            comments: None,
            actor,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_extra(mut self, extra: PaymentExtra) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}
