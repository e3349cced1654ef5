//! Invoices and invoice lines
//!
//! An invoice is generated from one order for one billing cycle and keeps a
//! snapshot of the order's payer and diagnosis context. Each invoice line
//! owns its append-only transaction history; the reconciliation fields on
//! the line are derived from that history.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    CustomerId, DateRange, DiagnosisScheme, InvoiceId, InvoiceLineId, Money, OrderId, OrderLineId,
};

use crate::order::PayerPolicy;
use crate::rates::Modifiers;
use crate::reconcile::DerivedLine;
use crate::transaction::InvoiceTransaction;

/// A party that can be responsible for an invoice line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PayerSlot {
    Ins1,
    Ins2,
    Ins3,
    Ins4,
    Patient,
}

legacy_names!(PayerSlot, "payer" {
    Ins1 => "Ins1",
    Ins2 => "Ins2",
    Ins3 => "Ins3",
    Ins4 => "Ins4",
    Patient => "Patient",
});

impl PayerSlot {
    pub const INSURERS: [PayerSlot; 4] = [PayerSlot::Ins1, PayerSlot::Ins2, PayerSlot::Ins3, PayerSlot::Ins4];

    /// Zero-based position (Patient is 4)
    pub fn index(&self) -> usize {
        match self {
            PayerSlot::Ins1 => 0,
            PayerSlot::Ins2 => 1,
            PayerSlot::Ins3 => 2,
            PayerSlot::Ins4 => 3,
            PayerSlot::Patient => 4,
        }
    }

    /// Insurer slot for a zero-based policy index
    pub fn insurer(index: usize) -> Option<Self> {
        Self::INSURERS.get(index).copied()
    }

    pub fn is_insurer(&self) -> bool {
        !matches!(self, PayerSlot::Patient)
    }
}

/// Legacy wire form of a current payer, where no payer is "None"
pub fn payer_wire_name(payer: Option<PayerSlot>) -> &'static str {
    payer.map(|p| p.legacy_name()).unwrap_or("None")
}

/// Parses the legacy current-payer column
pub fn parse_payer_wire(value: &str) -> Result<Option<PayerSlot>, crate::BillingError> {
    match value.trim() {
        "" | "None" => Ok(None),
        other => other.parse().map(Some),
    }
}

/// A set of payer slots, stored as a 5-bit mask (Ins1 = bit 0 ... Patient = bit 4)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayerMask(u8);

impl PayerMask {
    pub const EMPTY: PayerMask = PayerMask(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1_1111)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, slot: PayerSlot) -> bool {
        self.0 & (1 << slot.index()) != 0
    }

    pub fn insert(&mut self, slot: PayerSlot) {
        self.0 |= 1 << slot.index();
    }

    pub fn remove(&mut self, slot: PayerSlot) {
        self.0 &= !(1 << slot.index());
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Invoice header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub invoice_date: NaiveDate,
    /// Payers snapshotted from the order; index 0 is insurer 1
    pub policies: [Option<PayerPolicy>; 4],
    pub diagnosis_scheme: DiagnosisScheme,
    pub diagnosis_codes: Vec<String>,
    /// Sum of the line balances
    pub balance: Money,
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn new(id: InvoiceId, customer_id: CustomerId, order_id: OrderId, invoice_date: NaiveDate) -> Self {
        Self {
            id,
            customer_id,
            order_id,
            invoice_date,
            policies: [None; 4],
            diagnosis_scheme: DiagnosisScheme::Icd10,
            diagnosis_codes: Vec::new(),
            balance: Money::ZERO,
            lines: Vec::new(),
        }
    }

    /// Policy for an insurer slot; always `None` for Patient
    pub fn policy(&self, slot: PayerSlot) -> Option<&PayerPolicy> {
        self.policies.get(slot.index()).and_then(|p| p.as_ref())
    }

    pub fn line(&self, id: InvoiceLineId) -> Option<&InvoiceLine> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn line_mut(&mut self, id: InvoiceLineId) -> Option<&mut InvoiceLine> {
        self.lines.iter_mut().find(|l| l.id == id)
    }

    /// Sum of the derived line balances
    pub fn total_balance(&self) -> Money {
        self.lines.iter().map(|l| l.derived.balance).sum()
    }
}

/// One charge row on an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub invoice_id: InvoiceId,
    pub order_line_id: OrderLineId,
    pub billing_month: i32,
    pub billing_code: String,
    pub modifiers: Modifiers,
    pub dos: DateRange,
    pub quantity: Decimal,
    pub billable_amount: Money,
    pub allowable_amount: Money,
    pub taxes: Money,
    /// Per-insurer bill flags copied from the order line
    pub bill_ins: [bool; 4],
    pub nopay_ins1: bool,
    pub hardship: bool,
    /// Reconciliation fields as of the last recalculation
    pub derived: DerivedLine,
    /// Ledger rows in ascending id order
    pub transactions: Vec<InvoiceTransaction>,
}

impl InvoiceLine {
    pub fn new(
        id: InvoiceLineId,
        invoice_id: InvoiceId,
        order_line_id: OrderLineId,
        dos: DateRange,
        billable_amount: Money,
        allowable_amount: Money,
    ) -> Self {
        Self {
            id,
            invoice_id,
            order_line_id,
            billing_month: 1,
            billing_code: String::new(),
            modifiers: Modifiers::default(),
            dos,
            quantity: Decimal::ONE,
            billable_amount,
            allowable_amount,
            taxes: Money::ZERO,
            bill_ins: [true; 4],
            nopay_ins1: false,
            hardship: false,
            derived: DerivedLine::unreconciled(billable_amount),
            transactions: Vec::new(),
        }
    }

    /// Whether `slot` may be billed for this line under `invoice`'s policies
    pub fn is_eligible(&self, invoice: &Invoice, slot: PayerSlot) -> bool {
        match slot {
            PayerSlot::Patient => true,
            insurer => {
                let i = insurer.index();
                invoice.policy(insurer).is_some() && self.bill_ins[i] && !(i == 0 && self.nopay_ins1)
            }
        }
    }
}
