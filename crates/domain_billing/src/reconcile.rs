//! Invoice line reconciliation
//!
//! The derived state of an invoice line (totals, submission flags, current
//! payer, balance) is a pure fold over its transactions in ascending id
//! order. Running the fold twice over the same history yields the same view.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::Money;

use crate::invoice::{Invoice, InvoiceLine, PayerMask, PayerSlot};
use crate::transaction::{InvoiceTransaction, LineField, TransactionEffect};

/// Reconciliation fields of an invoice line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedLine {
    /// Paid per slot, indexed by [`PayerSlot::index`]
    pub paid: [Money; 5],
    pub payment_total: Money,
    pub writeoff_total: Money,
    /// Latest deductible reported by insurer 1
    pub deductible: Money,
    pub submits: PayerMask,
    pub submit_dates: [Option<NaiveDate>; 5],
    pub pendings: PayerMask,
    pub zero_payments: PayerMask,
    /// Payer named by an unresolved "Change Current Payee"
    pub proposed_payer: Option<PayerSlot>,
    pub current_payer: Option<PayerSlot>,
    pub billable: Money,
    pub allowable: Money,
    pub taxes: Money,
    pub balance: Money,
    pub submitted: bool,
    pub submitted_date: Option<NaiveDate>,
}

impl DerivedLine {
    /// State of a line that has never been reconciled
    pub fn unreconciled(billable: Money) -> Self {
        Self {
            paid: [Money::ZERO; 5],
            payment_total: Money::ZERO,
            writeoff_total: Money::ZERO,
            deductible: Money::ZERO,
            submits: PayerMask::EMPTY,
            submit_dates: [None; 5],
            pendings: PayerMask::EMPTY,
            zero_payments: PayerMask::EMPTY,
            proposed_payer: None,
            current_payer: None,
            billable,
            allowable: Money::ZERO,
            taxes: Money::ZERO,
            balance: billable,
            submitted: false,
            submitted_date: None,
        }
    }

    pub fn paid_by(&self, slot: PayerSlot) -> Money {
        self.paid[slot.index()]
    }
}

/// Resolves the payer slot a transaction belongs to
///
/// Transactions without a policy are the patient's. A policy that is not on
/// the invoice resolves to no slot; its amounts still count toward totals.
pub fn slot_of(invoice: &Invoice, tx: &InvoiceTransaction) -> Option<PayerSlot> {
    match tx.customer_insurance_id {
        None => Some(PayerSlot::Patient),
        Some(policy_id) => invoice
            .policies
            .iter()
            .position(|p| p.is_some_and(|p| p.policy_id == policy_id))
            .and_then(PayerSlot::insurer),
    }
}

/// Folds the line's transactions into its derived view
pub fn derive(invoice: &Invoice, line: &InvoiceLine) -> DerivedLine {
    let mut view = DerivedLine::unreconciled(line.billable_amount);
    view.allowable = line.allowable_amount;
    view.taxes = line.taxes;

    let mut history: Vec<&InvoiceTransaction> = line.transactions.iter().collect();
    history.sort_by_key(|tx| tx.id);

    for tx in history {
        let slot = slot_of(invoice, tx);
        match tx.kind.effect() {
            TransactionEffect::Submit => {
                if let Some(slot) = slot {
                    view.submits.insert(slot);
                    view.submit_dates[slot.index()] = Some(tx.transaction_date);
                }
            }
            TransactionEffect::VoidSubmission => {
                if let Some(slot) = slot {
                    view.submits.remove(slot);
                    view.submit_dates[slot.index()] = None;
                }
            }
            TransactionEffect::MarkPending => {
                if let Some(slot) = slot {
                    view.pendings.insert(slot);
                }
            }
            TransactionEffect::ProposePayer => {
                if let Some(slot) = slot.filter(|s| line.is_eligible(invoice, *s)) {
                    view.proposed_payer = Some(slot);
                }
            }
            TransactionEffect::Pay => {
                view.payment_total += tx.amount;
                if let Some(slot) = slot {
                    view.paid[slot.index()] += tx.amount;
                    if tx.amount.is_negligible() {
                        view.zero_payments.insert(slot);
                    } else {
                        view.zero_payments.remove(slot);
                    }
                    if view.proposed_payer == Some(slot) && !tx.amount.is_negative() {
                        view.proposed_payer = None;
                    }
                }
            }
            TransactionEffect::WriteOff => view.writeoff_total += tx.amount,
            TransactionEffect::Deductible => {
                if slot == Some(PayerSlot::Ins1) {
                    view.deductible = tx.amount;
                }
            }
            TransactionEffect::Replace(field) => {
                let target = match field {
                    LineField::Allowable => &mut view.allowable,
                    LineField::Billable => &mut view.billable,
                    LineField::Taxes => &mut view.taxes,
                };
                if target.differs_by_mill(tx.amount) {
                    *target = tx.amount;
                }
            }
        }
    }

    view.balance = view.billable - view.payment_total - view.writeoff_total;
    view.current_payer = resolve_current_payer(invoice, line, &view);
    view.submitted = view
        .current_payer
        .is_some_and(|payer| view.submits.contains(payer));
    view.submitted_date = view
        .current_payer
        .and_then(|payer| view.submit_dates[payer.index()]);

    debug!(
        line_id = %line.id,
        balance = %view.balance,
        current_payer = ?view.current_payer,
        "Reconciled invoice line"
    );

    view
}

fn resolve_current_payer(invoice: &Invoice, line: &InvoiceLine, view: &DerivedLine) -> Option<PayerSlot> {
    if view.balance.is_below_cent() {
        return None;
    }
    if let Some(proposed) = view.proposed_payer {
        return Some(proposed);
    }
    PayerSlot::INSURERS
        .into_iter()
        .find(|slot| {
            line.is_eligible(invoice, *slot)
                && view.paid_by(*slot).is_below_cent()
                && !view.zero_payments.contains(*slot)
        })
        .or(Some(PayerSlot::Patient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PayerPolicy;
    use crate::transaction::TransactionKind;
    use chrono::NaiveDate;
    use core_kernel::{
        CustomerId, CustomerInsuranceId, DateRange, InsuranceCompanyId, InvoiceId, InvoiceLineId,
        InvoiceTransactionId, OrderId, OrderLineId, UserId,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn policy(slot: i64) -> PayerPolicy {
        PayerPolicy {
            policy_id: CustomerInsuranceId::new(slot * 10),
            company_id: InsuranceCompanyId::new(slot * 100),
        }
    }

    fn setup(billable: Decimal) -> (Invoice, InvoiceLine) {
        let mut invoice = Invoice::new(InvoiceId::new(1), CustomerId::new(1), OrderId::new(1), day());
        invoice.policies[0] = Some(policy(1));
        invoice.policies[1] = Some(policy(2));
        let line = InvoiceLine::new(
            InvoiceLineId::new(1),
            invoice.id,
            OrderLineId::new(1),
            DateRange::single(day()),
            Money::new(billable),
            Money::new(billable),
        );
        (invoice, line)
    }

    fn push(line: &mut InvoiceLine, kind: TransactionKind, payer: PayerSlot, amount: Decimal) {
        let id = InvoiceTransactionId::new(line.transactions.len() as i64 + 1);
        let customer_insurance_id = match payer {
            PayerSlot::Patient => None,
            insurer => Some(CustomerInsuranceId::new((insurer.index() as i64 + 1) * 10)),
        };
        line.transactions.push(InvoiceTransaction {
            id,
            invoice_id: line.invoice_id,
            line_id: line.id,
            kind,
            amount: Money::new(amount),
            quantity: Decimal::ZERO,
            customer_insurance_id,
            insurance_company_id: None,
            transaction_date: day(),
            extra: None,
            comments: None,
            actor: UserId::new(1),
        });
    }

    #[test]
    fn test_new_line_bills_first_insurer() {
        let (invoice, line) = setup(dec!(100));
        let view = derive(&invoice, &line);
        assert_eq!(view.current_payer, Some(PayerSlot::Ins1));
        assert_eq!(view.balance, Money::new(dec!(100)));
        assert!(!view.submitted);
    }

    #[test]
    fn test_payment_advances_to_next_insurer() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::Submit, PayerSlot::Ins1, dec!(0));
        push(&mut line, TransactionKind::Payment, PayerSlot::Ins1, dec!(80));

        let view = derive(&invoice, &line);
        assert_eq!(view.current_payer, Some(PayerSlot::Ins2));
        assert_eq!(view.balance, Money::new(dec!(20)));
        assert!(!view.submitted);
        assert!(view.submits.contains(PayerSlot::Ins1));
    }

    #[test]
    fn test_zero_payment_advances_and_reversal_keeps_payer() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::Denied, PayerSlot::Ins1, dec!(0));
        assert_eq!(derive(&invoice, &line).current_payer, Some(PayerSlot::Ins2));

        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::Payment, PayerSlot::Ins1, dec!(50));
        push(&mut line, TransactionKind::Payment, PayerSlot::Ins1, dec!(-50));
        let view = derive(&invoice, &line);
        assert_eq!(view.current_payer, Some(PayerSlot::Ins1));
        assert_eq!(view.balance, Money::new(dec!(100)));
    }

    #[test]
    fn test_change_current_payee_overrides_until_paid() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::ChangeCurrentPayee, PayerSlot::Patient, dec!(0));
        assert_eq!(derive(&invoice, &line).current_payer, Some(PayerSlot::Patient));

        push(&mut line, TransactionKind::Payment, PayerSlot::Patient, dec!(10));
        let view = derive(&invoice, &line);
        assert_eq!(view.proposed_payer, None);
        assert_eq!(view.current_payer, Some(PayerSlot::Ins1));
    }

    #[test]
    fn test_change_to_ineligible_payer_is_ignored() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::ChangeCurrentPayee, PayerSlot::Ins3, dec!(0));
        let view = derive(&invoice, &line);
        assert_eq!(view.proposed_payer, None);
        assert_eq!(view.current_payer, Some(PayerSlot::Ins1));
    }

    #[test]
    fn test_nopay_override_skips_first_insurer() {
        let (invoice, mut line) = setup(dec!(100));
        line.nopay_ins1 = true;
        assert_eq!(derive(&invoice, &line).current_payer, Some(PayerSlot::Ins2));
    }

    #[test]
    fn test_settled_line_has_no_payer() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::Payment, PayerSlot::Ins1, dec!(80));
        push(&mut line, TransactionKind::ContractualWriteoff, PayerSlot::Ins1, dec!(19.995));
        let view = derive(&invoice, &line);
        assert_eq!(view.current_payer, None);
        assert_eq!(view.writeoff_total, Money::new(dec!(19.995)));
    }

    #[test]
    fn test_deductible_only_from_first_insurer() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::Deductible, PayerSlot::Ins1, dec!(30));
        push(&mut line, TransactionKind::Deductible, PayerSlot::Ins2, dec!(45));
        push(&mut line, TransactionKind::Deductible, PayerSlot::Ins1, dec!(20));
        assert_eq!(derive(&invoice, &line).deductible, Money::new(dec!(20)));
    }

    #[test]
    fn test_submitted_mirrors_current_payer() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::Submit, PayerSlot::Ins1, dec!(0));
        let view = derive(&invoice, &line);
        assert!(view.submitted);
        assert_eq!(view.submitted_date, Some(day()));

        push(&mut line, TransactionKind::VoidedSubmission, PayerSlot::Ins1, dec!(0));
        let view = derive(&invoice, &line);
        assert!(!view.submitted);
        assert_eq!(view.submitted_date, None);
    }

    #[test]
    fn test_adjust_customary_replaces_billable() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::AdjustCustomary, PayerSlot::Ins1, dec!(90));
        let view = derive(&invoice, &line);
        assert_eq!(view.billable, Money::new(dec!(90)));
        assert_eq!(view.balance, Money::new(dec!(90)));
    }

    #[test]
    fn test_fold_uses_id_order_not_insertion_order() {
        let (invoice, mut line) = setup(dec!(100));
        push(&mut line, TransactionKind::ChangeCurrentPayee, PayerSlot::Ins2, dec!(0));
        push(&mut line, TransactionKind::Payment, PayerSlot::Ins2, dec!(5));
        line.transactions.reverse();
        let view = derive(&invoice, &line);
        assert_eq!(view.proposed_payer, None);
    }
}
