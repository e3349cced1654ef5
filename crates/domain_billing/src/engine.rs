//! Order to invoice billing engine
//!
//! One pass bills one batch of an order's lines: the lines sharing a billing
//! month and a set of [`BillingFlags`]. Eligible lines produce an invoice,
//! and every line in the batch then moves its billing cursor forward.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use core_kernel::{DiagnosisScheme, InvoiceId, Money, OrderLineId, Rate, UserId};

use crate::error::BillingError;
use crate::frequency::{amount_multiplier, quantity_multiplier};
use crate::invoice::{Invoice, InvoiceLine, PayerSlot};
use crate::ledger::{InvoiceBook, LineSelector};
use crate::order::{BillingFlags, Order, OrderLine, OrderLineState};
use crate::rates::{
    allowable_amount, billable_amount, invoice_modifier, invoice_must_be_skipped, order_must_be_closed,
    order_must_be_skipped,
};
use crate::transaction::{TransactionDraft, TransactionKind};

/// Money amounts and quantity of one billing period of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCharge {
    pub billable: Money,
    pub allowable: Money,
    pub taxes: Money,
    pub quantity: Decimal,
}

/// Prices the current billing period of `line`
///
/// Taxable lines bill the taxed allowable amount; the untaxed allowable is
/// kept as the allowable. The order discount scales every amount.
///
/// # Returns
///
/// `None` when the line's ordered/billed frequency pair has no conversion.
pub fn compute_charge(line: &OrderLine, discount: Rate) -> Option<LineCharge> {
    let month = line.effective_billing_month();
    let amount_factor = amount_multiplier(
        line.dos,
        line.pickup_date,
        line.ordered_frequency,
        line.billed_frequency,
        line.sale_rent_type,
    )?;
    let quantity_factor = quantity_multiplier(
        line.dos,
        line.pickup_date,
        line.ordered_frequency,
        line.billed_frequency,
        line.sale_rent_type,
    )?;

    let allowable = allowable_amount(
        line.sale_rent_type,
        month,
        line.allowable_price,
        line.billed_quantity,
        line.sale_allowable_price,
        line.flat_rate,
    ) * amount_factor;

    let (billable, taxes) = if line.taxable {
        let taxed = allowable * line.tax_rate.markup_factor();
        (taxed, taxed - allowable)
    } else {
        let billable = billable_amount(
            line.sale_rent_type,
            month,
            line.billable_price,
            line.billed_quantity,
            line.sale_billable_price,
            line.flat_rate,
        ) * amount_factor;
        (billable, Money::ZERO)
    };

    let keep = discount.discount_factor();
    Some(LineCharge {
        billable: (billable * keep).round_to_cents(),
        allowable: (allowable * keep).round_to_cents(),
        taxes: (taxes * keep).round_to_cents(),
        quantity: line.billed_quantity * quantity_factor,
    })
}

/// Outcome of billing one batch of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRun {
    pub billing_month: i32,
    pub flags: BillingFlags,
    /// Invoice created by the run, if any line was billable
    pub invoice_id: Option<InvoiceId>,
    /// Lines whose billing cursor moved forward
    pub advanced: Vec<OrderLineId>,
    /// Lines closed because their schedule is exhausted
    pub closed: Vec<OrderLineId>,
    pub deposits_converted: usize,
}

/// Drives order lines through their billing cycles
#[derive(Debug, Clone, Copy)]
pub struct BillingEngine {
    actor: UserId,
}

impl BillingEngine {
    pub fn new(actor: UserId) -> Self {
        Self { actor }
    }

    /// Batch keys present on an order's active lines, in processing order
    pub fn partitions(order: &Order) -> BTreeSet<(i32, BillingFlags)> {
        order
            .lines
            .iter()
            .filter(|line| line.is_active())
            .map(|line| (line.effective_billing_month(), BillingFlags::for_line(order, line)))
            .collect()
    }

    fn in_batch(order: &Order, line: &OrderLine, billing_month: i32, flags: BillingFlags) -> bool {
        order.is_open()
            && line.is_active()
            && line.effective_billing_month() == billing_month
            && BillingFlags::for_line(order, line) == flags
            && !line.ended_before_service()
            && !order_must_be_skipped(&line.cycle())
    }

    /// Bills one batch of an order
    ///
    /// # Arguments
    ///
    /// * `order` - Order whose lines are billed and advanced
    /// * `book` - Book receiving the generated invoice
    /// * `billing_month` - Batch billing month (values below 1 mean 1)
    /// * `flags` - Batch billing flags
    /// * `invoice_date` - Date stamped on the invoice and on closed lines
    ///
    /// # Returns
    ///
    /// The run summary. When no line is billable no invoice is created, but
    /// the batch lines still advance.
    pub fn internal_process(
        &self,
        order: &mut Order,
        book: &mut InvoiceBook,
        billing_month: i32,
        flags: BillingFlags,
        invoice_date: NaiveDate,
    ) -> Result<BillingRun, BillingError> {
        self.process_batch(order, book, billing_month, flags, invoice_date, &BTreeSet::new())
    }

    /// Bills one batch, leaving out lines already advanced in this pass
    fn process_batch(
        &self,
        order: &mut Order,
        book: &mut InvoiceBook,
        billing_month: i32,
        flags: BillingFlags,
        invoice_date: NaiveDate,
        already_advanced: &BTreeSet<OrderLineId>,
    ) -> Result<BillingRun, BillingError> {
        let billing_month = billing_month.max(1);
        let batch: Vec<usize> = order
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !already_advanced.contains(&line.id))
            .filter(|(_, line)| Self::in_batch(order, line, billing_month, flags))
            .map(|(i, _)| i)
            .collect();

        let billable: Vec<(usize, LineCharge)> = batch
            .iter()
            .filter_map(|&i| {
                let line = &order.lines[i];
                if !line.mir.is_empty() || invoice_must_be_skipped(&line.cycle()) {
                    return None;
                }
                compute_charge(line, order.discount)
                    .filter(|charge| !charge.billable.is_zero())
                    .map(|charge| (i, charge))
            })
            .collect();

        let invoice_id = if billable.is_empty() {
            debug!(order_id = %order.id, billing_month, "No billable lines in batch");
            None
        } else {
            Some(self.create_invoice(order, book, billing_month, flags, &billable, invoice_date))
        };

        let mut run = BillingRun {
            billing_month,
            flags,
            invoice_id,
            advanced: Vec::with_capacity(batch.len()),
            closed: Vec::new(),
            deposits_converted: 0,
        };

        for &i in &batch {
            let line = &mut order.lines[i];
            let closes = order_must_be_closed(&line.cycle());
            line.dos = line.billed_frequency.advance(line.dos);
            if closes {
                line.state = OrderLineState::Closed;
                line.end_date = Some(invoice_date);
                run.closed.push(line.id);
            }
            line.billing_month = billing_month + 1;
            for index in 1..=2 {
                let code = invoice_modifier(&line.cycle(), index);
                line.modifiers.set(index, code);
            }
            run.advanced.push(line.id);
        }

        if billing_month == 1 {
            if let Some(invoice_id) = invoice_id {
                run.deposits_converted = self.convert_deposits(order, book, invoice_id)?;
            }
        }

        Ok(run)
    }

    fn create_invoice(
        &self,
        order: &Order,
        book: &mut InvoiceBook,
        billing_month: i32,
        flags: BillingFlags,
        billable: &[(usize, LineCharge)],
        invoice_date: NaiveDate,
    ) -> InvoiceId {
        let invoice_id = book.allocate_invoice_id();
        let mut invoice = Invoice::new(invoice_id, order.customer_id, order.id, invoice_date);

        for (slot, policy) in invoice.policies.iter_mut().enumerate() {
            *policy = order.policies[slot].filter(|_| flags.insurers[slot]);
        }

        let icd10_cutoff = DiagnosisScheme::icd10_effective_date();
        if billable.iter().all(|(i, _)| order.lines[*i].dos.start >= icd10_cutoff) {
            invoice.diagnosis_scheme = DiagnosisScheme::Icd10;
            invoice.diagnosis_codes = order.icd10_codes.clone();
        } else {
            invoice.diagnosis_scheme = DiagnosisScheme::Icd9;
            invoice.diagnosis_codes = order.icd9_codes.clone();
        }

        for (i, charge) in billable {
            let source = &order.lines[*i];
            let mut line = InvoiceLine::new(
                book.allocate_line_id(),
                invoice_id,
                source.id,
                source.dos,
                charge.billable,
                charge.allowable,
            );
            line.billing_month = billing_month;
            line.billing_code = source.billing_code.clone();
            for index in 1..=4 {
                line.modifiers.set(index, invoice_modifier(&source.cycle(), index));
            }
            line.quantity = charge.quantity;
            line.taxes = charge.taxes;
            line.bill_ins = source.bill_ins;
            line.nopay_ins1 = source.nopay_ins1;
            line.hardship = source.hardship;
            invoice.lines.push(line);
        }

        let total: Money = invoice.lines.iter().map(|l| l.billable_amount).sum();
        info!(
            invoice_id = %invoice_id,
            order_id = %order.id,
            billing_month,
            lines = invoice.lines.len(),
            total = %total,
            "Invoice created"
        );
        book.insert_invoice(invoice)
    }

    /// Turns the order's deposits into patient payments on the new invoice
    ///
    /// A deposit already matched by a payment with the same date and amount on
    /// any line for its order line is skipped.
    fn convert_deposits(
        &self,
        order: &Order,
        book: &mut InvoiceBook,
        invoice_id: InvoiceId,
    ) -> Result<usize, BillingError> {
        let mut converted = 0;
        for deposit in &order.deposits {
            let target = book
                .invoice(invoice_id)
                .and_then(|inv| inv.lines.iter().find(|l| l.order_line_id == deposit.order_line_id))
                .map(|l| l.id);
            let Some(line_id) = target else {
                continue;
            };

            let already_paid = book
                .invoices()
                .flat_map(|inv| inv.lines.iter())
                .filter(|l| l.order_line_id == deposit.order_line_id)
                .flat_map(|l| l.transactions.iter())
                .any(|tx| {
                    tx.kind == TransactionKind::Payment
                        && tx.customer_insurance_id.is_none()
                        && tx.transaction_date == deposit.date
                        && tx.amount == deposit.amount
                });
            if already_paid {
                continue;
            }

            let draft = TransactionDraft::new(TransactionKind::Payment, PayerSlot::Patient, deposit.date, self.actor)
                .with_amount(deposit.amount)
                .with_comments("Deposit");
            let _ = book.post(line_id, draft)?;
            converted += 1;
        }
        Ok(converted)
    }

    /// Bills every batch of an order and reconciles the resulting invoices
    ///
    /// Each line is billed for at most one period per call, even when
    /// advancing it lands it in a batch that is still to come. Each created
    /// invoice is recalculated, queued for submission, recalculated again,
    /// and its balance rolled up.
    pub fn process_order(
        &self,
        order: &mut Order,
        book: &mut InvoiceBook,
        invoice_date: NaiveDate,
    ) -> Result<Vec<BillingRun>, BillingError> {
        let mut runs = Vec::new();
        let mut advanced = BTreeSet::new();
        for (billing_month, flags) in Self::partitions(order) {
            let run = self.process_batch(order, book, billing_month, flags, invoice_date, &advanced)?;
            advanced.extend(run.advanced.iter().copied());
            if let Some(invoice_id) = run.invoice_id {
                let selector = LineSelector::invoice(invoice_id);
                book.recalculate(&selector)?;
                book.update_pending_submissions(&selector, invoice_date, self.actor)?;
                book.recalculate(&selector)?;
                book.update_invoice_balance(invoice_id)?;
            }
            runs.push(run);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::BillingFrequency;
    use crate::rates::SaleRentType;
    use core_kernel::{CustomerId, OrderId};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn line(t: SaleRentType, price: Decimal) -> OrderLine {
        OrderLine::new(OrderLineId::new(1), OrderId::new(1), "E0100", t, d(2024, 1, 1), Money::new(price))
    }

    #[test]
    fn test_charge_untaxed_monthly_rental() {
        let charge = compute_charge(&line(SaleRentType::MonthlyRental, dec!(250)), Rate::default()).unwrap();
        assert_eq!(charge.billable, Money::new(dec!(250)));
        assert_eq!(charge.allowable, Money::new(dec!(250)));
        assert_eq!(charge.taxes, Money::ZERO);
        assert_eq!(charge.quantity, dec!(1));
    }

    #[test]
    fn test_charge_taxable_uses_allowable() {
        let taxed = line(SaleRentType::OneTimeSale, dec!(100))
            .with_allowable_price(Money::new(dec!(80)))
            .with_tax(Rate::from_percentage(dec!(5)));
        let charge = compute_charge(&taxed, Rate::default()).unwrap();
        assert_eq!(charge.allowable, Money::new(dec!(80)));
        assert_eq!(charge.billable, Money::new(dec!(84)));
        assert_eq!(charge.taxes, Money::new(dec!(4)));
    }

    #[test]
    fn test_charge_discount_applies_to_every_amount() {
        let taxed = line(SaleRentType::OneTimeSale, dec!(100)).with_tax(Rate::from_percentage(dec!(10)));
        let charge = compute_charge(&taxed, Rate::from_percentage(dec!(10))).unwrap();
        assert_eq!(charge.allowable, Money::new(dec!(90)));
        assert_eq!(charge.billable, Money::new(dec!(99)));
        assert_eq!(charge.taxes, Money::new(dec!(9)));
    }

    #[test]
    fn test_charge_daily_billed_monthly() {
        let daily = line(SaleRentType::MonthlyRental, dec!(2))
            .with_quantity(dec!(3))
            .with_frequencies(BillingFrequency::Daily, BillingFrequency::Monthly);
        let charge = compute_charge(&daily, Rate::default()).unwrap();
        assert_eq!(charge.quantity, dec!(93));
        assert_eq!(charge.billable, Money::new(dec!(186)));
    }

    #[test]
    fn test_charge_undefined_frequency_pair() {
        let odd = line(SaleRentType::MonthlyRental, dec!(2))
            .with_frequencies(BillingFrequency::Monthly, BillingFrequency::Weekly);
        assert!(compute_charge(&odd, Rate::default()).is_none());
    }

    #[test]
    fn test_partitions_group_by_month_and_flags() {
        let order = Order::new(OrderId::new(1), CustomerId::new(1))
            .with_line(line(SaleRentType::MonthlyRental, dec!(10)))
            .with_line(line(SaleRentType::MonthlyRental, dec!(20)).with_billing_month(1))
            .with_line(line(SaleRentType::MonthlyRental, dec!(30)).with_billing_month(4));
        let partitions = BillingEngine::partitions(&order);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions.iter().next().map(|(m, _)| *m), Some(1));
    }
}
