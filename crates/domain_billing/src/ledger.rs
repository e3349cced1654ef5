//! Invoice ledger book
//!
//! `InvoiceBook` holds a set of invoices with their lines and transaction
//! histories, loaded under lock for one unit of work. Every posting marks
//! its line stale; the derived view of a stale line cannot be read until the
//! line has been recalculated, so decisions are always made on a view that
//! reflects every posting before it.
//!
//! Higher-level operations follow the same shape: recalculate, append
//! transactions, recalculate again.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use core_kernel::{
    InsuranceCompanyId, InvoiceId, InvoiceLineId, InvoiceTransactionId, Money, UserId,
};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceLine, PayerSlot};
use crate::payment::{
    duplicate_check_number, PaymentExtra, PaymentOptions, PostingResult, ALREADY_EXISTS,
    AUTOSUBMIT_COMPANY_WRONG, LINE_NOT_FOUND, PAID_NOT_SPECIFIED,
};
use crate::reconcile::{derive, slot_of, DerivedLine};
use crate::transaction::{
    InvoiceTransaction, LineField, TransactionDraft, TransactionEffect, TransactionKind,
};

/// Rejection returned by whole-invoice operations for an unknown invoice
pub const INVOICE_NOT_FOUND: &str = "InvoiceID is wrong";

/// Which invoice lines an operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSelector {
    All,
    Invoices(BTreeSet<InvoiceId>),
    Lines(BTreeSet<InvoiceLineId>),
}

impl LineSelector {
    /// Parses a comma-joined invoice id list, or `"all"`
    pub fn parse_invoices(list: &str) -> Result<Self, BillingError> {
        Self::parse_list(list, LineSelector::Invoices)
    }

    /// Parses a comma-joined invoice line id list, or `"all"`
    pub fn parse_lines(list: &str) -> Result<Self, BillingError> {
        Self::parse_list(list, LineSelector::Lines)
    }

    fn parse_list<T: std::str::FromStr + Ord>(
        list: &str,
        wrap: impl FnOnce(BTreeSet<T>) -> Self,
    ) -> Result<Self, BillingError> {
        if list.trim().eq_ignore_ascii_case("all") {
            return Ok(LineSelector::All);
        }
        list.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse().map_err(|_| BillingError::InvalidSelector(t.to_string())))
            .collect::<Result<BTreeSet<T>, _>>()
            .map(wrap)
    }

    /// Selector for the single-line form: a line, an invoice, or everything
    pub fn single(invoice: Option<InvoiceId>, line: Option<InvoiceLineId>) -> Self {
        match (invoice, line) {
            (_, Some(line)) => LineSelector::Lines(BTreeSet::from([line])),
            (Some(invoice), None) => LineSelector::Invoices(BTreeSet::from([invoice])),
            (None, None) => LineSelector::All,
        }
    }

    pub fn line(line: InvoiceLineId) -> Self {
        LineSelector::Lines(BTreeSet::from([line]))
    }

    pub fn invoice(invoice: InvoiceId) -> Self {
        LineSelector::Invoices(BTreeSet::from([invoice]))
    }
}

/// Receipt for an appended transaction
///
/// The line it names is stale until recalculated.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posted {
    pub line_id: InvoiceLineId,
    pub transaction_id: InvoiceTransactionId,
}

/// Invoices, lines and ledgers for one unit of work
#[derive(Debug, Default)]
pub struct InvoiceBook {
    invoices: BTreeMap<InvoiceId, Invoice>,
    line_index: BTreeMap<InvoiceLineId, InvoiceId>,
    dirty: BTreeSet<InvoiceLineId>,
    created_invoices: BTreeSet<InvoiceId>,
    appended: Vec<(InvoiceId, InvoiceLineId, InvoiceTransactionId)>,
    next_invoice_id: i64,
    next_line_id: i64,
    next_transaction_id: i64,
}

impl InvoiceBook {
    pub fn new() -> Self {
        Self {
            next_invoice_id: 1,
            next_line_id: 1,
            next_transaction_id: 1,
            ..Self::default()
        }
    }

    /// Builds a book over persisted invoices
    ///
    /// Loaded lines keep their stored derived fields and are considered
    /// fresh. Ids for new rows continue after the highest loaded id; they are
    /// provisional until the book is saved.
    pub fn from_invoices(invoices: impl IntoIterator<Item = Invoice>) -> Self {
        let mut book = Self::new();
        for invoice in invoices {
            book.next_invoice_id = book.next_invoice_id.max(invoice.id.get() + 1);
            for line in &invoice.lines {
                book.next_line_id = book.next_line_id.max(line.id.get() + 1);
                for tx in &line.transactions {
                    book.next_transaction_id = book.next_transaction_id.max(tx.id.get() + 1);
                }
                book.line_index.insert(line.id, invoice.id);
            }
            book.invoices.insert(invoice.id, invoice);
        }
        book
    }

    pub fn allocate_invoice_id(&mut self) -> InvoiceId {
        let id = InvoiceId::new(self.next_invoice_id);
        self.next_invoice_id += 1;
        id
    }

    pub fn allocate_line_id(&mut self) -> InvoiceLineId {
        let id = InvoiceLineId::new(self.next_line_id);
        self.next_line_id += 1;
        id
    }

    /// Adds a newly generated invoice; its lines start stale
    pub fn insert_invoice(&mut self, invoice: Invoice) -> InvoiceId {
        let id = invoice.id;
        for line in &invoice.lines {
            self.line_index.insert(line.id, id);
            self.dirty.insert(line.id);
        }
        self.created_invoices.insert(id);
        self.invoices.insert(id, invoice);
        id
    }

    pub fn invoice(&self, id: InvoiceId) -> Option<&Invoice> {
        self.invoices.get(&id)
    }

    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    pub fn line(&self, id: InvoiceLineId) -> Option<&InvoiceLine> {
        let invoice_id = self.line_index.get(&id)?;
        self.invoices.get(invoice_id)?.line(id)
    }

    /// Invoices created in this unit of work
    pub fn created_invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.created_invoices.iter().filter_map(|id| self.invoices.get(id))
    }

    /// Transactions appended to pre-existing lines in this unit of work
    pub fn appended_transactions(&self) -> impl Iterator<Item = &InvoiceTransaction> {
        self.appended
            .iter()
            .filter(|(invoice_id, _, _)| !self.created_invoices.contains(invoice_id))
            .filter_map(|(_, line_id, tx_id)| {
                self.line(*line_id)?.transactions.iter().find(|tx| tx.id == *tx_id)
            })
    }

    pub fn is_stale(&self, line: InvoiceLineId) -> bool {
        self.dirty.contains(&line)
    }

    pub fn has_stale_lines(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Derived view of a line
    ///
    /// # Errors
    ///
    /// Returns `StaleView` when the line has postings that have not been
    /// reconciled yet.
    pub fn view(&self, line_id: InvoiceLineId) -> Result<&DerivedLine, BillingError> {
        if self.dirty.contains(&line_id) {
            return Err(BillingError::StaleView(line_id));
        }
        self.line(line_id)
            .map(|l| &l.derived)
            .ok_or(BillingError::LineNotFound(line_id))
    }

    /// Appends a transaction to a line and marks the line stale
    ///
    /// The payer slot is resolved into the invoice's policy. "Adjust"
    /// transactions record the field's previous value in their comment and
    /// overwrite the field when it changes by more than a tenth of a cent.
    pub fn post(&mut self, line_id: InvoiceLineId, draft: TransactionDraft) -> Result<Posted, BillingError> {
        let invoice_id = *self
            .line_index
            .get(&line_id)
            .ok_or(BillingError::LineNotFound(line_id))?;
        let transaction_id = InvoiceTransactionId::new(self.next_transaction_id);

        let invoice = self
            .invoices
            .get_mut(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
        let policy = invoice.policy(draft.payer).copied();
        let line = invoice
            .line_mut(line_id)
            .ok_or(BillingError::LineNotFound(line_id))?;

        let mut comments = draft.comments;
        if let TransactionEffect::Replace(field) = draft.kind.effect() {
            let target = match field {
                LineField::Allowable => &mut line.allowable_amount,
                LineField::Billable => &mut line.billable_amount,
                LineField::Taxes => &mut line.taxes,
            };
            let previous = format!("Previous value: {}", target.amount());
            comments = Some(match comments {
                Some(text) => format!("{}; {}", previous, text),
                None => previous,
            });
            if target.differs_by_mill(draft.amount) {
                *target = draft.amount;
            }
        }

        line.transactions.push(InvoiceTransaction {
            id: transaction_id,
            invoice_id,
            line_id,
            kind: draft.kind,
            amount: draft.amount,
            quantity: draft.quantity,
            customer_insurance_id: policy.map(|p| p.policy_id),
            insurance_company_id: policy.map(|p| p.company_id),
            transaction_date: draft.transaction_date,
            extra: draft.extra,
            comments,
            actor: draft.actor,
        });

        self.next_transaction_id += 1;
        self.dirty.insert(line_id);
        self.appended.push((invoice_id, line_id, transaction_id));

        Ok(Posted { line_id, transaction_id })
    }

    fn select(&self, selector: &LineSelector) -> Vec<InvoiceLineId> {
        match selector {
            LineSelector::All => self
                .invoices
                .values()
                .flat_map(|inv| inv.lines.iter().map(|l| l.id))
                .collect(),
            LineSelector::Invoices(ids) => ids
                .iter()
                .filter_map(|id| self.invoices.get(id))
                .flat_map(|inv| inv.lines.iter().map(|l| l.id))
                .collect(),
            LineSelector::Lines(ids) => ids
                .iter()
                .filter(|id| self.line_index.contains_key(id))
                .copied()
                .collect(),
        }
    }

    fn recalculate_line(&mut self, line_id: InvoiceLineId) -> Result<(), BillingError> {
        let invoice_id = *self
            .line_index
            .get(&line_id)
            .ok_or(BillingError::LineNotFound(line_id))?;
        let invoice = self
            .invoices
            .get_mut(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        let view = {
            let line = invoice.line(line_id).ok_or(BillingError::LineNotFound(line_id))?;
            derive(invoice, line)
        };
        let line = invoice
            .line_mut(line_id)
            .ok_or(BillingError::LineNotFound(line_id))?;
        line.billable_amount = view.billable;
        line.allowable_amount = view.allowable;
        line.taxes = view.taxes;
        line.derived = view;

        self.dirty.remove(&line_id);
        Ok(())
    }

    fn recalculate_lines(&mut self, lines: &[InvoiceLineId]) -> Result<(), BillingError> {
        for line_id in lines {
            self.recalculate_line(*line_id)?;
        }
        Ok(())
    }

    /// Recomputes the derived fields of every selected line
    ///
    /// Unknown ids in the selector match nothing.
    pub fn recalculate(&mut self, selector: &LineSelector) -> Result<usize, BillingError> {
        let lines = self.select(selector);
        self.recalculate_lines(&lines)?;
        Ok(lines.len())
    }

    /// Fast path keyed by at most one invoice and one line
    ///
    /// Produces the same result as [`InvoiceBook::recalculate`] for the same
    /// lines.
    pub fn recalculate_single(
        &mut self,
        invoice: Option<InvoiceId>,
        line: Option<InvoiceLineId>,
    ) -> Result<usize, BillingError> {
        match (invoice, line) {
            (invoice, Some(line_id)) => {
                let belongs = self
                    .line_index
                    .get(&line_id)
                    .is_some_and(|owner| invoice.map_or(true, |i| i == *owner));
                if !belongs {
                    return Ok(0);
                }
                self.recalculate_line(line_id)?;
                Ok(1)
            }
            (invoice, None) => self.recalculate(&LineSelector::single(invoice, None)),
        }
    }

    fn has_payer_transaction(&self, line: &InvoiceLine, kind: TransactionKind, payer: PayerSlot) -> bool {
        let Some(invoice) = self.invoices.get(&line.invoice_id) else {
            return false;
        };
        line.transactions
            .iter()
            .any(|tx| tx.kind == kind && slot_of(invoice, tx) == Some(payer))
    }

    /// Checks a remittance against payments already on the line
    fn check_duplicate(line: &InvoiceLine, extra: &PaymentExtra) -> Option<PostingResult> {
        let (Some(check), Some(guid)) = (extra.check_number.as_deref(), extra.posting_guid) else {
            return None;
        };
        let mut previous = line
            .transactions
            .iter()
            .filter(|tx| matches!(tx.kind, TransactionKind::Payment | TransactionKind::Denied))
            .filter_map(|tx| tx.extra.as_ref())
            .filter(|e| e.check_number.as_deref() == Some(check));

        previous.next().map(|e| {
            if e.posting_guid == Some(guid) || previous.any(|e| e.posting_guid == Some(guid)) {
                PostingResult::rejected(ALREADY_EXISTS)
            } else {
                PostingResult::Rejected(duplicate_check_number(check))
            }
        })
    }

    /// Posts a remittance for one payer against one line
    ///
    /// # Arguments
    ///
    /// * `line_id` - Invoice line being paid
    /// * `payer` - Slot the payment comes from
    /// * `date` - Transaction date
    /// * `extra` - Reported amounts and check/posting keys
    /// * `options` - Posting options
    /// * `actor` - User performing the posting
    ///
    /// # Returns
    ///
    /// `Rejected` with the legacy message when the line is unknown, the paid
    /// amount is missing, or the remittance was already posted; nothing is
    /// written in that case.
    pub fn add_payment(
        &mut self,
        line_id: InvoiceLineId,
        payer: PayerSlot,
        date: NaiveDate,
        extra: PaymentExtra,
        options: PaymentOptions,
        actor: UserId,
    ) -> Result<PostingResult, BillingError> {
        let Some(line) = self.line(line_id) else {
            warn!(line_id = %line_id, "Payment rejected: unknown invoice line");
            return Ok(PostingResult::rejected(LINE_NOT_FOUND));
        };
        let Some(paid) = extra.paid else {
            warn!(line_id = %line_id, "Payment rejected: no paid amount");
            return Ok(PostingResult::rejected(PAID_NOT_SPECIFIED));
        };
        if let Some(rejection) = Self::check_duplicate(line, &extra) {
            warn!(line_id = %line_id, reason = rejection.message(), "Payment rejected");
            return Ok(rejection);
        }

        self.recalculate_line(line_id)?;
        let stored_allowable = self.view(line_id)?.allowable;
        let line = self.line(line_id).ok_or(BillingError::LineNotFound(line_id))?;

        let adjust_allowable = options.adjust_allowable
            && extra.allowable.is_some_and(|a| a.differs_by_cent(stored_allowable))
            && !self.has_payer_transaction(line, TransactionKind::AdjustAllowable, payer);
        let post_sequestration = extra.sequestration.is_some_and(|a| !a.is_negligible())
            && !self.has_payer_transaction(line, TransactionKind::SequestrationWriteoff, payer);
        let post_contractual = extra.contractual_writeoff.is_some_and(|a| !a.is_negligible())
            && !self.has_payer_transaction(line, TransactionKind::ContractualWriteoff, payer);

        let draft = |kind: TransactionKind, amount: Money| {
            TransactionDraft::new(kind, payer, date, actor).with_amount(amount)
        };
        let mut posted = Vec::new();

        if adjust_allowable {
            if let Some(allowable) = extra.allowable {
                posted.push(self.post(line_id, draft(TransactionKind::AdjustAllowable, allowable))?);
            }
        }

        let payment_kind = if options.post_denied && paid.is_negligible() {
            TransactionKind::Denied
        } else {
            TransactionKind::Payment
        };
        posted.push(self.post(line_id, draft(payment_kind, paid).with_extra(extra.clone()))?);

        if post_sequestration {
            if let Some(amount) = extra.sequestration {
                posted.push(self.post(line_id, draft(TransactionKind::SequestrationWriteoff, amount))?);
            }
        }
        if post_contractual {
            if let Some(amount) = extra.contractual_writeoff {
                posted.push(self.post(line_id, draft(TransactionKind::ContractualWriteoff, amount))?);
            }
        }
        if payer == PayerSlot::Ins1 {
            if let Some(deductible) = extra.deductible {
                posted.push(self.post(line_id, draft(TransactionKind::Deductible, deductible))?);
            }
        }

        self.recalculate_line(line_id)?;

        let hardship = self.line(line_id).is_some_and(|l| l.hardship);
        let view = self.view(line_id)?;
        let (balance, current_payer) = (view.balance, view.current_payer);
        let write_off = (hardship && current_payer == Some(PayerSlot::Patient)) || options.writeoff_balance;
        // an overpaid line keeps its credit for a refund
        if write_off && !balance.is_below_cent() {
            let writeoff_payer = current_payer.unwrap_or(payer);
            posted.push(self.post(
                line_id,
                TransactionDraft::new(TransactionKind::Writeoff, writeoff_payer, date, actor).with_amount(balance),
            )?);
            self.recalculate_line(line_id)?;
        }

        info!(
            line_id = %line_id,
            payer = %payer,
            paid = %paid,
            transactions = posted.len(),
            "Payment posted"
        );
        Ok(PostingResult::Posted(posted.into_iter().map(|p| p.transaction_id).collect()))
    }

    /// Posts a Submit for the line's current payer
    pub fn add_submitted(
        &mut self,
        line_id: InvoiceLineId,
        date: NaiveDate,
        actor: UserId,
    ) -> Result<PostingResult, BillingError> {
        if self.line(line_id).is_none() {
            return Ok(PostingResult::rejected(LINE_NOT_FOUND));
        }
        self.recalculate_line(line_id)?;
        let Some(payer) = self.view(line_id)?.current_payer else {
            return Ok(PostingResult::Unchanged);
        };
        let receipt = self.post(line_id, TransactionDraft::new(TransactionKind::Submit, payer, date, actor))?;
        self.recalculate_line(line_id)?;
        Ok(PostingResult::Posted(vec![receipt.transaction_id]))
    }

    /// Posts a Submit on every line of an invoice whose current payer is `target`
    pub fn invoice_add_submitted(
        &mut self,
        invoice_id: InvoiceId,
        target: PayerSlot,
        date: NaiveDate,
        actor: UserId,
    ) -> Result<PostingResult, BillingError> {
        if !self.invoices.contains_key(&invoice_id) {
            return Ok(PostingResult::rejected(INVOICE_NOT_FOUND));
        }
        let lines = self.select(&LineSelector::invoice(invoice_id));
        self.recalculate_lines(&lines)?;

        let mut posted = Vec::new();
        for line_id in &lines {
            if self.view(*line_id)?.current_payer == Some(target) {
                let receipt =
                    self.post(*line_id, TransactionDraft::new(TransactionKind::Submit, target, date, actor))?;
                posted.push(receipt.transaction_id);
            }
        }
        self.recalculate_lines(&lines)?;

        if posted.is_empty() {
            Ok(PostingResult::Unchanged)
        } else {
            Ok(PostingResult::Posted(posted))
        }
    }

    /// Posts an Auto Submit when the line's current payer belongs to `company_id`
    pub fn add_auto_submit(
        &mut self,
        line_id: InvoiceLineId,
        company_id: InsuranceCompanyId,
        date: NaiveDate,
        actor: UserId,
    ) -> Result<PostingResult, BillingError> {
        let Some(invoice_id) = self.line_index.get(&line_id).copied() else {
            return Ok(PostingResult::rejected(LINE_NOT_FOUND));
        };
        self.recalculate_line(line_id)?;
        let current = self.view(line_id)?.current_payer;
        let invoice = self
            .invoices
            .get(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        let payer = current.filter(|slot| {
            invoice
                .policy(*slot)
                .is_some_and(|policy| policy.company_id == company_id)
        });
        let Some(payer) = payer else {
            warn!(line_id = %line_id, company_id = %company_id, "Auto submit rejected");
            return Ok(PostingResult::rejected(AUTOSUBMIT_COMPANY_WRONG));
        };

        let receipt = self.post(line_id, TransactionDraft::new(TransactionKind::AutoSubmit, payer, date, actor))?;
        self.recalculate_line(line_id)?;
        Ok(PostingResult::Posted(vec![receipt.transaction_id]))
    }

    /// Voids the open submission of the current payer on selected lines
    ///
    /// Returns the number of lines reflagged.
    pub fn reflag(&mut self, selector: &LineSelector, date: NaiveDate, actor: UserId) -> Result<usize, BillingError> {
        let lines = self.select(selector);
        self.recalculate_lines(&lines)?;

        let mut count = 0;
        for line_id in &lines {
            let view = self.view(*line_id)?;
            if let Some(payer) = view.current_payer.filter(|p| view.submits.contains(*p)) {
                let _ = self.post(
                    *line_id,
                    TransactionDraft::new(TransactionKind::VoidedSubmission, payer, date, actor),
                )?;
                count += 1;
            }
        }
        self.recalculate_lines(&lines)?;
        Ok(count)
    }

    /// Writes off the remaining balance of selected lines
    pub fn writeoff_balance(
        &mut self,
        selector: &LineSelector,
        date: NaiveDate,
        actor: UserId,
    ) -> Result<usize, BillingError> {
        let lines = self.select(selector);
        self.recalculate_lines(&lines)?;

        let mut count = 0;
        for line_id in &lines {
            let view = self.view(*line_id)?;
            if view.balance.is_below_cent() {
                continue;
            }
            let payer = view.current_payer.unwrap_or(PayerSlot::Patient);
            let draft = TransactionDraft::new(TransactionKind::Writeoff, payer, date, actor).with_amount(view.balance);
            let _ = self.post(*line_id, draft)?;
            count += 1;
        }
        self.recalculate_lines(&lines)?;
        Ok(count)
    }

    /// Queues a pending submission for each line's current payer
    ///
    /// Lines whose current payer is already flagged pending, and settled lines
    /// with no current payer, are left alone.
    pub fn update_pending_submissions(
        &mut self,
        selector: &LineSelector,
        date: NaiveDate,
        actor: UserId,
    ) -> Result<usize, BillingError> {
        let lines = self.select(selector);
        self.recalculate_lines(&lines)?;

        let mut count = 0;
        for line_id in &lines {
            let view = self.view(*line_id)?;
            if let Some(payer) = view.current_payer.filter(|p| !view.pendings.contains(*p)) {
                let _ = self.post(
                    *line_id,
                    TransactionDraft::new(TransactionKind::PendingSubmission, payer, date, actor),
                )?;
                count += 1;
            }
        }
        self.recalculate_lines(&lines)?;
        Ok(count)
    }

    /// Rolls the line balances up into the invoice header
    ///
    /// # Errors
    ///
    /// Returns `StaleView` if any line of the invoice has unreconciled
    /// postings.
    pub fn update_invoice_balance(&mut self, invoice_id: InvoiceId) -> Result<Money, BillingError> {
        let invoice = self
            .invoices
            .get(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
        if let Some(stale) = invoice.lines.iter().find(|l| self.dirty.contains(&l.id)) {
            return Err(BillingError::StaleView(stale.id));
        }
        let balance = invoice.total_balance();
        if let Some(invoice) = self.invoices.get_mut(&invoice_id) {
            invoice.balance = balance;
        }
        Ok(balance)
    }
}
