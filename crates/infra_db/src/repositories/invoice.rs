//! Invoice repository implementation
//!
//! Invoices are loaded as an [`InvoiceBook`] for one unit of work: the
//! invoice and line rows are locked, the full transaction history of every
//! line is read in id order, and the stored reconciliation fields seed the
//! book. Saving writes new invoices, appended transactions, and the
//! recomputed derived fields in the caller's database transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{debug, info};

use core_kernel::{
    CustomerId, CustomerInsuranceId, DateRange, DiagnosisScheme, InsuranceCompanyId, InvoiceId,
    InvoiceLineId, InvoiceTransactionId, Money, OrderId, OrderLineId, UserId,
};
use domain_billing::invoice::payer_wire_name;
use domain_billing::{
    BillingError, DerivedLine, Invoice, InvoiceBook, InvoiceLine, InvoiceTransaction, Modifiers,
    PayerPolicy, PaymentExtra, TransactionKind,
};

use crate::error::DatabaseError;
use crate::repositories::DbTransaction;

/// Repository for invoices, invoice lines and their transaction ledgers
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Starts the database transaction a unit of work runs in
    pub async fn begin(&self) -> Result<DbTransaction<'static>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Loads invoices with their lines and ledgers under row locks
    ///
    /// Unknown ids are ignored; the returned book contains only the
    /// invoices that exist.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRow` if a stored row does not map onto the invoice
    /// model (unknown transaction type, inverted DOS range, half-filled
    /// payer slot).
    pub async fn load_book(
        &self,
        tx: &mut DbTransaction<'_>,
        invoice_ids: &[InvoiceId],
    ) -> Result<InvoiceBook, DatabaseError> {
        let ids: Vec<i64> = invoice_ids.iter().map(InvoiceId::get).collect();

        let invoice_rows = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT
                id, customer_id, order_id, invoice_date,
                customer_insurance1_id, insurance_company1_id,
                customer_insurance2_id, insurance_company2_id,
                customer_insurance3_id, insurance_company3_id,
                customer_insurance4_id, insurance_company4_id,
                icd_scheme, diagnosis_codes, balance
            FROM invoice
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await?;

        let line_rows = sqlx::query_as::<_, InvoiceLineRow>(
            r#"
            SELECT
                id, invoice_id, order_line_id, billing_month, billing_code,
                modifier1, modifier2, modifier3, modifier4,
                dos_from, dos_to, quantity,
                billable_amount, allowable_amount, taxes,
                bill_ins, nopay_ins1, hardship, derived
            FROM invoice_line
            WHERE invoice_id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await?;

        let line_ids: Vec<i64> = line_rows.iter().map(|row| row.id).collect();
        let transaction_rows = sqlx::query_as::<_, InvoiceTransactionRow>(
            r#"
            SELECT
                id, invoice_id, invoice_line_id, transaction_type, amount, quantity,
                customer_insurance_id, insurance_company_id, transaction_date,
                extra, comments, last_update_user_id
            FROM invoice_transaction
            WHERE invoice_line_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&line_ids)
        .fetch_all(&mut **tx)
        .await?;

        let mut ledgers: BTreeMap<i64, Vec<InvoiceTransaction>> = BTreeMap::new();
        for row in transaction_rows {
            ledgers.entry(row.invoice_line_id).or_default().push(row.into_domain()?);
        }

        let mut lines: BTreeMap<i64, Vec<InvoiceLine>> = BTreeMap::new();
        for row in line_rows {
            let transactions = ledgers.remove(&row.id).unwrap_or_default();
            lines.entry(row.invoice_id).or_default().push(row.into_domain(transactions)?);
        }

        let invoices = invoice_rows
            .into_iter()
            .map(|row| {
                let invoice_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_domain(invoice_lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(requested = ids.len(), loaded = invoices.len(), "Invoice book loaded");
        Ok(InvoiceBook::from_invoices(invoices))
    }

    /// Writes a book back
    ///
    /// Invoices created in the book are inserted with their lines and
    /// transactions; transactions appended to loaded lines are inserted in
    /// posting order; every loaded line gets its derived fields rewritten
    /// and every loaded invoice its balance. Row ids come from the table
    /// sequences, so the provisional ids used inside the book are mapped in
    /// the returned report.
    ///
    /// # Errors
    ///
    /// Returns `Billing(StaleView)` if any line still has unreconciled
    /// postings.
    pub async fn save_book(
        &self,
        tx: &mut DbTransaction<'_>,
        book: &InvoiceBook,
    ) -> Result<SavedBook, DatabaseError> {
        if let Some(stale) = book
            .invoices()
            .flat_map(|invoice| invoice.lines.iter())
            .find(|line| book.is_stale(line.id))
        {
            return Err(BillingError::StaleView(stale.id).into());
        }

        let mut saved = SavedBook::default();
        let created: Vec<InvoiceId> = book.created_invoices().map(|invoice| invoice.id).collect();

        for invoice in book.created_invoices() {
            let invoice_id = insert_invoice(tx, invoice).await?;
            saved.invoice_ids.insert(invoice.id, invoice_id);

            for line in &invoice.lines {
                let line_id = insert_line(tx, invoice_id, line).await?;
                saved.line_ids.insert(line.id, line_id);

                for transaction in &line.transactions {
                    insert_transaction(tx, invoice_id, line_id, transaction).await?;
                    saved.transactions_inserted += 1;
                }
            }
        }

        for transaction in book.appended_transactions() {
            insert_transaction(tx, transaction.invoice_id, transaction.line_id, transaction).await?;
            saved.transactions_inserted += 1;
        }

        for invoice in book.invoices().filter(|invoice| !created.contains(&invoice.id)) {
            for line in &invoice.lines {
                update_line(tx, line).await?;
                saved.lines_updated += 1;
            }
            sqlx::query("UPDATE invoice SET balance = $2 WHERE id = $1")
                .bind(invoice.id.get())
                .bind(invoice.balance.amount())
                .execute(&mut **tx)
                .await?;
        }

        info!(
            invoices_created = saved.invoice_ids.len(),
            transactions = saved.transactions_inserted,
            lines_updated = saved.lines_updated,
            "Invoice book saved"
        );
        Ok(saved)
    }

    /// Returns up to `limit` invoice ids greater than `after`, ascending
    pub async fn invoice_ids_after(
        &self,
        after: Option<InvoiceId>,
        limit: i64,
    ) -> Result<Vec<InvoiceId>, DatabaseError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM invoice WHERE id > $1 ORDER BY id LIMIT $2",
        )
        .bind(after.map_or(0, |id| id.get()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(InvoiceId::new).collect())
    }

    /// Deletes transactions whose invoice line no longer exists
    pub async fn delete_orphan_transactions(&self, tx: &mut DbTransaction<'_>) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM invoice_transaction t
            WHERE NOT EXISTS (SELECT 1 FROM invoice_line l WHERE l.id = t.invoice_line_id)
            "#,
        )
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            info!(deleted = result.rows_affected(), "Orphaned invoice transactions removed");
        }
        Ok(result.rows_affected())
    }
}

/// Ids assigned to rows created by [`InvoiceRepository::save_book`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedBook {
    /// Provisional invoice id to stored id
    pub invoice_ids: BTreeMap<InvoiceId, InvoiceId>,
    /// Provisional line id to stored id
    pub line_ids: BTreeMap<InvoiceLineId, InvoiceLineId>,
    pub transactions_inserted: usize,
    pub lines_updated: usize,
}

async fn insert_invoice(tx: &mut DbTransaction<'_>, invoice: &Invoice) -> Result<InvoiceId, DatabaseError> {
    let slot = |i: usize| invoice.policies[i];
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice (
            customer_id, order_id, invoice_date,
            customer_insurance1_id, insurance_company1_id,
            customer_insurance2_id, insurance_company2_id,
            customer_insurance3_id, insurance_company3_id,
            customer_insurance4_id, insurance_company4_id,
            icd_scheme, diagnosis_codes, balance
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(invoice.customer_id.get())
    .bind(invoice.order_id.get())
    .bind(invoice.invoice_date)
    .bind(slot(0).map(|p| p.policy_id.get()))
    .bind(slot(0).map(|p| p.company_id.get()))
    .bind(slot(1).map(|p| p.policy_id.get()))
    .bind(slot(1).map(|p| p.company_id.get()))
    .bind(slot(2).map(|p| p.policy_id.get()))
    .bind(slot(2).map(|p| p.company_id.get()))
    .bind(slot(3).map(|p| p.policy_id.get()))
    .bind(slot(3).map(|p| p.company_id.get()))
    .bind(scheme_name(invoice.diagnosis_scheme))
    .bind(&invoice.diagnosis_codes)
    .bind(invoice.balance.amount())
    .fetch_one(&mut **tx)
    .await?;

    Ok(InvoiceId::new(id))
}

async fn insert_line(
    tx: &mut DbTransaction<'_>,
    invoice_id: InvoiceId,
    line: &InvoiceLine,
) -> Result<InvoiceLineId, DatabaseError> {
    let derived = &line.derived;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_line (
            invoice_id, order_line_id, billing_month, billing_code,
            modifier1, modifier2, modifier3, modifier4,
            dos_from, dos_to, quantity,
            billable_amount, allowable_amount, taxes,
            bill_ins, nopay_ins1, hardship,
            payment_amount, writeoff_amount, deductible_amount, balance,
            current_payer, submits, pendings, zero_payments,
            submitted, submitted_date, derived
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
            $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28
        )
        RETURNING id
        "#,
    )
    .bind(invoice_id.get())
    .bind(line.order_line_id.get())
    .bind(line.billing_month)
    .bind(&line.billing_code)
    .bind(line.modifiers.get(1))
    .bind(line.modifiers.get(2))
    .bind(line.modifiers.get(3))
    .bind(line.modifiers.get(4))
    .bind(line.dos.start)
    .bind(line.dos.end)
    .bind(line.quantity)
    .bind(line.billable_amount.amount())
    .bind(line.allowable_amount.amount())
    .bind(line.taxes.amount())
    .bind(bill_ins_mask(&line.bill_ins))
    .bind(line.nopay_ins1)
    .bind(line.hardship)
    .bind(derived.payment_total.amount())
    .bind(derived.writeoff_total.amount())
    .bind(derived.deductible.amount())
    .bind(derived.balance.amount())
    .bind(payer_wire_name(derived.current_payer))
    .bind(i16::from(derived.submits.bits()))
    .bind(i16::from(derived.pendings.bits()))
    .bind(i16::from(derived.zero_payments.bits()))
    .bind(derived.submitted)
    .bind(derived.submitted_date)
    .bind(Json(derived))
    .fetch_one(&mut **tx)
    .await?;

    Ok(InvoiceLineId::new(id))
}

async fn update_line(tx: &mut DbTransaction<'_>, line: &InvoiceLine) -> Result<(), DatabaseError> {
    let derived = &line.derived;
    sqlx::query(
        r#"
        UPDATE invoice_line SET
            billable_amount = $2,
            allowable_amount = $3,
            taxes = $4,
            payment_amount = $5,
            writeoff_amount = $6,
            deductible_amount = $7,
            balance = $8,
            current_payer = $9,
            submits = $10,
            pendings = $11,
            zero_payments = $12,
            submitted = $13,
            submitted_date = $14,
            derived = $15
        WHERE id = $1
        "#,
    )
    .bind(line.id.get())
    .bind(line.billable_amount.amount())
    .bind(line.allowable_amount.amount())
    .bind(line.taxes.amount())
    .bind(derived.payment_total.amount())
    .bind(derived.writeoff_total.amount())
    .bind(derived.deductible.amount())
    .bind(derived.balance.amount())
    .bind(payer_wire_name(derived.current_payer))
    .bind(i16::from(derived.submits.bits()))
    .bind(i16::from(derived.pendings.bits()))
    .bind(i16::from(derived.zero_payments.bits()))
    .bind(derived.submitted)
    .bind(derived.submitted_date)
    .bind(Json(derived))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_transaction(
    tx: &mut DbTransaction<'_>,
    invoice_id: InvoiceId,
    line_id: InvoiceLineId,
    transaction: &InvoiceTransaction,
) -> Result<InvoiceTransactionId, DatabaseError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_transaction (
            invoice_id, invoice_line_id, transaction_type, amount, quantity,
            customer_insurance_id, insurance_company_id, transaction_date,
            extra, comments, last_update_user_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(invoice_id.get())
    .bind(line_id.get())
    .bind(transaction.kind.legacy_name())
    .bind(transaction.amount.amount())
    .bind(transaction.quantity)
    .bind(transaction.customer_insurance_id.map(|id| id.get()))
    .bind(transaction.insurance_company_id.map(|id| id.get()))
    .bind(transaction.transaction_date)
    .bind(transaction.extra.as_ref().map(Json))
    .bind(transaction.comments.as_deref())
    .bind(transaction.actor.get())
    .fetch_one(&mut **tx)
    .await?;

    Ok(InvoiceTransactionId::new(id))
}

fn scheme_name(scheme: DiagnosisScheme) -> &'static str {
    match scheme {
        DiagnosisScheme::Icd9 => "ICD9",
        DiagnosisScheme::Icd10 => "ICD10",
    }
}

fn parse_scheme(value: &str) -> Option<DiagnosisScheme> {
    match value.trim() {
        "ICD9" => Some(DiagnosisScheme::Icd9),
        "ICD10" => Some(DiagnosisScheme::Icd10),
        _ => None,
    }
}

/// Packs the per-insurer bill flags, insurer 1 in bit 0
fn bill_ins_mask(flags: &[bool; 4]) -> i16 {
    flags
        .iter()
        .enumerate()
        .filter(|(_, billable)| **billable)
        .fold(0, |mask, (i, _)| mask | (1i16 << i))
}

fn bill_ins_flags(mask: i16) -> [bool; 4] {
    [0, 1, 2, 3].map(|i| mask & (1i16 << i) != 0)
}

/// Database row for an invoice header
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub id: i64,
    pub customer_id: i64,
    pub order_id: i64,
    pub invoice_date: NaiveDate,
    pub customer_insurance1_id: Option<i64>,
    pub insurance_company1_id: Option<i64>,
    pub customer_insurance2_id: Option<i64>,
    pub insurance_company2_id: Option<i64>,
    pub customer_insurance3_id: Option<i64>,
    pub insurance_company3_id: Option<i64>,
    pub customer_insurance4_id: Option<i64>,
    pub insurance_company4_id: Option<i64>,
    pub icd_scheme: String,
    pub diagnosis_codes: Vec<String>,
    pub balance: Decimal,
}

impl InvoiceRow {
    fn into_domain(self, lines: Vec<InvoiceLine>) -> Result<Invoice, DatabaseError> {
        let slots = [
            (self.customer_insurance1_id, self.insurance_company1_id),
            (self.customer_insurance2_id, self.insurance_company2_id),
            (self.customer_insurance3_id, self.insurance_company3_id),
            (self.customer_insurance4_id, self.insurance_company4_id),
        ];
        let mut policies = [None; 4];
        for (i, slot) in slots.into_iter().enumerate() {
            policies[i] = match slot {
                (Some(policy), Some(company)) => Some(PayerPolicy {
                    policy_id: CustomerInsuranceId::new(policy),
                    company_id: InsuranceCompanyId::new(company),
                }),
                (None, None) => None,
                _ => {
                    return Err(DatabaseError::corrupt(
                        "invoice",
                        self.id,
                        format!("payer slot {} has a policy without a company", i + 1),
                    ))
                }
            };
        }

        let diagnosis_scheme = parse_scheme(&self.icd_scheme).ok_or_else(|| {
            DatabaseError::corrupt("invoice", self.id, format!("unknown ICD scheme '{}'", self.icd_scheme))
        })?;

        let mut invoice = Invoice::new(
            InvoiceId::new(self.id),
            CustomerId::new(self.customer_id),
            OrderId::new(self.order_id),
            self.invoice_date,
        );
        invoice.policies = policies;
        invoice.diagnosis_scheme = diagnosis_scheme;
        invoice.diagnosis_codes = self.diagnosis_codes;
        invoice.balance = Money::new(self.balance);
        invoice.lines = lines;
        Ok(invoice)
    }
}

/// Database row for an invoice line
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceLineRow {
    pub id: i64,
    pub invoice_id: i64,
    pub order_line_id: i64,
    pub billing_month: i32,
    pub billing_code: String,
    pub modifier1: String,
    pub modifier2: String,
    pub modifier3: String,
    pub modifier4: String,
    pub dos_from: NaiveDate,
    pub dos_to: NaiveDate,
    pub quantity: Decimal,
    pub billable_amount: Decimal,
    pub allowable_amount: Decimal,
    pub taxes: Decimal,
    pub bill_ins: i16,
    pub nopay_ins1: bool,
    pub hardship: bool,
    pub derived: Json<DerivedLine>,
}

impl InvoiceLineRow {
    fn into_domain(self, transactions: Vec<InvoiceTransaction>) -> Result<InvoiceLine, DatabaseError> {
        let dos = DateRange::new(self.dos_from, self.dos_to)
            .map_err(|e| DatabaseError::corrupt("invoice_line", self.id, e))?;

        let mut line = InvoiceLine::new(
            InvoiceLineId::new(self.id),
            InvoiceId::new(self.invoice_id),
            OrderLineId::new(self.order_line_id),
            dos,
            Money::new(self.billable_amount),
            Money::new(self.allowable_amount),
        );
        line.billing_month = self.billing_month;
        line.billing_code = self.billing_code;
        line.modifiers = Modifiers::new(&self.modifier1, &self.modifier2, &self.modifier3, &self.modifier4);
        line.quantity = self.quantity;
        line.taxes = Money::new(self.taxes);
        line.bill_ins = bill_ins_flags(self.bill_ins);
        line.nopay_ins1 = self.nopay_ins1;
        line.hardship = self.hardship;
        line.derived = self.derived.0;
        line.transactions = transactions;
        Ok(line)
    }
}

/// Database row for an invoice ledger transaction
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceTransactionRow {
    pub id: i64,
    pub invoice_id: i64,
    pub invoice_line_id: i64,
    pub transaction_type: String,
    pub amount: Decimal,
    pub quantity: Decimal,
    pub customer_insurance_id: Option<i64>,
    pub insurance_company_id: Option<i64>,
    pub transaction_date: NaiveDate,
    pub extra: Option<Json<PaymentExtra>>,
    pub comments: Option<String>,
    pub last_update_user_id: i64,
}

impl InvoiceTransactionRow {
    fn into_domain(self) -> Result<InvoiceTransaction, DatabaseError> {
        let kind: TransactionKind = self
            .transaction_type
            .parse()
            .map_err(|e: BillingError| DatabaseError::corrupt("invoice_transaction", self.id, e))?;

        Ok(InvoiceTransaction {
            id: InvoiceTransactionId::new(self.id),
            invoice_id: InvoiceId::new(self.invoice_id),
            line_id: InvoiceLineId::new(self.invoice_line_id),
            kind,
            amount: Money::new(self.amount),
            quantity: self.quantity,
            customer_insurance_id: self.customer_insurance_id.map(CustomerInsuranceId::new),
            insurance_company_id: self.insurance_company_id.map(InsuranceCompanyId::new),
            transaction_date: self.transaction_date,
            extra: self.extra.map(|extra| extra.0),
            comments: self.comments,
            actor: UserId::new(self.last_update_user_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn invoice_row() -> InvoiceRow {
        InvoiceRow {
            id: 7,
            customer_id: 1,
            order_id: 2,
            invoice_date: day(1),
            customer_insurance1_id: Some(10),
            insurance_company1_id: Some(100),
            customer_insurance2_id: None,
            insurance_company2_id: None,
            customer_insurance3_id: None,
            insurance_company3_id: None,
            customer_insurance4_id: None,
            insurance_company4_id: None,
            icd_scheme: "ICD10".to_string(),
            diagnosis_codes: vec!["J44.9".to_string()],
            balance: dec!(120.50),
        }
    }

    fn line_row() -> InvoiceLineRow {
        InvoiceLineRow {
            id: 70,
            invoice_id: 7,
            order_line_id: 3,
            billing_month: 2,
            billing_code: "E0431".to_string(),
            modifier1: "RR".to_string(),
            modifier2: "KI".to_string(),
            modifier3: String::new(),
            modifier4: String::new(),
            dos_from: day(1),
            dos_to: day(31),
            quantity: dec!(1),
            billable_amount: dec!(120.50),
            allowable_amount: dec!(95),
            taxes: dec!(0),
            bill_ins: 0b0101,
            nopay_ins1: false,
            hardship: true,
            derived: Json(DerivedLine::unreconciled(Money::new(dec!(120.50)))),
        }
    }

    fn transaction_row(kind: &str) -> InvoiceTransactionRow {
        InvoiceTransactionRow {
            id: 700,
            invoice_id: 7,
            invoice_line_id: 70,
            transaction_type: kind.to_string(),
            amount: dec!(80),
            quantity: dec!(0),
            customer_insurance_id: Some(10),
            insurance_company_id: Some(100),
            transaction_date: day(15),
            extra: Some(Json(PaymentExtra::paid(Money::new(dec!(80))))),
            comments: None,
            last_update_user_id: 9,
        }
    }

    #[test]
    fn test_bill_ins_mask_round_trip() {
        let flags = [true, false, true, false];
        assert_eq!(bill_ins_mask(&flags), 0b0101);
        assert_eq!(bill_ins_flags(0b0101), flags);
        assert_eq!(bill_ins_flags(15), [true; 4]);
    }

    #[test]
    fn test_invoice_row_into_domain() {
        let line = line_row().into_domain(Vec::new()).unwrap();
        let invoice = invoice_row().into_domain(vec![line]).unwrap();

        assert_eq!(invoice.id, InvoiceId::new(7));
        assert_eq!(invoice.diagnosis_scheme, DiagnosisScheme::Icd10);
        assert_eq!(invoice.policies[0].map(|p| p.company_id), Some(InsuranceCompanyId::new(100)));
        assert!(invoice.policies[1].is_none());
        assert_eq!(invoice.balance, Money::new(dec!(120.50)));
        assert_eq!(invoice.lines.len(), 1);
    }

    #[test]
    fn test_half_filled_payer_slot_is_corrupt() {
        let mut row = invoice_row();
        row.insurance_company1_id = None;
        let error = row.into_domain(Vec::new()).unwrap_err();
        assert!(matches!(error, DatabaseError::CorruptRow(_)));
    }

    #[test]
    fn test_line_row_into_domain() {
        let line = line_row().into_domain(Vec::new()).unwrap();
        assert_eq!(line.modifiers.get(1), "RR");
        assert_eq!(line.modifiers.get(2), "KI");
        assert_eq!(line.bill_ins, [true, false, true, false]);
        assert!(line.hardship);
        assert_eq!(line.dos.days(), 31);
    }

    #[test]
    fn test_inverted_dos_is_corrupt() {
        let mut row = line_row();
        row.dos_to = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
        assert!(matches!(row.into_domain(Vec::new()), Err(DatabaseError::CorruptRow(_))));
    }

    #[test]
    fn test_transaction_row_uses_legacy_names() {
        let transaction = transaction_row("Auto Submit").into_domain().unwrap();
        assert_eq!(transaction.kind, TransactionKind::AutoSubmit);
        assert_eq!(transaction.actor, UserId::new(9));
        assert_eq!(transaction.extra.and_then(|e| e.paid), Some(Money::new(dec!(80))));

        let error = transaction_row("Refund").into_domain().unwrap_err();
        assert!(error.to_string().contains("Refund"));
    }

    #[test]
    fn test_loaded_book_is_fresh() {
        let transaction = transaction_row("Payment").into_domain().unwrap();
        let line = line_row().into_domain(vec![transaction]).unwrap();
        let invoice = invoice_row().into_domain(vec![line]).unwrap();
        let book = InvoiceBook::from_invoices([invoice]);

        assert!(!book.has_stale_lines());
        assert!(book.view(InvoiceLineId::new(70)).is_ok());
    }
}
