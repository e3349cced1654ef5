//! Batch jobs
//!
//! Every job walks its keys in ascending order, one chunk per database
//! transaction. A chunk is loaded under row locks, rewritten through the
//! domain model and committed before the next chunk is read, so an
//! interrupted run can be resumed from the last key it logged.

use chrono::NaiveDate;
use tracing::{info, instrument};

use core_kernel::{InventoryItemId, InvoiceId, UserId, WarehouseId};
use domain_billing::{BillingError, InvoiceBook, LineSelector};
use infra_db::{DatabaseError, InventoryRepository, InvoiceRepository, StockKey};

use crate::error::JobError;

/// What an invoice job does to each loaded book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceJob {
    /// Recompute the derived fields of every line
    Recalculate,
    /// Queue a pending submission for each line's current payer
    PendingSubmissions { date: NaiveDate, actor: UserId },
}

impl InvoiceJob {
    pub fn name(&self) -> &'static str {
        match self {
            InvoiceJob::Recalculate => "recalculate-invoices",
            InvoiceJob::PendingSubmissions { .. } => "update-pending-submissions",
        }
    }

    /// Applies the job to a loaded book and rolls every invoice balance up
    ///
    /// # Returns
    ///
    /// The number of lines the job touched
    pub fn apply(&self, book: &mut InvoiceBook) -> Result<usize, BillingError> {
        let touched = match self {
            InvoiceJob::Recalculate => book.recalculate(&LineSelector::All)?,
            InvoiceJob::PendingSubmissions { date, actor } => {
                book.update_pending_submissions(&LineSelector::All, *date, *actor)?
            }
        };

        let ids: Vec<InvoiceId> = book.invoices().map(|invoice| invoice.id).collect();
        for id in ids {
            book.update_invoice_balance(id)?;
        }
        Ok(touched)
    }
}

/// Totals of an invoice job run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceJobReport {
    pub chunks: usize,
    pub invoices: usize,
    pub lines_touched: usize,
    pub transactions_inserted: usize,
    pub orphans_deleted: u64,
    /// Last invoice id committed; pass it as `after` to resume
    pub last_invoice: Option<InvoiceId>,
}

/// Totals of an inventory refresh run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryJobReport {
    pub chunks: usize,
    pub keys: usize,
    pub rows_deleted: u64,
    pub rows_inserted: usize,
    pub levels_written: usize,
    pub orphans_deleted: u64,
    /// Last stock key committed; pass it as `after` to resume
    pub last_key: Option<StockKey>,
}

/// Whether a chunk of `fetched` keys was the last one
pub fn is_final_chunk(fetched: usize, chunk_size: i64) -> bool {
    i64::try_from(fetched).map_or(true, |n| n < chunk_size)
}

/// Parses a stock key written as `warehouse:item`
///
/// Either half may carry its display prefix (`WH-3:ITEM-12`).
pub fn parse_stock_key(value: &str) -> Result<StockKey, JobError> {
    let invalid = || JobError::InvalidArgument(format!("stock key `{value}`, expected `warehouse:item`"));
    let (warehouse, item) = value.split_once(':').ok_or_else(invalid)?;
    let warehouse: WarehouseId = warehouse.parse().map_err(|_| invalid())?;
    let item: InventoryItemId = item.parse().map_err(|_| invalid())?;
    Ok((warehouse, item))
}

/// Runs an invoice job over every invoice after `after`
///
/// Transactions whose invoice line is gone are deleted first, in their own
/// database transaction.
#[instrument(skip(repo, job), fields(job = job.name()))]
pub async fn run_invoice_job(
    repo: &InvoiceRepository,
    job: InvoiceJob,
    chunk_size: i64,
    after: Option<InvoiceId>,
) -> Result<InvoiceJobReport, JobError> {
    let mut report = InvoiceJobReport::default();

    let mut tx = repo.begin().await?;
    report.orphans_deleted = repo.delete_orphan_transactions(&mut tx).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    let mut cursor = after;
    loop {
        let ids = repo.invoice_ids_after(cursor, chunk_size).await?;
        let Some(last) = ids.last().copied() else {
            break;
        };

        let mut tx = repo.begin().await?;
        let mut book = repo.load_book(&mut tx, &ids).await?;
        let touched = job.apply(&mut book)?;
        let saved = repo.save_book(&mut tx, &book).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        report.chunks += 1;
        report.invoices += ids.len();
        report.lines_touched += touched;
        report.transactions_inserted += saved.transactions_inserted;
        report.last_invoice = Some(last);
        info!(
            chunk = report.chunks,
            last_invoice = %last,
            lines = touched,
            transactions = saved.transactions_inserted,
            "Invoice chunk committed"
        );

        if is_final_chunk(ids.len(), chunk_size) {
            break;
        }
        cursor = Some(last);
    }

    info!(
        invoices = report.invoices,
        lines = report.lines_touched,
        orphans_deleted = report.orphans_deleted,
        "Invoice job finished"
    );
    Ok(report)
}

/// Deletes orphaned ledger rows and refreshes every stock level after `after`
#[instrument(skip(repo))]
pub async fn refresh_inventory(
    repo: &InventoryRepository,
    chunk_size: i64,
    after: Option<StockKey>,
) -> Result<InventoryJobReport, JobError> {
    let mut report = InventoryJobReport::default();

    let mut tx = repo.begin().await?;
    report.orphans_deleted = repo.delete_orphans(&mut tx).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    let catalog = repo.load_catalog().await?;

    let mut cursor = after;
    loop {
        let keys = repo.keys_after(cursor, chunk_size).await?;
        let Some(last) = keys.last().copied() else {
            break;
        };

        let mut tx = repo.begin().await?;
        let mut ledger = repo.load_ledger(&mut tx, catalog.clone(), &keys).await?;
        let refreshed = ledger.refresh_all();
        let saved = repo.save_ledger(&mut tx, &ledger).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        report.chunks += 1;
        report.keys += refreshed;
        report.rows_deleted += saved.rows_deleted;
        report.rows_inserted += saved.rows_inserted;
        report.levels_written += saved.levels_written;
        report.last_key = Some(last);
        info!(
            chunk = report.chunks,
            last_warehouse = %last.0,
            last_item = %last.1,
            levels = saved.levels_written,
            "Inventory chunk committed"
        );

        if is_final_chunk(keys.len(), chunk_size) {
            break;
        }
        cursor = Some(last);
    }

    info!(
        keys = report.keys,
        levels = report.levels_written,
        orphans_deleted = report.orphans_deleted,
        "Inventory refresh finished"
    );
    Ok(report)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn displayed_stock_key_parses_back(warehouse in 1i64..10_000, item in 1i64..1_000_000) {
            let key = (WarehouseId::new(warehouse), InventoryItemId::new(item));
            prop_assert_eq!(parse_stock_key(&format!("{}:{}", key.0, key.1)).unwrap(), key);
        }

        #[test]
        fn only_short_chunks_are_final(chunk_size in 1i64..10_000, fetched in 0usize..20_000) {
            prop_assert_eq!(is_final_chunk(fetched, chunk_size), (fetched as i64) < chunk_size);
        }
    }
}
