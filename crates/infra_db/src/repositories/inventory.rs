//! Inventory repository implementation
//!
//! Stock ledgers are loaded per (warehouse, item) pair. The ledger rows and
//! summary levels of the requested pairs are locked for the unit of work so
//! a refresh never races an append on the same pair.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, info};

use core_kernel::{
    InventoryItemId, InventoryTransactionId, Money, OrderLineId, PurchaseOrderLineId, UserId, WarehouseId,
};
use domain_inventory::{
    Bucket, BucketSigns, InventoryLedger, InventoryLevel, InventoryTransaction, InventoryTransactionType,
    LedgerSource, StockCounts, TypeCatalog,
};

use crate::error::DatabaseError;
use crate::repositories::DbTransaction;

/// A (warehouse, item) key of the stock ledger
pub type StockKey = (WarehouseId, InventoryItemId);

/// Repository for inventory ledgers and summary levels
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Starts the database transaction a unit of work runs in
    pub async fn begin(&self) -> Result<DbTransaction<'static>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Loads the configured transaction types
    pub async fn load_catalog(&self) -> Result<TypeCatalog, DatabaseError> {
        let rows = sqlx::query_as::<_, TransactionTypeRow>(
            r#"
            SELECT name, on_hand, committed, on_order, unavailable, rented, sold, back_ordered, adj_total_cost
            FROM inventory_transaction_type
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(TypeCatalog::from_types(rows.into_iter().map(TransactionTypeRow::into_domain)))
    }

    /// Loads the ledger rows and levels of `keys` under row locks
    pub async fn load_ledger(
        &self,
        tx: &mut DbTransaction<'_>,
        catalog: TypeCatalog,
        keys: &[StockKey],
    ) -> Result<InventoryLedger, DatabaseError> {
        let (warehouses, items) = split_keys(keys);

        let rows = sqlx::query_as::<_, InventoryTransactionRow>(
            r#"
            SELECT
                t.id, t.warehouse_id, t.inventory_item_id, t.transaction_type, t.description,
                t.quantity, t.cost_per_unit, t.transaction_date,
                t.order_line_id, t.purchase_order_line_id, t.last_update_user_id
            FROM inventory_transaction t
            JOIN UNNEST($1::BIGINT[], $2::BIGINT[]) AS k (warehouse_id, inventory_item_id)
              ON k.warehouse_id = t.warehouse_id AND k.inventory_item_id = t.inventory_item_id
            ORDER BY t.id
            FOR UPDATE OF t
            "#,
        )
        .bind(&warehouses)
        .bind(&items)
        .fetch_all(&mut **tx)
        .await?;

        let levels = sqlx::query_as::<_, InventoryLevelRow>(
            r#"
            SELECT
                l.warehouse_id, l.inventory_item_id,
                l.on_hand, l.committed, l.on_order, l.unavailable, l.rented, l.sold, l.back_ordered,
                l.cost_per_unit, l.total_cost
            FROM inventory_level l
            JOIN UNNEST($1::BIGINT[], $2::BIGINT[]) AS k (warehouse_id, inventory_item_id)
              ON k.warehouse_id = l.warehouse_id AND k.inventory_item_id = l.inventory_item_id
            FOR UPDATE OF l
            "#,
        )
        .bind(&warehouses)
        .bind(&items)
        .fetch_all(&mut **tx)
        .await?;

        let rows = rows
            .into_iter()
            .map(InventoryTransactionRow::into_domain)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(pairs = keys.len(), rows = rows.len(), levels = levels.len(), "Inventory ledger loaded");
        Ok(InventoryLedger::from_rows(
            catalog,
            rows,
            levels.into_iter().map(InventoryLevelRow::into_domain),
        ))
    }

    /// Writes a ledger back: removed rows are deleted, appended rows
    /// inserted in order, and every level upserted
    pub async fn save_ledger(
        &self,
        tx: &mut DbTransaction<'_>,
        ledger: &InventoryLedger,
    ) -> Result<SavedLedger, DatabaseError> {
        let mut saved = SavedLedger::default();

        let removed: Vec<i64> = ledger.removed_ids().iter().map(InventoryTransactionId::get).collect();
        if !removed.is_empty() {
            let result = sqlx::query("DELETE FROM inventory_transaction WHERE id = ANY($1)")
                .bind(&removed)
                .execute(&mut **tx)
                .await?;
            saved.rows_deleted = result.rows_affected();
        }

        for row in ledger.appended_rows() {
            insert_row(tx, row).await?;
            saved.rows_inserted += 1;
        }

        for level in ledger.levels() {
            upsert_level(tx, level).await?;
            saved.levels_written += 1;
        }

        info!(
            deleted = saved.rows_deleted,
            inserted = saved.rows_inserted,
            levels = saved.levels_written,
            "Inventory ledger saved"
        );
        Ok(saved)
    }

    /// Returns up to `limit` stock keys greater than `after`, ascending
    ///
    /// Keys come from both the ledger and the summary table, so a level
    /// whose rows were all deleted is still visited.
    pub async fn keys_after(&self, after: Option<StockKey>, limit: i64) -> Result<Vec<StockKey>, DatabaseError> {
        let (warehouse, item) = after.map_or((0, 0), |(w, i)| (w.get(), i.get()));
        let keys: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT warehouse_id, inventory_item_id FROM (
                SELECT warehouse_id, inventory_item_id FROM inventory_transaction
                UNION
                SELECT warehouse_id, inventory_item_id FROM inventory_level
            ) k
            WHERE (warehouse_id, inventory_item_id) > ($1, $2)
            ORDER BY warehouse_id, inventory_item_id
            LIMIT $3
            "#,
        )
        .bind(warehouse)
        .bind(item)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys
            .into_iter()
            .map(|(w, i)| (WarehouseId::new(w), InventoryItemId::new(i)))
            .collect())
    }

    /// Deletes ledger rows whose order line or purchase order line is gone
    ///
    /// Manual rows (no source) are never touched. Affected levels are left
    /// for the next refresh.
    pub async fn delete_orphans(&self, tx: &mut DbTransaction<'_>) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM inventory_transaction t
            WHERE (t.order_line_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM order_line o WHERE o.id = t.order_line_id))
               OR (t.purchase_order_line_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM purchase_order_line p WHERE p.id = t.purchase_order_line_id))
            "#,
        )
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            info!(deleted = result.rows_affected(), "Orphaned inventory transactions removed");
        }
        Ok(result.rows_affected())
    }
}

/// Row counts written by [`InventoryRepository::save_ledger`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedLedger {
    pub rows_deleted: u64,
    pub rows_inserted: usize,
    pub levels_written: usize,
}

fn split_keys(keys: &[StockKey]) -> (Vec<i64>, Vec<i64>) {
    keys.iter().map(|(w, i)| (w.get(), i.get())).unzip()
}

async fn insert_row(tx: &mut DbTransaction<'_>, row: &InventoryTransaction) -> Result<InventoryTransactionId, DatabaseError> {
    let (order_line_id, purchase_order_line_id) = match row.source {
        Some(LedgerSource::OrderLine(id)) => (Some(id.get()), None),
        Some(LedgerSource::PurchaseOrderLine(id)) => (None, Some(id.get())),
        None => (None, None),
    };

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO inventory_transaction (
            warehouse_id, inventory_item_id, transaction_type, description, quantity,
            cost_per_unit, transaction_date, order_line_id, purchase_order_line_id,
            last_update_user_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(row.warehouse_id.get())
    .bind(row.item_id.get())
    .bind(&row.type_name)
    .bind(&row.description)
    .bind(row.quantity)
    .bind(row.cost_per_unit.amount())
    .bind(row.date)
    .bind(order_line_id)
    .bind(purchase_order_line_id)
    .bind(row.actor.get())
    .fetch_one(&mut **tx)
    .await?;

    Ok(InventoryTransactionId::new(id))
}

async fn upsert_level(tx: &mut DbTransaction<'_>, level: &InventoryLevel) -> Result<(), DatabaseError> {
    let count = |bucket| level.counts.get(bucket);
    sqlx::query(
        r#"
        INSERT INTO inventory_level (
            warehouse_id, inventory_item_id,
            on_hand, committed, on_order, unavailable, rented, sold, back_ordered,
            cost_per_unit, total_cost
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (warehouse_id, inventory_item_id) DO UPDATE SET
            on_hand = EXCLUDED.on_hand,
            committed = EXCLUDED.committed,
            on_order = EXCLUDED.on_order,
            unavailable = EXCLUDED.unavailable,
            rented = EXCLUDED.rented,
            sold = EXCLUDED.sold,
            back_ordered = EXCLUDED.back_ordered,
            cost_per_unit = EXCLUDED.cost_per_unit,
            total_cost = EXCLUDED.total_cost
        "#,
    )
    .bind(level.warehouse_id.get())
    .bind(level.item_id.get())
    .bind(count(Bucket::OnHand))
    .bind(count(Bucket::Committed))
    .bind(count(Bucket::OnOrder))
    .bind(count(Bucket::Unavailable))
    .bind(count(Bucket::Rented))
    .bind(count(Bucket::Sold))
    .bind(count(Bucket::BackOrdered))
    .bind(level.cost_per_unit.amount())
    .bind(level.total_cost.amount())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Database row for a transaction type
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionTypeRow {
    pub name: String,
    pub on_hand: i16,
    pub committed: i16,
    pub on_order: i16,
    pub unavailable: i16,
    pub rented: i16,
    pub sold: i16,
    pub back_ordered: i16,
    pub adj_total_cost: bool,
}

impl TransactionTypeRow {
    fn into_domain(self) -> InventoryTransactionType {
        let sign = |value: i16| value.clamp(-1, 1) as i8;
        let signs = BucketSigns::NONE
            .with(Bucket::OnHand, sign(self.on_hand))
            .with(Bucket::Committed, sign(self.committed))
            .with(Bucket::OnOrder, sign(self.on_order))
            .with(Bucket::Unavailable, sign(self.unavailable))
            .with(Bucket::Rented, sign(self.rented))
            .with(Bucket::Sold, sign(self.sold))
            .with(Bucket::BackOrdered, sign(self.back_ordered));
        InventoryTransactionType::new(self.name, signs, self.adj_total_cost)
    }
}

/// Database row for a stock ledger transaction
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryTransactionRow {
    pub id: i64,
    pub warehouse_id: i64,
    pub inventory_item_id: i64,
    pub transaction_type: String,
    pub description: String,
    pub quantity: i64,
    pub cost_per_unit: Decimal,
    pub transaction_date: NaiveDate,
    pub order_line_id: Option<i64>,
    pub purchase_order_line_id: Option<i64>,
    pub last_update_user_id: i64,
}

impl InventoryTransactionRow {
    fn into_domain(self) -> Result<InventoryTransaction, DatabaseError> {
        let source = match (self.order_line_id, self.purchase_order_line_id) {
            (Some(id), None) => Some(LedgerSource::OrderLine(OrderLineId::new(id))),
            (None, Some(id)) => Some(LedgerSource::PurchaseOrderLine(PurchaseOrderLineId::new(id))),
            (None, None) => None,
            (Some(_), Some(_)) => {
                return Err(DatabaseError::corrupt(
                    "inventory_transaction",
                    self.id,
                    "row references both an order line and a purchase order line",
                ))
            }
        };

        Ok(InventoryTransaction {
            id: InventoryTransactionId::new(self.id),
            warehouse_id: WarehouseId::new(self.warehouse_id),
            item_id: InventoryItemId::new(self.inventory_item_id),
            type_name: self.transaction_type,
            description: self.description,
            quantity: self.quantity,
            cost_per_unit: Money::new(self.cost_per_unit),
            date: self.transaction_date,
            source,
            actor: UserId::new(self.last_update_user_id),
        })
    }
}

/// Database row for a summary level
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryLevelRow {
    pub warehouse_id: i64,
    pub inventory_item_id: i64,
    pub on_hand: i64,
    pub committed: i64,
    pub on_order: i64,
    pub unavailable: i64,
    pub rented: i64,
    pub sold: i64,
    pub back_ordered: i64,
    pub cost_per_unit: Decimal,
    pub total_cost: Decimal,
}

impl InventoryLevelRow {
    fn into_domain(self) -> InventoryLevel {
        InventoryLevel {
            warehouse_id: WarehouseId::new(self.warehouse_id),
            item_id: InventoryItemId::new(self.inventory_item_id),
            counts: StockCounts::from_values([
                self.on_hand,
                self.committed,
                self.on_order,
                self.unavailable,
                self.rented,
                self.sold,
                self.back_ordered,
            ]),
            cost_per_unit: Money::new(self.cost_per_unit),
            total_cost: Money::new(self.total_cost),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_inventory::inventory::{RECEIVED, TRANSFERRED_OUT};
    use rust_decimal_macros::dec;

    fn type_row(name: &str, on_hand: i16, on_order: i16, adj_total_cost: bool) -> TransactionTypeRow {
        TransactionTypeRow {
            name: name.to_string(),
            on_hand,
            committed: 0,
            on_order,
            unavailable: 0,
            rented: 0,
            sold: 0,
            back_ordered: 0,
            adj_total_cost,
        }
    }

    fn transaction_row() -> InventoryTransactionRow {
        InventoryTransactionRow {
            id: 11,
            warehouse_id: 1,
            inventory_item_id: 2,
            transaction_type: RECEIVED.to_string(),
            description: "PO receipt".to_string(),
            quantity: 4,
            cost_per_unit: dec!(12.5),
            transaction_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            order_line_id: None,
            purchase_order_line_id: Some(30),
            last_update_user_id: 5,
        }
    }

    #[test]
    fn test_stored_catalog_matches_standard_types() {
        let stored = TypeCatalog::from_types([
            type_row(RECEIVED, 1, -1, true).into_domain(),
            type_row(TRANSFERRED_OUT, -1, 0, false).into_domain(),
        ]);
        let standard = TypeCatalog::standard();

        assert_eq!(stored.get(RECEIVED), standard.get(RECEIVED));
        assert_eq!(stored.get(TRANSFERRED_OUT), standard.get(TRANSFERRED_OUT));
    }

    #[test]
    fn test_transaction_row_source() {
        let row = transaction_row().into_domain().unwrap();
        assert_eq!(row.source, Some(LedgerSource::PurchaseOrderLine(PurchaseOrderLineId::new(30))));
        assert_eq!(row.cost_per_unit, Money::new(dec!(12.5)));

        let mut manual = transaction_row();
        manual.purchase_order_line_id = None;
        assert_eq!(manual.into_domain().unwrap().source, None);

        let mut both = transaction_row();
        both.order_line_id = Some(8);
        assert!(matches!(both.into_domain(), Err(DatabaseError::CorruptRow(_))));
    }

    #[test]
    fn test_level_row_bucket_order() {
        let level = InventoryLevelRow {
            warehouse_id: 1,
            inventory_item_id: 2,
            on_hand: 5,
            committed: 1,
            on_order: 3,
            unavailable: 0,
            rented: 2,
            sold: 7,
            back_ordered: 4,
            cost_per_unit: dec!(10),
            total_cost: dec!(50),
        }
        .into_domain();

        assert_eq!(level.counts.on_hand(), 5);
        assert_eq!(level.counts.get(Bucket::OnOrder), 3);
        assert_eq!(level.counts.get(Bucket::Sold), 7);
        assert_eq!(level.counts.get(Bucket::BackOrdered), 4);
    }

    #[test]
    fn test_loaded_ledger_refresh_is_stable() {
        let rows = vec![transaction_row().into_domain().unwrap()];
        let mut ledger = InventoryLedger::from_rows(TypeCatalog::standard(), rows, Vec::new());
        let first = ledger.refresh(WarehouseId::new(1), InventoryItemId::new(2));
        let second = ledger.refresh(WarehouseId::new(1), InventoryItemId::new(2));

        assert_eq!(first, second);
        assert_eq!(first.counts.on_hand(), 4);
        assert_eq!(first.counts.get(Bucket::OnOrder), -4);
        assert_eq!(first.total_cost, Money::new(dec!(50)));
        assert_eq!(ledger.appended_rows().count(), 0);
    }

    #[test]
    fn test_split_keys() {
        let keys = [(WarehouseId::new(1), InventoryItemId::new(9)), (WarehouseId::new(2), InventoryItemId::new(8))];
        assert_eq!(split_keys(&keys), (vec![1, 2], vec![9, 8]));
    }
}
