//! Ledger synchronization against orders and purchase orders
//!
//! Order lines and purchase order lines imply a set of stock rows (committed,
//! rented, ordered, received, ...). Synchronization compares that set with
//! the sourced rows already in the ledger, deletes what no longer has a
//! parent or no longer matches, and inserts what is missing. A second pass
//! over unchanged input does nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use core_kernel::{InventoryItemId, Money, OrderLineId, PurchaseOrderLineId, UserId, WarehouseId};

use crate::inventory::{
    AdjustmentRequest, InventoryLedger, LedgerSource, Quantity, BACKORDERED, COMMITTED, ORDERED, RECEIVED,
    RENTED, RETURNED, SOLD,
};

/// How far an order line's item has moved through fulfillment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentStage {
    /// Approved but not yet delivered
    Committed,
    /// Approved with no stock to deliver from
    Backordered,
    Rented,
    Sold,
    /// A rental that has been picked up
    Returned,
}

/// Stock-relevant view of an order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineStock {
    pub order_line_id: OrderLineId,
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub quantity: Quantity,
    pub stage: FulfillmentStage,
}

/// Stock-relevant view of a purchase order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineStock {
    pub line_id: PurchaseOrderLineId,
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub ordered: Quantity,
    pub received: Quantity,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExpectedRow {
    warehouse_id: WarehouseId,
    item_id: InventoryItemId,
    quantity: Quantity,
    cost_per_unit: Money,
}

/// What a synchronization pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub removed: usize,
    pub inserted: usize,
    /// Pairs whose levels were refreshed
    pub refreshed: BTreeSet<(WarehouseId, InventoryItemId)>,
}

impl SyncReport {
    pub fn is_unchanged(&self) -> bool {
        self.removed == 0 && self.inserted == 0
    }
}

type ExpectedKey = (LedgerSource, &'static str);

fn expected_rows(
    order_lines: &[OrderLineStock],
    purchase_lines: &[PurchaseOrderLineStock],
) -> BTreeMap<ExpectedKey, ExpectedRow> {
    let mut expected = BTreeMap::new();

    for line in order_lines.iter().filter(|l| l.quantity > 0) {
        let source = LedgerSource::OrderLine(line.order_line_id);
        let row = ExpectedRow {
            warehouse_id: line.warehouse_id,
            item_id: line.item_id,
            quantity: line.quantity,
            cost_per_unit: Money::ZERO,
        };
        let types: &[&'static str] = match line.stage {
            FulfillmentStage::Committed => &[COMMITTED],
            FulfillmentStage::Backordered => &[BACKORDERED],
            FulfillmentStage::Rented => &[RENTED],
            FulfillmentStage::Sold => &[SOLD],
            FulfillmentStage::Returned => &[RENTED, RETURNED],
        };
        for type_name in types {
            expected.insert((source, *type_name), row.clone());
        }
    }

    for line in purchase_lines {
        let source = LedgerSource::PurchaseOrderLine(line.line_id);
        if line.ordered > 0 {
            expected.insert(
                (source, ORDERED),
                ExpectedRow {
                    warehouse_id: line.warehouse_id,
                    item_id: line.item_id,
                    quantity: line.ordered,
                    cost_per_unit: line.price,
                },
            );
        }
        if line.received > 0 {
            expected.insert(
                (source, RECEIVED),
                ExpectedRow {
                    warehouse_id: line.warehouse_id,
                    item_id: line.item_id,
                    quantity: line.received,
                    cost_per_unit: line.price,
                },
            );
        }
    }
    expected
}

/// Reconciles sourced ledger rows with current order and PO line state
///
/// `order_lines` and `purchase_lines` must be the complete current sets:
/// a sourced row whose parent line is absent is treated as orphaned and
/// deleted. Rows without a source (manual adjustments) are left alone.
pub fn synchronize(
    ledger: &mut InventoryLedger,
    order_lines: &[OrderLineStock],
    purchase_lines: &[PurchaseOrderLineStock],
    date: NaiveDate,
    actor: UserId,
) -> SyncReport {
    let mut expected = expected_rows(order_lines, purchase_lines);
    let mut report = SyncReport::default();

    let mut stale = Vec::new();
    for row in ledger.rows() {
        let Some(source) = row.source else {
            continue;
        };
        let key = expected
            .keys()
            .find(|(s, t)| *s == source && *t == row.type_name)
            .copied();
        let matches = key.and_then(|key| expected.get(&key).map(|e| (key, e))).filter(|(_, e)| {
            e.warehouse_id == row.warehouse_id
                && e.item_id == row.item_id
                && e.quantity == row.quantity
                && e.cost_per_unit == row.cost_per_unit
        });
        match matches {
            Some((key, _)) => {
                expected.remove(&key);
            }
            None => stale.push((row.id, row.warehouse_id, row.item_id)),
        }
    }

    for (id, warehouse_id, item_id) in stale {
        if ledger.remove(id).is_some() {
            report.removed += 1;
            report.refreshed.insert((warehouse_id, item_id));
        }
    }

    for ((source, type_name), row) in expected {
        let request = AdjustmentRequest::new(row.warehouse_id, row.item_id, type_name, row.quantity, date, actor)
            .with_cost(row.cost_per_unit)
            .with_source(source)
            .with_description(describe(source));
        if ledger.add_adjustment(request).is_applied() {
            report.inserted += 1;
            report.refreshed.insert((row.warehouse_id, row.item_id));
        }
    }

    for (warehouse_id, item_id) in &report.refreshed {
        let _ = ledger.refresh(*warehouse_id, *item_id);
    }

    if !report.is_unchanged() {
        info!(removed = report.removed, inserted = report.inserted, "Inventory ledger synchronized");
    }
    report
}

fn describe(source: LedgerSource) -> String {
    match source {
        LedgerSource::OrderLine(id) => format!("Order line {}", id),
        LedgerSource::PurchaseOrderLine(id) => format!("Purchase order line {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Bucket, TypeCatalog, ADJUSTMENT};
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn rental(stage: FulfillmentStage) -> OrderLineStock {
        OrderLineStock {
            order_line_id: OrderLineId::new(5),
            warehouse_id: WarehouseId::new(1),
            item_id: InventoryItemId::new(9),
            quantity: 1,
            stage,
        }
    }

    fn purchase(received: Quantity) -> PurchaseOrderLineStock {
        PurchaseOrderLineStock {
            line_id: PurchaseOrderLineId::new(3),
            warehouse_id: WarehouseId::new(1),
            item_id: InventoryItemId::new(9),
            ordered: 5,
            received,
            price: Money::new(dec!(12)),
        }
    }

    #[test]
    fn test_sync_reaches_fixed_point() {
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());
        let lines = [rental(FulfillmentStage::Rented)];
        let purchases = [purchase(5)];

        let first = synchronize(&mut ledger, &lines, &purchases, day(), UserId::new(1));
        assert_eq!(first.inserted, 3);

        let second = synchronize(&mut ledger, &lines, &purchases, day(), UserId::new(1));
        assert!(second.is_unchanged());

        let level = ledger.level(WarehouseId::new(1), InventoryItemId::new(9)).unwrap();
        assert_eq!(level.counts.on_hand(), 4);
        assert_eq!(level.counts.get(Bucket::Rented), 1);
        assert_eq!(level.counts.get(Bucket::OnOrder), 0);
    }

    #[test]
    fn test_stage_change_replaces_rows() {
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());
        let _ = synchronize(&mut ledger, &[rental(FulfillmentStage::Committed)], &[], day(), UserId::new(1));

        let report = synchronize(&mut ledger, &[rental(FulfillmentStage::Rented)], &[], day(), UserId::new(1));
        assert_eq!((report.removed, report.inserted), (1, 1));
        assert!(ledger.rows().iter().all(|row| row.type_name == RENTED));
    }

    #[test]
    fn test_orphans_removed_manual_rows_kept() {
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());
        let _ = ledger.add_adjustment(AdjustmentRequest::new(
            WarehouseId::new(1),
            InventoryItemId::new(9),
            ADJUSTMENT,
            2,
            day(),
            UserId::new(1),
        ));
        let _ = synchronize(&mut ledger, &[rental(FulfillmentStage::Sold)], &[], day(), UserId::new(1));

        let report = synchronize(&mut ledger, &[], &[], day(), UserId::new(1));
        assert_eq!(report.removed, 1);
        assert_eq!(ledger.rows().len(), 1);
        assert_eq!(ledger.rows()[0].type_name, ADJUSTMENT);
    }
}
