//! Inventory ledger
//!
//! Stock levels per (warehouse, item) are never edited in place. Every
//! movement is a ledger row whose transaction type says, per bucket, whether
//! the row's quantity counts positively, negatively or not at all. A refresh
//! sums the ledger into the summary level and recomputes the weighted unit
//! cost.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use core_kernel::{
    InventoryItemId, InventoryTransactionId, Money, Outcome, OrderLineId, PurchaseOrderLineId,
    SkipReason, UserId, WarehouseId,
};

/// Whole-unit stock quantity
pub type Quantity = i64;

pub const ADJUST_COST: &str = "Adjust Cost";
pub const ADJUSTMENT: &str = "Adjustment";
pub const COMMITTED: &str = "Committed";
pub const BACKORDERED: &str = "Backordered";
pub const RENTED: &str = "Rented";
pub const SOLD: &str = "Sold";
pub const RETURNED: &str = "Returned";
pub const ORDERED: &str = "Ordered";
pub const RECEIVED: &str = "Received";
pub const TRANSFERRED_OUT: &str = "Transferred Out";
pub const TRANSFERRED_IN: &str = "Transferred In";
pub const JUNKED: &str = "Junked";
pub const LOST: &str = "Lost";

/// Summary counters kept per (warehouse, item)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bucket {
    OnHand,
    Committed,
    OnOrder,
    Unavailable,
    Rented,
    Sold,
    BackOrdered,
}

impl Bucket {
    pub const ALL: [Bucket; 7] = [
        Bucket::OnHand,
        Bucket::Committed,
        Bucket::OnOrder,
        Bucket::Unavailable,
        Bucket::Rented,
        Bucket::Sold,
        Bucket::BackOrdered,
    ];

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Per-bucket sign of a transaction type: -1, 0 or +1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSigns([i8; 7]);

impl BucketSigns {
    pub const NONE: BucketSigns = BucketSigns([0; 7]);

    /// Returns a copy with `bucket` set to `sign` (clamped to -1..=1)
    pub fn with(mut self, bucket: Bucket, sign: i8) -> Self {
        self.0[bucket.index()] = sign.clamp(-1, 1);
        self
    }

    pub fn sign(&self, bucket: Bucket) -> i8 {
        self.0[bucket.index()]
    }
}

/// Configuration row for one inventory transaction type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransactionType {
    pub name: String,
    pub signs: BucketSigns,
    /// Rows of this type feed the weighted average cost
    pub adj_total_cost: bool,
}

impl InventoryTransactionType {
    pub fn new(name: impl Into<String>, signs: BucketSigns, adj_total_cost: bool) -> Self {
        Self {
            name: name.into(),
            signs,
            adj_total_cost,
        }
    }
}

/// Lookup of transaction types by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCatalog {
    types: BTreeMap<String, InventoryTransactionType>,
}

impl TypeCatalog {
    /// Catalog from configured rows, e.g. loaded from the lookup table
    pub fn from_types(types: impl IntoIterator<Item = InventoryTransactionType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// The stock transaction types shipped with the schema
    pub fn standard() -> Self {
        use Bucket::*;
        let s = BucketSigns::NONE;
        Self::from_types([
            InventoryTransactionType::new(ADJUST_COST, s, false),
            InventoryTransactionType::new(ADJUSTMENT, s.with(OnHand, 1), true),
            InventoryTransactionType::new(COMMITTED, s.with(Committed, 1), false),
            InventoryTransactionType::new(BACKORDERED, s.with(BackOrdered, 1), false),
            InventoryTransactionType::new(RENTED, s.with(OnHand, -1).with(Rented, 1), false),
            InventoryTransactionType::new(SOLD, s.with(OnHand, -1).with(Sold, 1), false),
            InventoryTransactionType::new(RETURNED, s.with(OnHand, 1).with(Rented, -1), false),
            InventoryTransactionType::new(ORDERED, s.with(OnOrder, 1), false),
            InventoryTransactionType::new(RECEIVED, s.with(OnOrder, -1).with(OnHand, 1), true),
            InventoryTransactionType::new(TRANSFERRED_OUT, s.with(OnHand, -1), false),
            InventoryTransactionType::new(TRANSFERRED_IN, s.with(OnHand, 1), true),
            InventoryTransactionType::new(JUNKED, s.with(OnHand, -1).with(Unavailable, 1), false),
            InventoryTransactionType::new(LOST, s.with(OnHand, -1).with(Unavailable, 1), false),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&InventoryTransactionType> {
        self.types.get(name)
    }

    pub fn insert(&mut self, transaction_type: InventoryTransactionType) {
        self.types.insert(transaction_type.name.clone(), transaction_type);
    }
}

/// Parent document that an inventory row was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedgerSource {
    OrderLine(OrderLineId),
    PurchaseOrderLine(PurchaseOrderLineId),
}

/// A stock ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: InventoryTransactionId,
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub type_name: String,
    pub description: String,
    pub quantity: Quantity,
    pub cost_per_unit: Money,
    pub date: NaiveDate,
    pub source: Option<LedgerSource>,
    pub actor: UserId,
}

/// A row to be appended by [`InventoryLedger::add_adjustment`]
#[derive(Debug, Clone)]
pub struct AdjustmentRequest {
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub type_name: String,
    pub description: String,
    pub quantity: Quantity,
    pub cost_per_unit: Money,
    pub date: NaiveDate,
    pub source: Option<LedgerSource>,
    pub actor: UserId,
}

impl AdjustmentRequest {
    pub fn new(
        warehouse_id: WarehouseId,
        item_id: InventoryItemId,
        type_name: impl Into<String>,
        quantity: Quantity,
        date: NaiveDate,
        actor: UserId,
    ) -> Self {
        Self {
            warehouse_id,
            item_id,
            type_name: type_name.into(),
            description: String::new(),
            quantity,
            cost_per_unit: Money::ZERO,
            date,
            source: None,
            actor,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cost(mut self, cost_per_unit: Money) -> Self {
        self.cost_per_unit = cost_per_unit;
        self
    }

    pub fn with_source(mut self, source: LedgerSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Bucket totals for one (warehouse, item)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounts([Quantity; 7]);

impl StockCounts {
    /// Counts in `Bucket::ALL` order, as stored in the summary table
    pub fn from_values(values: [Quantity; 7]) -> Self {
        Self(values)
    }

    pub fn get(&self, bucket: Bucket) -> Quantity {
        self.0[bucket.index()]
    }

    fn add(&mut self, bucket: Bucket, quantity: Quantity) {
        self.0[bucket.index()] += quantity;
    }

    pub fn on_hand(&self) -> Quantity {
        self.get(Bucket::OnHand)
    }
}

/// Summary row for one (warehouse, item)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub counts: StockCounts,
    pub cost_per_unit: Money,
    /// On-hand quantity valued at the unit cost
    pub total_cost: Money,
}

/// Sums ledger rows into a summary level
///
/// Rows of types missing from the catalog contribute nothing. The unit cost
/// is the quantity-weighted average over cost-bearing rows; with none, the
/// most recent "Adjust Cost" row's price is used.
pub fn summarize<'a>(
    catalog: &TypeCatalog,
    warehouse_id: WarehouseId,
    item_id: InventoryItemId,
    rows: impl IntoIterator<Item = &'a InventoryTransaction>,
) -> InventoryLevel {
    let mut counts = StockCounts::default();
    let mut costed_quantity = Decimal::ZERO;
    let mut costed_value = Money::ZERO;
    let mut last_cost_adjustment: Option<&InventoryTransaction> = None;

    for row in rows {
        if row.type_name == ADJUST_COST
            && last_cost_adjustment.map_or(true, |last| (last.date, last.id) <= (row.date, row.id))
        {
            last_cost_adjustment = Some(row);
        }
        let Some(kind) = catalog.get(&row.type_name) else {
            continue;
        };
        for bucket in Bucket::ALL {
            counts.add(bucket, Quantity::from(kind.signs.sign(bucket)) * row.quantity);
        }
        if kind.adj_total_cost {
            let quantity = Decimal::from(row.quantity);
            costed_quantity += quantity;
            costed_value += row.cost_per_unit * quantity;
        }
    }

    let cost_per_unit = if costed_quantity > Decimal::ZERO {
        costed_value
            .divide(costed_quantity)
            .unwrap_or(Money::ZERO)
    } else {
        last_cost_adjustment.map_or(Money::ZERO, |row| row.cost_per_unit)
    };

    InventoryLevel {
        warehouse_id,
        item_id,
        counts,
        cost_per_unit,
        total_cost: (cost_per_unit * Decimal::from(counts.on_hand())).round_to_cents(),
    }
}

/// Receipt for a completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transferred_out: InventoryTransactionId,
    pub transferred_in: InventoryTransactionId,
}

/// Stock ledger and summary levels for one unit of work
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    catalog: TypeCatalog,
    rows: Vec<InventoryTransaction>,
    levels: BTreeMap<(WarehouseId, InventoryItemId), InventoryLevel>,
    next_id: i64,
    appended: Vec<InventoryTransactionId>,
    removed: Vec<InventoryTransactionId>,
}

impl InventoryLedger {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            rows: Vec::new(),
            levels: BTreeMap::new(),
            next_id: 1,
            appended: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Ledger over persisted rows and summary levels
    pub fn from_rows(
        catalog: TypeCatalog,
        rows: impl IntoIterator<Item = InventoryTransaction>,
        levels: impl IntoIterator<Item = InventoryLevel>,
    ) -> Self {
        let mut ledger = Self::new(catalog);
        ledger.rows = rows.into_iter().collect();
        ledger.rows.sort_by_key(|row| row.id);
        ledger.next_id = ledger.rows.last().map_or(1, |row| row.id.get() + 1);
        ledger.levels = levels
            .into_iter()
            .map(|level| ((level.warehouse_id, level.item_id), level))
            .collect();
        ledger
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn rows(&self) -> &[InventoryTransaction] {
        &self.rows
    }

    pub fn rows_for(
        &self,
        warehouse_id: WarehouseId,
        item_id: InventoryItemId,
    ) -> impl Iterator<Item = &InventoryTransaction> {
        self.rows
            .iter()
            .filter(move |row| row.warehouse_id == warehouse_id && row.item_id == item_id)
    }

    /// Rows added in this unit of work
    pub fn appended_rows(&self) -> impl Iterator<Item = &InventoryTransaction> {
        self.rows.iter().filter(|row| self.appended.contains(&row.id))
    }

    /// Persisted rows deleted in this unit of work
    pub fn removed_ids(&self) -> &[InventoryTransactionId] {
        &self.removed
    }

    /// Stored summary level; `None` until the pair has been refreshed
    pub fn level(&self, warehouse_id: WarehouseId, item_id: InventoryItemId) -> Option<&InventoryLevel> {
        self.levels.get(&(warehouse_id, item_id))
    }

    pub fn levels(&self) -> impl Iterator<Item = &InventoryLevel> {
        self.levels.values()
    }

    /// Current on-hand quantity, computed from the ledger
    pub fn on_hand(&self, warehouse_id: WarehouseId, item_id: InventoryItemId) -> Quantity {
        summarize(&self.catalog, warehouse_id, item_id, self.rows_for(warehouse_id, item_id))
            .counts
            .on_hand()
    }

    /// Appends one ledger row
    ///
    /// # Returns
    ///
    /// `Skipped` when the quantity is not positive or the type is not in the
    /// catalog. Levels are not refreshed.
    pub fn add_adjustment(&mut self, request: AdjustmentRequest) -> Outcome<InventoryTransactionId> {
        if request.quantity <= 0 {
            return Outcome::Skipped(SkipReason::NonPositiveQuantity);
        }
        if self.catalog.get(&request.type_name).is_none() {
            warn!(type_name = %request.type_name, "Unknown inventory transaction type");
            return Outcome::Skipped(SkipReason::UnknownTransactionType(request.type_name));
        }

        let id = InventoryTransactionId::new(self.next_id);
        self.next_id += 1;
        self.rows.push(InventoryTransaction {
            id,
            warehouse_id: request.warehouse_id,
            item_id: request.item_id,
            type_name: request.type_name,
            description: request.description,
            quantity: request.quantity,
            cost_per_unit: request.cost_per_unit,
            date: request.date,
            source: request.source,
            actor: request.actor,
        });
        self.appended.push(id);
        Outcome::Applied(id)
    }

    /// Deletes a row; used by ledger synchronization
    pub(crate) fn remove(&mut self, id: InventoryTransactionId) -> Option<InventoryTransaction> {
        let position = self.rows.iter().position(|row| row.id == id)?;
        let row = self.rows.remove(position);
        if let Some(appended) = self.appended.iter().position(|a| *a == id) {
            self.appended.remove(appended);
        } else {
            self.removed.push(id);
        }
        Some(row)
    }

    /// Recomputes and stores the summary level of a (warehouse, item)
    ///
    /// Running it again without new rows yields the same level.
    pub fn refresh(&mut self, warehouse_id: WarehouseId, item_id: InventoryItemId) -> InventoryLevel {
        let level = summarize(&self.catalog, warehouse_id, item_id, self.rows_for(warehouse_id, item_id));
        debug!(
            warehouse_id = %warehouse_id,
            item_id = %item_id,
            on_hand = level.counts.on_hand(),
            cost_per_unit = %level.cost_per_unit,
            "Inventory level refreshed"
        );
        self.levels.insert((warehouse_id, item_id), level.clone());
        level
    }

    /// Refreshes every (warehouse, item) that has ledger rows or a level
    pub fn refresh_all(&mut self) -> usize {
        let mut keys: Vec<_> = self.rows.iter().map(|row| (row.warehouse_id, row.item_id)).collect();
        keys.extend(self.levels.keys().copied());
        keys.sort();
        keys.dedup();
        for (warehouse_id, item_id) in &keys {
            let _ = self.refresh(*warehouse_id, *item_id);
        }
        keys.len()
    }

    /// Moves stock between warehouses
    ///
    /// Emits a "Transferred Out" / "Transferred In" pair and refreshes both
    /// warehouses.
    ///
    /// # Returns
    ///
    /// `Skipped` when a warehouse is missing, both warehouses are the same,
    /// the quantity is not positive, or the source has less than `quantity`
    /// on hand.
    pub fn transfer(
        &mut self,
        item_id: InventoryItemId,
        source: Option<WarehouseId>,
        destination: Option<WarehouseId>,
        quantity: Quantity,
        date: NaiveDate,
        actor: UserId,
    ) -> Outcome<TransferReceipt> {
        let Some(source) = source else {
            return Outcome::Skipped(SkipReason::MissingParameter("source warehouse".to_string()));
        };
        let Some(destination) = destination else {
            return Outcome::Skipped(SkipReason::MissingParameter("destination warehouse".to_string()));
        };
        if source == destination {
            return Outcome::Skipped(SkipReason::SameLocation);
        }
        if quantity <= 0 {
            return Outcome::Skipped(SkipReason::NonPositiveQuantity);
        }
        let available = self.on_hand(source, item_id);
        if available < quantity {
            warn!(item_id = %item_id, warehouse_id = %source, available, quantity, "Transfer skipped");
            return Outcome::Skipped(SkipReason::InsufficientStock {
                available,
                requested: quantity,
            });
        }

        let cost = summarize(&self.catalog, source, item_id, self.rows_for(source, item_id)).cost_per_unit;
        let description = format!("Transfer from {} to {}", source, destination);
        let transferred_out = self.add_adjustment(
            AdjustmentRequest::new(source, item_id, TRANSFERRED_OUT, quantity, date, actor)
                .with_description(description.clone())
                .with_cost(cost),
        );
        let transferred_in = self.add_adjustment(
            AdjustmentRequest::new(destination, item_id, TRANSFERRED_IN, quantity, date, actor)
                .with_description(description)
                .with_cost(cost),
        );

        match (transferred_out, transferred_in) {
            (Outcome::Applied(transferred_out), Outcome::Applied(transferred_in)) => {
                let _ = self.refresh(source, item_id);
                let _ = self.refresh(destination, item_id);
                info!(item_id = %item_id, from = %source, to = %destination, quantity, "Transfer applied");
                Outcome::Applied(TransferReceipt {
                    transferred_out,
                    transferred_in,
                })
            }
            (out, inn) => {
                // a catalog without the transfer types; undo the half that landed
                for id in [out.applied(), inn.applied()].into_iter().flatten() {
                    let _ = self.remove(id);
                }
                Outcome::Skipped(SkipReason::UnknownTransactionType(TRANSFERRED_OUT.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn ids() -> (WarehouseId, InventoryItemId, UserId) {
        (WarehouseId::new(1), InventoryItemId::new(10), UserId::new(1))
    }

    #[test]
    fn test_add_adjustment_skips() {
        let (w, i, u) = ids();
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());

        let zero = ledger.add_adjustment(AdjustmentRequest::new(w, i, ADJUSTMENT, 0, day(), u));
        assert_eq!(zero, Outcome::Skipped(SkipReason::NonPositiveQuantity));

        let unknown = ledger.add_adjustment(AdjustmentRequest::new(w, i, "Borrowed", 2, day(), u));
        assert!(matches!(unknown, Outcome::Skipped(SkipReason::UnknownTransactionType(_))));
        assert!(ledger.rows().is_empty());
    }

    #[test]
    fn test_refresh_buckets_and_weighted_cost() {
        let (w, i, u) = ids();
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());
        let _ = ledger.add_adjustment(AdjustmentRequest::new(w, i, ORDERED, 10, day(), u));
        let _ = ledger.add_adjustment(
            AdjustmentRequest::new(w, i, RECEIVED, 4, day(), u).with_cost(Money::new(dec!(10))),
        );
        let _ = ledger.add_adjustment(
            AdjustmentRequest::new(w, i, RECEIVED, 6, day(), u).with_cost(Money::new(dec!(20))),
        );
        let _ = ledger.add_adjustment(AdjustmentRequest::new(w, i, RENTED, 3, day(), u));

        let level = ledger.refresh(w, i);
        assert_eq!(level.counts.get(Bucket::OnOrder), 0);
        assert_eq!(level.counts.on_hand(), 7);
        assert_eq!(level.counts.get(Bucket::Rented), 3);
        assert_eq!(level.cost_per_unit, Money::new(dec!(16)));
        assert_eq!(level.total_cost, Money::new(dec!(112)));
    }

    #[test]
    fn test_cost_falls_back_to_latest_cost_adjustment() {
        let (w, i, u) = ids();
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());
        let _ = ledger.add_adjustment(
            AdjustmentRequest::new(w, i, ADJUST_COST, 1, day(), u).with_cost(Money::new(dec!(5))),
        );
        let _ = ledger.add_adjustment(
            AdjustmentRequest::new(w, i, ADJUST_COST, 1, day(), u).with_cost(Money::new(dec!(7.5))),
        );
        let level = ledger.refresh(w, i);
        assert_eq!(level.cost_per_unit, Money::new(dec!(7.5)));
        assert_eq!(level.counts, StockCounts::default());
    }

    #[test]
    fn test_transfer_guards_stock() {
        let (w, i, u) = ids();
        let other = WarehouseId::new(2);
        let mut ledger = InventoryLedger::new(TypeCatalog::standard());
        let _ = ledger.add_adjustment(AdjustmentRequest::new(w, i, ADJUSTMENT, 2, day(), u));

        let too_many = ledger.transfer(i, Some(w), Some(other), 3, day(), u);
        assert_eq!(
            too_many,
            Outcome::Skipped(SkipReason::InsufficientStock { available: 2, requested: 3 })
        );
        assert_eq!(ledger.transfer(i, Some(w), Some(w), 1, day(), u), Outcome::Skipped(SkipReason::SameLocation));
        assert!(ledger.transfer(i, None, Some(other), 1, day(), u).is_skipped());

        assert!(ledger.transfer(i, Some(w), Some(other), 2, day(), u).is_applied());
        assert_eq!(ledger.level(w, i).map(|l| l.counts.on_hand()), Some(0));
        assert_eq!(ledger.level(other, i).map(|l| l.counts.on_hand()), Some(2));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const TYPES: [&str; 8] = [ADJUSTMENT, COMMITTED, RENTED, SOLD, RETURNED, ORDERED, RECEIVED, LOST];

    proptest! {
        #[test]
        fn refresh_is_idempotent(entries in prop::collection::vec((0usize..8, 1i64..50, 0i64..10_000), 0..40)) {
            let (w, i, u) = (WarehouseId::new(1), InventoryItemId::new(1), UserId::new(1));
            let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let mut ledger = InventoryLedger::new(TypeCatalog::standard());
            for (t, quantity, cents) in entries {
                let _ = ledger.add_adjustment(
                    AdjustmentRequest::new(w, i, TYPES[t], quantity, date, u).with_cost(Money::from_cents(cents)),
                );
            }
            let first = ledger.refresh(w, i);
            let second = ledger.refresh(w, i);
            prop_assert_eq!(first, second);
        }
    }
}
