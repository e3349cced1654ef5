//! Inventory Domain - Stock Ledger and Serialized Assets
//!
//! Stock counts per warehouse and item are summaries of an append-only
//! ledger; serial numbers carry their own event history replayed through a
//! transition table. Both follow the same soft-fail contract: a request that
//! has nothing to do returns `Outcome::Skipped` with the reason.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_inventory::{InventoryLedger, TypeCatalog};
//!
//! let mut ledger = InventoryLedger::new(TypeCatalog::standard());
//! let outcome = ledger.transfer(item, Some(main), Some(branch), 2, today, actor);
//! ```

/// Implements the legacy string spellings of a closed vocabulary
macro_rules! legacy_names {
    ($ty:ident, $kind:literal { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn legacy_name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.legacy_name())
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::InventoryError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($name => Ok($ty::$variant),)+
                    other => Err($crate::InventoryError::unknown($kind, other)),
                }
            }
        }
    };
}

pub mod error;
pub mod inventory;
pub mod serial;
pub mod sync;

pub use error::InventoryError;
pub use inventory::{
    AdjustmentRequest, Bucket, BucketSigns, InventoryLedger, InventoryLevel, InventoryTransaction,
    InventoryTransactionType, LedgerSource, Quantity, StockCounts, TransferReceipt, TypeCatalog,
};
pub use serial::{
    transfer_serial, Serial, SerialEvent, SerialEventDraft, SerialState, SerialStatus, SerialTransaction,
    SerialTransfer,
};
pub use sync::{synchronize, FulfillmentStage, OrderLineStock, PurchaseOrderLineStock, SyncReport};
