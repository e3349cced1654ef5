//! Strongly-typed identifiers for domain entities
//!
//! Every table in the billing schema is keyed by an auto-increment integer,
//! and the ledgers rely on that ordering (transactions are replayed in
//! ascending id order). Newtype wrappers keep an `InvoiceLineId` from being
//! passed where an `OrderLineId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row id
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw row id
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Returns the next id in sequence
            pub const fn next(&self) -> Self {
                Self(self.0 + 1)
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let raw = s.trim();
                let raw = raw.strip_prefix(concat!($prefix, "-")).unwrap_or(raw);
                Ok(Self(raw.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

// Party identifiers
define_id!(CustomerId, "CUS");
define_id!(DoctorId, "DOC");
define_id!(FacilityId, "FAC");
define_id!(InsuranceCompanyId, "INSCO");
define_id!(CustomerInsuranceId, "POL");
define_id!(VendorId, "VND");
define_id!(UserId, "USR");

// Order identifiers
define_id!(OrderId, "ORD");
define_id!(OrderLineId, "ORDL");
define_id!(CmnFormId, "CMN");
define_id!(DepositId, "DEP");

// Invoice identifiers
define_id!(InvoiceId, "INV");
define_id!(InvoiceLineId, "INVL");
define_id!(InvoiceTransactionId, "INVT");

// Inventory identifiers
define_id!(WarehouseId, "WH");
define_id!(InventoryItemId, "ITEM");
define_id!(InventoryTransactionId, "INVTX");
define_id!(PurchaseOrderId, "PO");
define_id!(PurchaseOrderLineId, "POLN");
define_id!(SerialId, "SER");
define_id!(SerialTransactionId, "SERTX");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_id_display() {
        let id = InvoiceId::new(42);
        assert_eq!(id.to_string(), "INV-42");
    }

    #[test]
    fn test_id_parsing() {
        let original = InvoiceLineId::new(1001);
        let parsed: InvoiceLineId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);

        let bare: InvoiceLineId = " 7 ".parse().unwrap();
        assert_eq!(bare.get(), 7);
    }

    #[test]
    fn test_ids_order_by_raw_value() {
        assert!(InvoiceTransactionId::new(9) < InvoiceTransactionId::new(10));
        assert_eq!(InvoiceTransactionId::new(9).next(), InvoiceTransactionId::new(10));
    }
}
