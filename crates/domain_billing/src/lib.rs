//! Billing Domain - Orders, Invoices and Claim Reconciliation
//!
//! This crate turns recurring DME orders into invoices and keeps each invoice
//! line's payer, balance and submission state in step with its transaction
//! ledger.
//!
//! # Billing Cycle
//!
//! Every order line carries a billing month and a DOS window. The
//! [`BillingEngine`] bills the lines due in a batch, prices them with the
//! schedule for their sale/rent type and delivery era, and then advances or
//! closes them.
//!
//! # Reconciliation
//!
//! Invoice lines never store payer or balance directly. Those fields are
//! derived from the ordered transaction ledger by [`reconcile::derive`]; the
//! [`InvoiceBook`] refuses to expose a line whose derived state is stale.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillingEngine, InvoiceBook};
//!
//! let mut book = InvoiceBook::new();
//! let runs = BillingEngine::new(actor).process_order(&mut order, &mut book, today)?;
//! ```

/// Implements the legacy string spellings of a closed vocabulary
///
/// Generates `legacy_name`, an `ALL` table, `Display` and `FromStr`.
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
            type Err = $crate::BillingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($name => Ok($ty::$variant),)+
                    other => Err($crate::BillingError::unknown($kind, other)),
                }
            }
        }
    };
}

pub mod error;
pub mod frequency;
pub mod rates;
pub mod order;
pub mod invoice;
pub mod transaction;
pub mod payment;
pub mod reconcile;
pub mod ledger;
pub mod engine;

pub use engine::{BillingEngine, BillingRun, LineCharge};
pub use error::BillingError;
pub use frequency::BillingFrequency;
pub use invoice::{Invoice, InvoiceLine, PayerMask, PayerSlot};
pub use ledger::{InvoiceBook, LineSelector, Posted};
pub use order::{BillingFlags, Deposit, Order, OrderLine, OrderLineState, OrderState, PayerPolicy};
pub use payment::{PaymentExtra, PaymentOptions, PostingResult};
pub use rates::{DeliveryEra, Modifiers, SaleRentType};
pub use reconcile::DerivedLine;
pub use transaction::{InvoiceTransaction, TransactionDraft, TransactionKind};
