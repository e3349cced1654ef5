//! MIR Domain - Missing Information Report
//!
//! Computes, for every entity a claim depends on, the set of reasons it is
//! not ready to bill. Findings propagate upward: an incomplete doctor makes
//! every order that references them carry `Doctor.MIR`, and an order line
//! with any finding is skipped by the billing engine.
//!
//! # Recompute Order
//!
//! 1. Facilities, doctors, insurance companies
//! 2. Customers and their insurance policies
//! 3. CMN forms
//! 4. Orders and their lines
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_mir::{MirStore, MirValidator};
//!
//! let validator = MirValidator::new(today);
//! let refresh = validator.update_all(&mut store, &mut orders)?;
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
            type Err = $crate::MirError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($name => Ok($ty::$variant),)+
                    other => Err($crate::MirError::unknown($kind, other)),
                }
            }
        }
    };
}

pub mod entities;
pub mod error;
pub mod rules;
pub mod validator;

pub use entities::{
    Address, CmnForm, CmnFormType, CmnKind, Customer, CustomerPolicy, DiagnosisCatalog, DiagnosisCode, Doctor,
    Facility, Gender, InsuranceCompany,
};
pub use error::MirError;
pub use rules::MirRules;
pub use validator::{MirRefresh, MirStore, MirValidator};
