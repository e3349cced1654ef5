//! Soft-fail outcome contract
//!
//! Ledger operations that meet a "nothing to do" condition (unknown
//! transaction type, insufficient stock, a serial event that is not valid from
//! the current state) do not fail. They report `Outcome::Skipped` with the
//! reason, so callers and tests can observe the skip without treating it as an
//! error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an operation performed no mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Quantity was zero or negative
    NonPositiveQuantity,
    /// The named transaction type is not configured
    UnknownTransactionType(String),
    /// A required parameter was absent
    MissingParameter(String),
    /// Source and destination are the same
    SameLocation,
    /// Not enough stock on hand at the source
    InsufficientStock { available: i64, requested: i64 },
    /// The event is not accepted from the entity's current state
    InvalidTransition { event: String, from: String },
    /// The same row is already present in the ledger
    AlreadyRecorded,
    /// The entity is not in a state that needs this operation
    NotApplicable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NonPositiveQuantity => write!(f, "quantity must be positive"),
            SkipReason::UnknownTransactionType(name) => write!(f, "unknown transaction type '{}'", name),
            SkipReason::MissingParameter(name) => write!(f, "missing parameter {}", name),
            SkipReason::SameLocation => write!(f, "source and destination are the same"),
            SkipReason::InsufficientStock { available, requested } => {
                write!(f, "insufficient stock: {} available, {} requested", available, requested)
            }
            SkipReason::InvalidTransition { event, from } => {
                write!(f, "event '{}' is not valid from state '{}'", event, from)
            }
            SkipReason::AlreadyRecorded => write!(f, "already recorded"),
            SkipReason::NotApplicable(why) => write!(f, "not applicable: {}", why),
        }
    }
}

/// Result of an operation that may legitimately do nothing
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome<T> {
    /// The mutation happened
    Applied(T),
    /// Nothing was changed
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn skipped(reason: SkipReason) -> Self {
        Outcome::Skipped(reason)
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    /// Returns the applied value, if any
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    /// Returns the skip reason, if any
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Skipped(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Applied(value) => Outcome::Applied(f(value)),
            Outcome::Skipped(reason) => Outcome::Skipped(reason),
        }
    }
}
