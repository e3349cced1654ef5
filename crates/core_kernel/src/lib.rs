//! Core Kernel - Foundational types shared by the DME billing crates
//!
//! This crate provides the building blocks used across all domain modules:
//! - Money with cent-tolerance comparisons
//! - Calendar helpers for dates of service
//! - Integer-backed identifiers
//! - The soft-fail `Outcome` contract
//! - The Missing Information Report vocabulary

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod outcome;
pub mod mir;
pub mod error;

pub use money::{Money, MoneyError, Rate, CENT, MILL};
pub use temporal::{DateRange, TemporalError};
pub use identifiers::*;
pub use outcome::{Outcome, SkipReason};
pub use mir::{DiagnosisScheme, MirFlags, MirReason, UnknownMirToken};
pub use error::CoreError;
