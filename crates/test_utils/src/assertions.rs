//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use core_kernel::{InventoryItemId, InvoiceLineId, MirFlags, MirReason, Money, Outcome, SkipReason, WarehouseId};
use domain_billing::{InvoiceBook, PayerSlot};
use domain_inventory::{Bucket, InventoryLedger, Quantity};
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Arguments
///
/// * `actual` - The actual Money value
/// * `expected` - The expected Money value
/// * `tolerance` - The allowed difference in the amount
///
/// # Panics
///
/// Panics if the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: Money, expected: Money, tolerance: Decimal) {
    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is within a cent of zero
pub fn assert_money_settled(money: Money) {
    assert!(money.is_negligible(), "Expected a settled amount, got {}", money.amount());
}

/// Asserts the reconciled balance of an invoice line
///
/// # Panics
///
/// Panics if the line is unknown or still has unreconciled postings
pub fn assert_line_balance(book: &InvoiceBook, line_id: InvoiceLineId, expected: Money) {
    let view = book
        .view(line_id)
        .unwrap_or_else(|e| panic!("Line {line_id} has no reconciled view: {e}"));
    assert_eq!(
        view.balance, expected,
        "Line {} balance: expected {}, got {}",
        line_id, expected, view.balance
    );
}

/// Asserts which payer a line is currently billed to
pub fn assert_current_payer(book: &InvoiceBook, line_id: InvoiceLineId, expected: Option<PayerSlot>) {
    let view = book
        .view(line_id)
        .unwrap_or_else(|e| panic!("Line {line_id} has no reconciled view: {e}"));
    assert_eq!(
        view.current_payer, expected,
        "Line {} current payer: expected {:?}, got {:?}",
        line_id, expected, view.current_payer
    );
}

/// Unwraps an applied outcome
///
/// # Panics
///
/// Panics with the skip reason if the outcome was skipped
pub fn assert_applied<T>(outcome: Outcome<T>) -> T {
    match outcome {
        Outcome::Applied(value) => value,
        Outcome::Skipped(reason) => panic!("Expected the operation to apply, it was skipped: {reason}"),
    }
}

/// Asserts that an outcome was skipped for the given reason
pub fn assert_skipped_with<T: std::fmt::Debug>(outcome: &Outcome<T>, expected: &SkipReason) {
    match outcome {
        Outcome::Skipped(reason) => assert_eq!(reason, expected, "Skipped for an unexpected reason"),
        Outcome::Applied(value) => panic!("Expected a skip ({expected}), the operation applied: {value:?}"),
    }
}

/// Asserts one bucket of a refreshed stock level
pub fn assert_stock(
    ledger: &InventoryLedger,
    warehouse_id: WarehouseId,
    item_id: InventoryItemId,
    bucket: Bucket,
    expected: Quantity,
) {
    let actual = ledger
        .level(warehouse_id, item_id)
        .map_or(0, |level| level.counts.get(bucket));
    assert_eq!(
        actual, expected,
        "{:?} for item {} at {}: expected {}, got {}",
        bucket, item_id, warehouse_id, expected, actual
    );
}

/// Asserts that a MIR flag set contains a reason
pub fn assert_mir_contains(flags: &MirFlags, reason: MirReason) {
    assert!(
        flags.contains(&reason),
        "Expected MIR to contain {}, got [{}]",
        reason,
        flags.to_wire()
    );
}

/// Asserts that a record passed validation
pub fn assert_mir_clean(flags: &MirFlags) {
    assert!(flags.is_empty(), "Expected no MIR, got [{}]", flags.to_wire());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_approx_eq_within_tolerance() {
        assert_money_approx_eq(Money::new(dec!(100.004)), Money::new(dec!(100.00)), dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "differ by more than tolerance")]
    fn test_money_approx_eq_outside_tolerance() {
        assert_money_approx_eq(Money::new(dec!(100.50)), Money::new(dec!(100.00)), dec!(0.01));
    }

    #[test]
    fn test_settled_amounts() {
        assert_money_settled(Money::new(dec!(-0.009)));
        assert_money_settled(Money::ZERO);
    }

    #[test]
    fn test_applied_unwraps_value() {
        assert_eq!(assert_applied(Outcome::Applied(5)), 5);
    }

    #[test]
    fn test_skipped_with_reason() {
        let outcome: Outcome<()> = Outcome::Skipped(SkipReason::AlreadyRecorded);
        assert_skipped_with(&outcome, &SkipReason::AlreadyRecorded);
    }

    #[test]
    #[should_panic(expected = "Expected MIR to contain")]
    fn test_mir_contains_reports_missing_reason() {
        assert_mir_contains(&MirFlags::new(), MirReason::Doctor);
    }
}
