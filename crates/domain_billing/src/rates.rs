//! Price tiers and Medicare billing-cycle policies
//!
//! The amount owed for a billing month depends on the sale/rent type of the
//! line. Capped rentals follow the Medicare cap schedule, and the rules for
//! when a line stops billing changed for equipment delivered on or after
//! 2006-01-01, so several functions branch on the delivery-date era.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::Money;

/// How an order line is sold or rented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleRentType {
    OneTimeSale,
    ReoccurringSale,
    RentToPurchase,
    CappedRental,
    ParentalCappedRental,
    MedicareOxygenRental,
    OneTimeRental,
    MonthlyRental,
}

legacy_names!(SaleRentType, "sale/rent type" {
    OneTimeSale => "One Time Sale",
    ReoccurringSale => "Re-occurring Sale",
    RentToPurchase => "Rent to Purchase",
    CappedRental => "Capped Rental",
    ParentalCappedRental => "Parental Capped Rental",
    MedicareOxygenRental => "Medicare Oxygen Rental",
    OneTimeRental => "One Time Rental",
    MonthlyRental => "Monthly Rental",
});

impl SaleRentType {
    pub fn is_rental(&self) -> bool {
        !matches!(self, SaleRentType::OneTimeSale | SaleRentType::ReoccurringSale)
    }

    pub fn is_capped(&self) -> bool {
        matches!(self, SaleRentType::CappedRental | SaleRentType::ParentalCappedRental)
    }
}

/// Medicare rule set in force for a line, picked by its delivery date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryEra {
    Pre2006,
    Post2006,
}

impl DeliveryEra {
    pub fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2006, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Era of the delivery date, or of the first DOS when never delivered
    pub fn of(delivery_date: Option<NaiveDate>, dos_from: NaiveDate) -> Self {
        if delivery_date.unwrap_or(dos_from) < Self::cutoff() {
            DeliveryEra::Pre2006
        } else {
            DeliveryEra::Post2006
        }
    }
}

/// The four positional HCPCS modifiers on a line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers([String; 4]);

impl Modifiers {
    pub fn new(m1: &str, m2: &str, m3: &str, m4: &str) -> Self {
        Self([m1.to_string(), m2.to_string(), m3.to_string(), m4.to_string()])
    }

    /// Modifier at 1-based `index`; empty when out of range
    pub fn get(&self, index: usize) -> &str {
        index
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, index: usize, code: impl Into<String>) {
        if let Some(slot) = index.checked_sub(1).and_then(|i| self.0.get_mut(i)) {
            *slot = code.into();
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.iter().any(|m| m.eq_ignore_ascii_case(code))
    }
}

/// Inputs shared by the billing-cycle policy functions
#[derive(Debug, Clone)]
pub struct CycleContext<'a> {
    pub delivery_date: Option<NaiveDate>,
    pub dos_from: NaiveDate,
    pub sale_rent_type: SaleRentType,
    pub billing_month: i32,
    pub modifiers: &'a Modifiers,
}

impl CycleContext<'_> {
    fn era(&self) -> DeliveryEra {
        DeliveryEra::of(self.delivery_date, self.dos_from)
    }

    fn month(&self) -> i32 {
        normalize_month(self.billing_month)
    }

    /// Beneficiary elected to purchase the capped item
    fn purchase_elected(&self) -> bool {
        self.modifiers.contains("BP")
    }
}

fn normalize_month(billing_month: i32) -> i32 {
    billing_month.max(1)
}

fn is_recert_month(month: i32) -> bool {
    month >= 22 && (month - 22) % 6 == 0
}

fn effective_quantity(quantity: Decimal, flat_rate: bool) -> Decimal {
    if flat_rate {
        Decimal::ONE
    } else {
        quantity
    }
}

fn tiered_amount(
    sale_rent_type: SaleRentType,
    billing_month: i32,
    price: Money,
    quantity: Decimal,
    sale_price: Money,
    flat_rate: bool,
    capped_factor: impl Fn(i32) -> Decimal,
) -> Money {
    let month = normalize_month(billing_month);
    let quantity = effective_quantity(quantity, flat_rate);
    let full = price * quantity;

    match sale_rent_type {
        SaleRentType::OneTimeSale | SaleRentType::ReoccurringSale | SaleRentType::OneTimeRental => {
            if month == 1 {
                full
            } else {
                Money::ZERO
            }
        }
        SaleRentType::MonthlyRental | SaleRentType::MedicareOxygenRental => full,
        SaleRentType::RentToPurchase => match month {
            1..=9 => full,
            10 => (sale_price - price * dec!(9)) * quantity,
            _ => Money::ZERO,
        },
        SaleRentType::CappedRental | SaleRentType::ParentalCappedRental => {
            if month <= 15 {
                full * capped_factor(month)
            } else if is_recert_month(month) {
                full
            } else {
                Money::ZERO
            }
        }
    }
}

/// Amount the payer allows for a billing month
///
/// Capped rentals are allowed in full for months 1-3 and at 75% for months
/// 4-15, then once every six months from month 22.
pub fn allowable_amount(
    sale_rent_type: SaleRentType,
    billing_month: i32,
    price: Money,
    quantity: Decimal,
    sale_price: Money,
    flat_rate: bool,
) -> Money {
    tiered_amount(sale_rent_type, billing_month, price, quantity, sale_price, flat_rate, |month| {
        if month <= 3 {
            Decimal::ONE
        } else {
            dec!(0.75)
        }
    })
}

/// Amount charged for a billing month
///
/// Same schedule as [`allowable_amount`] except capped rentals bill in full
/// for all of months 1-15.
pub fn billable_amount(
    sale_rent_type: SaleRentType,
    billing_month: i32,
    price: Money,
    quantity: Decimal,
    sale_price: Money,
    flat_rate: bool,
) -> Money {
    tiered_amount(sale_rent_type, billing_month, price, quantity, sale_price, flat_rate, |_| {
        Decimal::ONE
    })
}

/// The line must not be billed by the order engine this cycle
pub fn order_must_be_skipped(ctx: &CycleContext<'_>) -> bool {
    let month = ctx.month();
    match (ctx.sale_rent_type, ctx.era()) {
        (t, DeliveryEra::Post2006) if t.is_capped() => 13 < month,
        (t, DeliveryEra::Pre2006) if t.is_capped() => ctx.purchase_elected() && 13 < month,
        (SaleRentType::MedicareOxygenRental, DeliveryEra::Post2006) => 36 < month,
        // billing stops at 36 months but the contract runs for 60
        (SaleRentType::MedicareOxygenRental, DeliveryEra::Pre2006) => 60 < month,
        (SaleRentType::RentToPurchase, _) => 10 < month,
        (SaleRentType::OneTimeSale | SaleRentType::OneTimeRental, _) => 1 < month,
        _ => false,
    }
}

/// The line has exhausted its schedule and closes after this cycle
pub fn order_must_be_closed(ctx: &CycleContext<'_>) -> bool {
    let month = ctx.month();
    match (ctx.sale_rent_type, ctx.era()) {
        (t, DeliveryEra::Post2006) if t.is_capped() => 13 <= month,
        (t, DeliveryEra::Pre2006) if t.is_capped() => ctx.purchase_elected() && 13 <= month,
        (SaleRentType::MedicareOxygenRental, DeliveryEra::Post2006) => 36 <= month,
        (SaleRentType::MedicareOxygenRental, DeliveryEra::Pre2006) => 60 <= month,
        (SaleRentType::RentToPurchase, _) => 10 <= month,
        (SaleRentType::OneTimeSale | SaleRentType::OneTimeRental, _) => 1 <= month,
        _ => false,
    }
}

/// No invoice line is produced for this billing month
pub fn invoice_must_be_skipped(ctx: &CycleContext<'_>) -> bool {
    let month = ctx.month();
    match (ctx.sale_rent_type, ctx.era()) {
        (t, DeliveryEra::Post2006) if t.is_capped() => 13 < month,
        (t, DeliveryEra::Pre2006) if t.is_capped() => {
            (15 < month && month < 22) || (22 <= month && !is_recert_month(month))
        }
        (SaleRentType::MedicareOxygenRental, _) => 36 < month,
        (SaleRentType::RentToPurchase, _) => 10 < month,
        (SaleRentType::OneTimeSale | SaleRentType::OneTimeRental, _) => 1 < month,
        _ => false,
    }
}

/// Modifier code for position `index` (1-4) on an invoice line
///
/// Falls back to the modifier stored on the order line when no rule applies.
pub fn invoice_modifier(ctx: &CycleContext<'_>, index: usize) -> String {
    let month = ctx.month();
    let computed = match index {
        1 if ctx.sale_rent_type.is_rental() => Some("RR"),
        2 if ctx.sale_rent_type.is_capped() => match month {
            1 => Some("KH"),
            2..=3 => Some("KI"),
            4..=15 => Some("KJ"),
            m if ctx.era() == DeliveryEra::Pre2006 && is_recert_month(m) => Some("MS"),
            _ => None,
        },
        3 if ctx.sale_rent_type.is_capped() && (4..=15).contains(&month) => Some("KX"),
        _ => None,
    };
    computed
        .map(str::to_string)
        .unwrap_or_else(|| ctx.modifiers.get(index).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ctx(t: SaleRentType, month: i32, delivered: NaiveDate, modifiers: &Modifiers) -> CycleContext<'_> {
        CycleContext {
            delivery_date: Some(delivered),
            dos_from: delivered,
            sale_rent_type: t,
            billing_month: month,
            modifiers,
        }
    }

    #[test]
    fn test_allowable_boundary_values() {
        let p = Money::new(dec!(100.00));
        let q = dec!(1);
        let z = Money::ZERO;
        assert_eq!(allowable_amount(SaleRentType::MonthlyRental, 5, p, q, z, false), p);
        assert_eq!(
            allowable_amount(SaleRentType::RentToPurchase, 10, Money::new(dec!(50)), q, Money::new(dec!(800)), false),
            Money::new(dec!(350.00))
        );
        assert_eq!(allowable_amount(SaleRentType::CappedRental, 2, p, q, z, false), p);
        assert_eq!(allowable_amount(SaleRentType::CappedRental, 10, p, q, z, false), Money::new(dec!(75.00)));
        assert_eq!(allowable_amount(SaleRentType::CappedRental, 22, p, q, z, false), p);
        assert_eq!(allowable_amount(SaleRentType::CappedRental, 23, p, q, z, false), Money::ZERO);
        assert_eq!(allowable_amount(SaleRentType::OneTimeSale, 2, p, q, z, false), Money::ZERO);
    }

    #[test]
    fn test_billable_capped_is_full_through_month_15() {
        let p = Money::new(dec!(100.00));
        assert_eq!(billable_amount(SaleRentType::CappedRental, 10, p, dec!(1), Money::ZERO, false), p);
        assert_eq!(billable_amount(SaleRentType::CappedRental, 16, p, dec!(1), Money::ZERO, false), Money::ZERO);
        assert_eq!(billable_amount(SaleRentType::CappedRental, 28, p, dec!(1), Money::ZERO, false), p);
    }

    #[test]
    fn test_month_zero_and_flat_rate() {
        let p = Money::new(dec!(40.00));
        assert_eq!(allowable_amount(SaleRentType::OneTimeSale, 0, p, dec!(3), Money::ZERO, false), Money::new(dec!(120.00)));
        assert_eq!(allowable_amount(SaleRentType::OneTimeSale, -4, p, dec!(3), Money::ZERO, true), p);
    }

    #[test]
    fn test_rent_to_purchase_after_buyout() {
        let p = Money::new(dec!(50.00));
        assert_eq!(allowable_amount(SaleRentType::RentToPurchase, 9, p, dec!(1), Money::new(dec!(800)), false), p);
        assert_eq!(allowable_amount(SaleRentType::RentToPurchase, 11, p, dec!(1), Money::new(dec!(800)), false), Money::ZERO);
    }

    #[test]
    fn test_capped_closes_at_month_13_post_2006() {
        let m = Modifiers::default();
        let delivered = d(2010, 5, 1);
        assert!(order_must_be_closed(&ctx(SaleRentType::CappedRental, 13, delivered, &m)));
        assert!(!order_must_be_closed(&ctx(SaleRentType::CappedRental, 12, delivered, &m)));
        assert!(!order_must_be_skipped(&ctx(SaleRentType::CappedRental, 13, delivered, &m)));
        assert!(order_must_be_skipped(&ctx(SaleRentType::CappedRental, 14, delivered, &m)));
    }

    #[test]
    fn test_capped_pre_2006_depends_on_purchase_election() {
        let rental = Modifiers::new("RR", "BR", "", "");
        let purchase = Modifiers::new("RR", "BP", "", "");
        let delivered = d(2004, 5, 1);

        assert!(!order_must_be_closed(&ctx(SaleRentType::CappedRental, 13, delivered, &rental)));
        assert!(order_must_be_closed(&ctx(SaleRentType::CappedRental, 13, delivered, &purchase)));

        assert!(invoice_must_be_skipped(&ctx(SaleRentType::CappedRental, 16, delivered, &rental)));
        assert!(!invoice_must_be_skipped(&ctx(SaleRentType::CappedRental, 22, delivered, &rental)));
        assert!(invoice_must_be_skipped(&ctx(SaleRentType::CappedRental, 23, delivered, &rental)));
        assert!(!invoice_must_be_skipped(&ctx(SaleRentType::CappedRental, 28, delivered, &rental)));
    }

    #[test]
    fn test_oxygen_thresholds_by_era() {
        let m = Modifiers::default();
        let old = d(2003, 1, 1);
        let new = d(2008, 1, 1);

        assert!(order_must_be_closed(&ctx(SaleRentType::MedicareOxygenRental, 36, new, &m)));
        assert!(!order_must_be_closed(&ctx(SaleRentType::MedicareOxygenRental, 36, old, &m)));
        assert!(order_must_be_closed(&ctx(SaleRentType::MedicareOxygenRental, 60, old, &m)));

        // pre-2006 contract continues but invoicing stops at 36
        assert!(!order_must_be_skipped(&ctx(SaleRentType::MedicareOxygenRental, 40, old, &m)));
        assert!(invoice_must_be_skipped(&ctx(SaleRentType::MedicareOxygenRental, 40, old, &m)));
    }

    #[test]
    fn test_era_falls_back_to_dos_from() {
        assert_eq!(DeliveryEra::of(None, d(2005, 12, 31)), DeliveryEra::Pre2006);
        assert_eq!(DeliveryEra::of(None, d(2006, 1, 1)), DeliveryEra::Post2006);
        assert_eq!(DeliveryEra::of(Some(d(2005, 6, 1)), d(2007, 1, 1)), DeliveryEra::Pre2006);
    }

    #[test]
    fn test_recurring_types_never_close() {
        let m = Modifiers::default();
        let delivered = d(2020, 1, 1);
        for t in [SaleRentType::MonthlyRental, SaleRentType::ReoccurringSale] {
            assert!(!order_must_be_closed(&ctx(t, 500, delivered, &m)));
            assert!(!order_must_be_skipped(&ctx(t, 500, delivered, &m)));
            assert!(!invoice_must_be_skipped(&ctx(t, 500, delivered, &m)));
        }
    }

    #[test]
    fn test_capped_modifiers() {
        let stored = Modifiers::new("", "GA", "", "NU");
        let delivered = d(2012, 1, 1);
        let at = |month| ctx(SaleRentType::CappedRental, month, delivered, &stored);

        assert_eq!(invoice_modifier(&at(1), 1), "RR");
        assert_eq!(invoice_modifier(&at(1), 2), "KH");
        assert_eq!(invoice_modifier(&at(3), 2), "KI");
        assert_eq!(invoice_modifier(&at(7), 2), "KJ");
        assert_eq!(invoice_modifier(&at(7), 3), "KX");
        assert_eq!(invoice_modifier(&at(2), 3), "");
        assert_eq!(invoice_modifier(&at(7), 4), "NU");
    }

    #[test]
    fn test_recert_modifier_pre_2006() {
        let stored = Modifiers::new("", "BR", "", "");
        let recert = ctx(SaleRentType::CappedRental, 22, d(2004, 1, 1), &stored);
        assert_eq!(invoice_modifier(&recert, 2), "MS");

        let sale = ctx(SaleRentType::OneTimeSale, 1, d(2004, 1, 1), &stored);
        assert_eq!(invoice_modifier(&sale, 1), "");
        assert_eq!(invoice_modifier(&sale, 2), "BR");
    }
}
