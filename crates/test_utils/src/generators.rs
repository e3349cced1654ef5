//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{Duration, NaiveDate};
use core_kernel::{CustomerId, DateRange, Money};
use domain_billing::{BillingFrequency, SaleRentType};
use domain_mir::Customer;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::fixtures::{date, MirFixtures};

/// Strategy for every sale/rent type
pub fn sale_rent_type_strategy() -> impl Strategy<Value = SaleRentType> {
    prop_oneof![
        Just(SaleRentType::OneTimeSale),
        Just(SaleRentType::ReoccurringSale),
        Just(SaleRentType::RentToPurchase),
        Just(SaleRentType::CappedRental),
        Just(SaleRentType::ParentalCappedRental),
        Just(SaleRentType::MedicareOxygenRental),
        Just(SaleRentType::OneTimeRental),
        Just(SaleRentType::MonthlyRental),
    ]
}

/// Strategy for the frequencies an order line is usually billed at
pub fn billing_frequency_strategy() -> impl Strategy<Value = BillingFrequency> {
    prop_oneof![
        Just(BillingFrequency::OneTime),
        Just(BillingFrequency::Daily),
        Just(BillingFrequency::Weekly),
        Just(BillingFrequency::Monthly),
        Just(BillingFrequency::CalendarMonthly),
        Just(BillingFrequency::Quarterly),
        Just(BillingFrequency::SemiAnnually),
        Just(BillingFrequency::Annually),
    ]
}

/// Strategy for valid positive amounts in cents
pub fn positive_cents_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy for positive Money values with cent precision
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    positive_cents_strategy().prop_map(Money::from_cents)
}

/// Strategy for Money values with cent precision (can be negative)
pub fn money_strategy() -> impl Strategy<Value = Money> {
    (-10_000_000i64..10_000_000i64).prop_map(Money::from_cents)
}

/// Strategy for billed quantities, 1 to 10 with up to two decimals
pub fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..=1000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Strategy for service dates between 2004 and 2030
pub fn service_date_strategy() -> impl Strategy<Value = NaiveDate> {
    let start = date(2004, 1, 1);
    (0i64..9500i64).prop_map(move |days| start + Duration::days(days))
}

/// Strategy for valid DOS ranges of up to a quarter
pub fn dos_range_strategy() -> impl Strategy<Value = DateRange> {
    (service_date_strategy(), 0i64..92i64).prop_map(|(start, len)| DateRange {
        start,
        end: start + Duration::days(len),
    })
}

/// Strategy for billing months, including the "not started" zero
pub fn billing_month_strategy() -> impl Strategy<Value = i32> {
    0i32..=40i32
}

/// Strategy for a sequence of positive stock receipts as (quantity, cost in cents)
pub fn receipts_strategy(max_len: usize) -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((1i64..50i64, 100i64..200_000i64), 1..=max_len)
}

/// A serial number in the shop's `SN-` format
pub fn fake_serial_number() -> String {
    let n: u32 = (100_000..999_999).fake();
    format!("SN-{n}")
}

/// A customer with a random name at the standard office address
pub fn fake_customer(id: CustomerId) -> Customer {
    let first: String = FirstName().fake();
    let last: String = LastName().fake();
    Customer::new(id, format!("A-{}", id.get()), first, last, MirFixtures::office())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_serial_number_format() {
        let serial = fake_serial_number();
        assert!(serial.starts_with("SN-"));
        assert_eq!(serial.len(), 9);
    }

    #[test]
    fn test_fake_customer_has_names() {
        let customer = fake_customer(CustomerId::new(5));
        assert!(!customer.first_name.is_empty());
        assert!(!customer.last_name.is_empty());
        assert_eq!(customer.account_number, "A-5");
    }

    proptest! {
        #[test]
        fn positive_money_is_always_positive(money in positive_money_strategy()) {
            prop_assert!(money.is_positive());
        }

        #[test]
        fn quantity_is_at_least_one(quantity in quantity_strategy()) {
            prop_assert!(quantity >= Decimal::ONE);
            prop_assert!(quantity <= Decimal::TEN);
        }

        #[test]
        fn dos_range_is_ordered(range in dos_range_strategy()) {
            prop_assert!(range.start <= range.end);
            prop_assert!(DateRange::new(range.start, range.end).is_ok());
        }

        #[test]
        fn receipts_are_positive(receipts in receipts_strategy(8)) {
            prop_assert!(!receipts.is_empty());
            prop_assert!(receipts.iter().all(|(quantity, cost)| *quantity > 0 && *cost > 0));
        }
    }
}
