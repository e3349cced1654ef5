//! Billing periods and proration
//!
//! An order line is billed in periods of its billed frequency, while its
//! quantity is expressed per ordered frequency ("2 per day, billed monthly").
//! This module computes period boundaries and the multipliers that convert
//! between the two.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::temporal::{add_months, end_of_month, inclusive_days, start_of_month};
use core_kernel::DateRange;

use crate::rates::SaleRentType;

/// How often an order line is ordered or billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingFrequency {
    OneTime,
    Daily,
    Weekly,
    Monthly,
    /// Monthly, but periods snap to calendar months
    CalendarMonthly,
    Quarterly,
    SemiAnnually,
    Annually,
    /// Periods keep the length of the original DOS window
    Custom,
}

legacy_names!(BillingFrequency, "billing frequency" {
    OneTime => "One time",
    Daily => "Daily",
    Weekly => "Weekly",
    Monthly => "Monthly",
    CalendarMonthly => "Calendar Monthly",
    Quarterly => "Quarterly",
    SemiAnnually => "Semi-Annually",
    Annually => "Annually",
    Custom => "Custom",
});

impl BillingFrequency {
    /// Collapses Calendar Monthly onto Monthly for ratio lookups
    fn ratio_class(&self) -> Self {
        match self {
            BillingFrequency::CalendarMonthly => BillingFrequency::Monthly,
            other => *other,
        }
    }

    /// Nominal length in days, used to prorate one-time rentals
    pub fn nominal_days(&self) -> Option<Decimal> {
        match self {
            BillingFrequency::Daily => Some(Decimal::ONE),
            BillingFrequency::Weekly => Some(Decimal::from(7)),
            BillingFrequency::Monthly | BillingFrequency::CalendarMonthly => Some(Decimal::from(30)),
            BillingFrequency::Quarterly => Some(Decimal::from(91)),
            BillingFrequency::SemiAnnually => Some(Decimal::from(182)),
            BillingFrequency::Annually => Some(Decimal::from(365)),
            BillingFrequency::OneTime | BillingFrequency::Custom => None,
        }
    }

    /// First day of the period that follows the one starting at `from`
    ///
    /// `to` is only consulted for `Custom`, whose next period starts the day
    /// after the current window ends.
    pub fn next_period_start(&self, from: NaiveDate, to: NaiveDate) -> NaiveDate {
        match self {
            BillingFrequency::OneTime => from,
            BillingFrequency::Daily => from + Days::new(1),
            BillingFrequency::Weekly => from + Days::new(7),
            BillingFrequency::Monthly => add_months(from, 1),
            BillingFrequency::CalendarMonthly => add_months(start_of_month(from), 1),
            BillingFrequency::Quarterly => add_months(from, 3),
            BillingFrequency::SemiAnnually => add_months(from, 6),
            BillingFrequency::Annually => add_months(from, 12),
            BillingFrequency::Custom => to + Days::new(1),
        }
    }

    /// Last day of the period starting at `from`
    pub fn period_end(&self, from: NaiveDate, to: NaiveDate) -> NaiveDate {
        match self {
            BillingFrequency::OneTime | BillingFrequency::Custom => to.max(from),
            BillingFrequency::CalendarMonthly => end_of_month(from),
            _ => self
                .next_period_start(from, to)
                .pred_opt()
                .unwrap_or(from)
                .max(from),
        }
    }

    /// Period end, cut short by a pickup date that falls inside the period
    pub fn period_end_clamped_to_pickup(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        pickup: Option<NaiveDate>,
    ) -> NaiveDate {
        let end = self.period_end(from, to);
        match pickup {
            Some(pickup) if pickup >= from && pickup < end => pickup,
            _ => end,
        }
    }

    /// The DOS window of the next billing period
    pub fn advance(&self, dos: DateRange) -> DateRange {
        let start = self.next_period_start(dos.start, dos.end);
        let end = match self {
            BillingFrequency::Custom => start + Days::new(dos.end.signed_duration_since(dos.start).num_days().max(0) as u64),
            BillingFrequency::OneTime => dos.end.max(start),
            _ => self.period_end(start, start),
        };
        DateRange { start, end }
    }
}

/// Converts a per-ordered-frequency quantity into a per-billed-frequency one
///
/// # Arguments
///
/// * `from`, `to` - DOS window of the billed period
/// * `ordered` - Frequency the quantity is expressed in
/// * `billed` - Frequency the line is billed in
///
/// # Returns
///
/// The multiplier, or `None` when the pair has no defined conversion
/// (e.g. ordered monthly but billed weekly).
pub fn period_multiplier(
    from: NaiveDate,
    to: NaiveDate,
    ordered: BillingFrequency,
    billed: BillingFrequency,
) -> Option<Decimal> {
    use BillingFrequency::*;

    if billed == OneTime || ordered.ratio_class() == billed.ratio_class() {
        return Some(Decimal::ONE);
    }

    let ratio = match (ordered.ratio_class(), billed) {
        (Daily, Weekly) => 7,
        (Daily, Custom) => inclusive_days(from, to),
        (Daily, Monthly | CalendarMonthly | Quarterly | SemiAnnually | Annually) => {
            billed
                .next_period_start(from, to)
                .signed_duration_since(from)
                .num_days()
        }
        (Weekly, Monthly | CalendarMonthly) => 4,
        (Weekly, Quarterly) => 13,
        (Weekly, SemiAnnually) => 26,
        (Weekly, Annually) => 52,
        (Monthly, Quarterly) => 3,
        (Monthly, SemiAnnually) => 6,
        (Monthly, Annually) => 12,
        (Quarterly, SemiAnnually) => 2,
        (Quarterly, Annually) => 4,
        (SemiAnnually, Annually) => 2,
        _ => return None,
    };
    Some(Decimal::from(ratio))
}

/// Proration factor applied to the line's money amounts
///
/// One-time rentals are prorated by the fraction of an ordered period that
/// the (pickup-clamped) window covers; everything else uses the period
/// multiplier.
pub fn amount_multiplier(
    dos: DateRange,
    pickup: Option<NaiveDate>,
    ordered: BillingFrequency,
    billed: BillingFrequency,
    sale_rent_type: SaleRentType,
) -> Option<Decimal> {
    if sale_rent_type == SaleRentType::OneTimeRental {
        let end = billed.period_end_clamped_to_pickup(dos.start, dos.end, pickup);
        let days = Decimal::from(inclusive_days(dos.start, end));
        return match ordered.nominal_days() {
            Some(length) => Some((days / length).round_dp(4)),
            None => Some(Decimal::ONE),
        };
    }
    period_multiplier(dos.start, dos.end, ordered, billed)
}

/// Factor applied to the billed quantity
///
/// Unlike [`amount_multiplier`], one-time rentals count whole days here.
pub fn quantity_multiplier(
    dos: DateRange,
    pickup: Option<NaiveDate>,
    ordered: BillingFrequency,
    billed: BillingFrequency,
    sale_rent_type: SaleRentType,
) -> Option<Decimal> {
    if sale_rent_type == SaleRentType::OneTimeRental {
        let end = billed.period_end_clamped_to_pickup(dos.start, dos.end, pickup);
        return Some(Decimal::from(inclusive_days(dos.start, end)));
    }
    period_multiplier(dos.start, dos.end, ordered, billed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_next_period_start() {
        let from = d(2024, 1, 31);
        assert_eq!(BillingFrequency::Monthly.next_period_start(from, from), d(2024, 2, 29));
        assert_eq!(BillingFrequency::CalendarMonthly.next_period_start(d(2024, 1, 15), from), d(2024, 2, 1));
        assert_eq!(BillingFrequency::Weekly.next_period_start(from, from), d(2024, 2, 7));
        assert_eq!(BillingFrequency::Custom.next_period_start(d(2024, 1, 1), d(2024, 1, 10)), d(2024, 1, 11));
        assert_eq!(BillingFrequency::OneTime.next_period_start(from, from), from);
    }

    #[test]
    fn test_period_end() {
        assert_eq!(BillingFrequency::Monthly.period_end(d(2024, 3, 15), d(2024, 3, 15)), d(2024, 4, 14));
        assert_eq!(BillingFrequency::CalendarMonthly.period_end(d(2024, 2, 10), d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(BillingFrequency::Daily.period_end(d(2024, 2, 10), d(2024, 2, 10)), d(2024, 2, 10));
    }

    #[test]
    fn test_clamped_to_pickup() {
        let end = BillingFrequency::Monthly.period_end_clamped_to_pickup(
            d(2024, 3, 1),
            d(2024, 3, 1),
            Some(d(2024, 3, 10)),
        );
        assert_eq!(end, d(2024, 3, 10));

        let unclamped = BillingFrequency::Monthly.period_end_clamped_to_pickup(
            d(2024, 3, 1),
            d(2024, 3, 1),
            Some(d(2024, 6, 1)),
        );
        assert_eq!(unclamped, d(2024, 3, 31));
    }

    #[test]
    fn test_custom_advance_keeps_length() {
        let dos = DateRange::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();
        let next = BillingFrequency::Custom.advance(dos);
        assert_eq!(next.start, d(2024, 1, 11));
        assert_eq!(next.end, d(2024, 1, 20));
    }

    #[test]
    fn test_calendar_monthly_advance_snaps_to_month() {
        let dos = DateRange::new(d(2024, 1, 15), d(2024, 1, 31)).unwrap();
        let next = BillingFrequency::CalendarMonthly.advance(dos);
        assert_eq!(next.start, d(2024, 2, 1));
        assert_eq!(next.end, d(2024, 2, 29));
    }

    #[test]
    fn test_period_multiplier_fixed_ratios() {
        let from = d(2024, 1, 1);
        let m = |o, b| period_multiplier(from, from, o, b);
        assert_eq!(m(BillingFrequency::Monthly, BillingFrequency::Monthly), Some(dec!(1)));
        assert_eq!(m(BillingFrequency::Monthly, BillingFrequency::CalendarMonthly), Some(dec!(1)));
        assert_eq!(m(BillingFrequency::Daily, BillingFrequency::Weekly), Some(dec!(7)));
        assert_eq!(m(BillingFrequency::Weekly, BillingFrequency::Annually), Some(dec!(52)));
        assert_eq!(m(BillingFrequency::Monthly, BillingFrequency::Quarterly), Some(dec!(3)));
        assert_eq!(m(BillingFrequency::Quarterly, BillingFrequency::Annually), Some(dec!(4)));
        assert_eq!(m(BillingFrequency::Annually, BillingFrequency::OneTime), Some(dec!(1)));
    }

    #[test]
    fn test_period_multiplier_daily_counts_days() {
        assert_eq!(
            period_multiplier(d(2024, 2, 1), d(2024, 2, 1), BillingFrequency::Daily, BillingFrequency::Monthly),
            Some(dec!(29))
        );
        assert_eq!(
            period_multiplier(d(2024, 1, 1), d(2024, 1, 1), BillingFrequency::Daily, BillingFrequency::Quarterly),
            Some(dec!(91))
        );
        assert_eq!(
            period_multiplier(d(2024, 1, 1), d(2024, 1, 5), BillingFrequency::Daily, BillingFrequency::Custom),
            Some(dec!(5))
        );
    }

    #[test]
    fn test_period_multiplier_undefined_pair() {
        let from = d(2024, 1, 1);
        assert_eq!(period_multiplier(from, from, BillingFrequency::Monthly, BillingFrequency::Weekly), None);
        assert_eq!(period_multiplier(from, from, BillingFrequency::Custom, BillingFrequency::Monthly), None);
    }

    #[test]
    fn test_one_time_rental_multipliers_diverge() {
        let dos = DateRange::new(d(2024, 3, 1), d(2024, 3, 1)).unwrap();
        let pickup = Some(d(2024, 3, 10));

        let amount = amount_multiplier(
            dos,
            pickup,
            BillingFrequency::Weekly,
            BillingFrequency::Monthly,
            SaleRentType::OneTimeRental,
        );
        let quantity = quantity_multiplier(
            dos,
            pickup,
            BillingFrequency::Weekly,
            BillingFrequency::Monthly,
            SaleRentType::OneTimeRental,
        );

        // 10 days at a weekly rate
        assert_eq!(amount, Some(dec!(1.4286)));
        assert_eq!(quantity, Some(dec!(10)));
    }
}
