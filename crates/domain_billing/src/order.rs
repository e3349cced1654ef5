//! Orders and order lines
//!
//! An order line carries everything the billing engine needs to produce one
//! invoice line per billing period: pricing, frequencies, the running billing
//! month, and which payers it may be billed to.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    CmnFormId, CustomerId, CustomerInsuranceId, DateRange, DepositId, DoctorId, FacilityId,
    InsuranceCompanyId, InventoryItemId, MirFlags, Money, OrderId, OrderLineId, Rate,
};

use crate::frequency::BillingFrequency;
use crate::rates::{CycleContext, Modifiers, SaleRentType};

/// Order header state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    New,
    Approved,
    Closed,
    Canceled,
}

legacy_names!(OrderState, "order state" {
    New => "New",
    Approved => "Approved",
    Closed => "Closed",
    Canceled => "Canceled",
});

/// Order line lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderLineState {
    New,
    Approved,
    Pickup,
    Closed,
    Canceled,
}

legacy_names!(OrderLineState, "order line state" {
    New => "New",
    Approved => "Approved",
    Pickup => "Pickup",
    Closed => "Closed",
    Canceled => "Canceled",
});

impl OrderLineState {
    pub fn is_active(&self) -> bool {
        !matches!(self, OrderLineState::Closed | OrderLineState::Canceled)
    }
}

/// An insurance policy occupying one of the four ranked payer slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerPolicy {
    pub policy_id: CustomerInsuranceId,
    pub company_id: InsuranceCompanyId,
}

/// Batch-partition key of an order line
///
/// Persisted as a 6-bit integer: bits 0-3 for insurers 1-4 that are present
/// and billable, bit 4 for an end date, bit 5 for accept-assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillingFlags {
    pub insurers: [bool; 4],
    pub has_end_date: bool,
    pub accept_assignment: bool,
}

impl BillingFlags {
    /// Computes the flags of `line` on `order`
    pub fn for_line(order: &Order, line: &OrderLine) -> Self {
        let mut insurers = [false; 4];
        for (slot, flag) in insurers.iter_mut().enumerate() {
            *flag = order.policies[slot].is_some() && line.bill_ins[slot];
        }
        Self {
            insurers,
            has_end_date: line.end_date.is_some(),
            accept_assignment: line.accept_assignment,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0u8;
        for (slot, flag) in self.insurers.iter().enumerate() {
            if *flag {
                bits |= 1 << slot;
            }
        }
        if self.has_end_date {
            bits |= 1 << 4;
        }
        if self.accept_assignment {
            bits |= 1 << 5;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        let mut insurers = [false; 4];
        for (slot, flag) in insurers.iter_mut().enumerate() {
            *flag = bits & (1 << slot) != 0;
        }
        Self {
            insurers,
            has_end_date: bits & (1 << 4) != 0,
            accept_assignment: bits & (1 << 5) != 0,
        }
    }
}

/// Money received up front against an order line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub order_line_id: OrderLineId,
    pub amount: Money,
    pub date: NaiveDate,
}

/// A customer order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    /// Ranked payers: index 0 is insurer 1
    pub policies: [Option<PayerPolicy>; 4],
    pub icd9_codes: Vec<String>,
    pub icd10_codes: Vec<String>,
    pub doctor_id: Option<DoctorId>,
    pub facility_id: Option<FacilityId>,
    pub approved: bool,
    pub state: OrderState,
    /// Invoice-level discount applied to every generated amount
    pub discount: Rate,
    pub mir: MirFlags,
    pub lines: Vec<OrderLine>,
    pub deposits: Vec<Deposit>,
}

impl Order {
    pub fn new(id: OrderId, customer_id: CustomerId) -> Self {
        Self {
            id,
            customer_id,
            policies: [None; 4],
            icd9_codes: Vec::new(),
            icd10_codes: Vec::new(),
            doctor_id: None,
            facility_id: None,
            approved: true,
            state: OrderState::Approved,
            discount: Rate::default(),
            mir: MirFlags::new(),
            lines: Vec::new(),
            deposits: Vec::new(),
        }
    }

    /// Places a policy in payer slot `slot` (1-4)
    pub fn with_policy(mut self, slot: usize, policy: PayerPolicy) -> Self {
        if let Some(entry) = slot.checked_sub(1).and_then(|i| self.policies.get_mut(i)) {
            *entry = Some(policy);
        }
        self
    }

    pub fn with_discount(mut self, discount: Rate) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_line(mut self, line: OrderLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_deposit(mut self, deposit: Deposit) -> Self {
        self.deposits.push(deposit);
        self
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, OrderState::Closed | OrderState::Canceled)
    }

    pub fn line(&self, id: OrderLineId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.id == id)
    }
}

/// One billable item on an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub inventory_item_id: Option<InventoryItemId>,
    pub billing_code: String,
    pub price_code: String,
    pub sale_rent_type: SaleRentType,
    pub dos: DateRange,
    pub delivery_date: Option<NaiveDate>,
    pub pickup_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub ordered_quantity: Decimal,
    pub ordered_frequency: BillingFrequency,
    pub billed_quantity: Decimal,
    pub billed_frequency: BillingFrequency,
    pub delivery_quantity: Decimal,
    pub billable_price: Money,
    pub allowable_price: Money,
    /// Buyout prices for rent-to-purchase lines
    pub sale_billable_price: Money,
    pub sale_allowable_price: Money,
    pub flat_rate: bool,
    pub taxable: bool,
    pub tax_rate: Rate,
    /// Running billing-month counter; zero or negative means "not started"
    pub billing_month: i32,
    pub bill_ins: [bool; 4],
    /// Do-not-bill override for insurer 1
    pub nopay_ins1: bool,
    pub accept_assignment: bool,
    pub hardship: bool,
    pub modifiers: Modifiers,
    pub authorization_number: Option<String>,
    pub authorization_expiration: Option<NaiveDate>,
    pub cmn_form_id: Option<CmnFormId>,
    pub dx_pointer: String,
    pub state: OrderLineState,
    pub mir: MirFlags,
}

impl OrderLine {
    /// Creates a line billed monthly at `price` per unit
    pub fn new(
        id: OrderLineId,
        order_id: OrderId,
        billing_code: impl Into<String>,
        sale_rent_type: SaleRentType,
        dos_from: NaiveDate,
        price: Money,
    ) -> Self {
        Self {
            id,
            order_id,
            inventory_item_id: None,
            billing_code: billing_code.into(),
            price_code: String::new(),
            sale_rent_type,
            dos: DateRange::single(dos_from),
            delivery_date: Some(dos_from),
            pickup_date: None,
            end_date: None,
            ordered_quantity: Decimal::ONE,
            ordered_frequency: BillingFrequency::Monthly,
            billed_quantity: Decimal::ONE,
            billed_frequency: BillingFrequency::Monthly,
            delivery_quantity: Decimal::ONE,
            billable_price: price,
            allowable_price: price,
            sale_billable_price: Money::ZERO,
            sale_allowable_price: Money::ZERO,
            flat_rate: false,
            taxable: false,
            tax_rate: Rate::default(),
            billing_month: 0,
            bill_ins: [true; 4],
            nopay_ins1: false,
            accept_assignment: true,
            hardship: false,
            modifiers: Modifiers::default(),
            authorization_number: None,
            authorization_expiration: None,
            cmn_form_id: None,
            dx_pointer: "1".to_string(),
            state: OrderLineState::Approved,
            mir: MirFlags::new(),
        }
    }

    pub fn with_quantity(mut self, billed: Decimal) -> Self {
        self.billed_quantity = billed;
        self.ordered_quantity = billed;
        self
    }

    pub fn with_frequencies(mut self, ordered: BillingFrequency, billed: BillingFrequency) -> Self {
        self.ordered_frequency = ordered;
        self.billed_frequency = billed;
        self
    }

    pub fn with_allowable_price(mut self, price: Money) -> Self {
        self.allowable_price = price;
        self
    }

    pub fn with_sale_prices(mut self, billable: Money, allowable: Money) -> Self {
        self.sale_billable_price = billable;
        self.sale_allowable_price = allowable;
        self
    }

    pub fn with_tax(mut self, rate: Rate) -> Self {
        self.taxable = true;
        self.tax_rate = rate;
        self
    }

    pub fn with_billing_month(mut self, month: i32) -> Self {
        self.billing_month = month;
        self
    }

    pub fn with_delivery_date(mut self, date: Option<NaiveDate>) -> Self {
        self.delivery_date = date;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Restricts billing to the given insurer slots (index 0 = insurer 1)
    pub fn with_bill_ins(mut self, bill_ins: [bool; 4]) -> Self {
        self.bill_ins = bill_ins;
        self
    }

    pub fn with_hardship(mut self) -> Self {
        self.hardship = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Billing month with the "not started" values folded onto month 1
    pub fn effective_billing_month(&self) -> i32 {
        self.billing_month.max(1)
    }

    /// Context for the billing-cycle policy functions at the current month
    pub fn cycle(&self) -> CycleContext<'_> {
        CycleContext {
            delivery_date: self.delivery_date,
            dos_from: self.dos.start,
            sale_rent_type: self.sale_rent_type,
            billing_month: self.effective_billing_month(),
            modifiers: &self.modifiers,
        }
    }

    /// An end date earlier than the service date blocks billing
    pub fn ended_before_service(&self) -> bool {
        self.end_date.is_some_and(|end| end < self.dos.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_with_line(bill_ins: [bool; 4]) -> (Order, OrderLine) {
        let order = Order::new(OrderId::new(1), CustomerId::new(1))
            .with_policy(1, PayerPolicy {
                policy_id: CustomerInsuranceId::new(10),
                company_id: InsuranceCompanyId::new(100),
            })
            .with_policy(3, PayerPolicy {
                policy_id: CustomerInsuranceId::new(30),
                company_id: InsuranceCompanyId::new(300),
            });
        let line = OrderLine::new(
            OrderLineId::new(1),
            OrderId::new(1),
            "E0260",
            SaleRentType::MonthlyRental,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Money::new(dec!(250)),
        )
        .with_bill_ins(bill_ins);
        (order, line)
    }

    #[test]
    fn test_billing_flags_require_policy_and_bill_flag() {
        let (order, line) = order_with_line([true, true, false, false]);
        let flags = BillingFlags::for_line(&order, &line);
        assert_eq!(flags.insurers, [true, false, false, false]);
        assert!(flags.accept_assignment);
        assert_eq!(flags.bits(), 0b10_0001);
    }

    #[test]
    fn test_billing_flags_bits_round_trip() {
        let flags = BillingFlags {
            insurers: [false, true, true, false],
            has_end_date: true,
            accept_assignment: false,
        };
        assert_eq!(BillingFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_effective_billing_month() {
        let (_, line) = order_with_line([true; 4]);
        assert_eq!(line.effective_billing_month(), 1);
        assert_eq!(line.with_billing_month(7).effective_billing_month(), 7);
    }
}
