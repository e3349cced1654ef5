//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::NaiveDate;
use core_kernel::{
    CustomerId, InventoryItemId, InvoiceId, InvoiceLineId, Money, OrderId, OrderLineId, UserId, WarehouseId,
};
use domain_billing::{
    BillingEngine, BillingError, BillingFrequency, BillingRun, InvoiceBook, Order, OrderLine, PayerPolicy,
    SaleRentType,
};
use domain_inventory::inventory::RECEIVED;
use domain_inventory::{AdjustmentRequest, InventoryLedger, Quantity, TypeCatalog};
use rust_decimal::Decimal;

use crate::fixtures::{IdFixtures, MoneyFixtures, PayerFixtures, TemporalFixtures};

/// Builder for constructing test order lines
pub struct TestOrderLineBuilder {
    id: OrderLineId,
    order_id: OrderId,
    billing_code: String,
    price_code: String,
    sale_rent_type: SaleRentType,
    dos_from: NaiveDate,
    price: Money,
    allowable: Option<Money>,
    quantity: Decimal,
    frequencies: Option<(BillingFrequency, BillingFrequency)>,
    billing_month: i32,
    delivery_date: Option<Option<NaiveDate>>,
    inventory_item_id: Option<InventoryItemId>,
}

impl Default for TestOrderLineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestOrderLineBuilder {
    /// Creates a monthly rental of an oxygen concentrator starting on the
    /// standard service date
    pub fn new() -> Self {
        Self {
            id: OrderLineId::new(1),
            order_id: IdFixtures::ORDER,
            billing_code: "E1390".to_string(),
            price_code: "Retail".to_string(),
            sale_rent_type: SaleRentType::MonthlyRental,
            dos_from: TemporalFixtures::service_start(),
            price: MoneyFixtures::hundred(),
            allowable: None,
            quantity: Decimal::ONE,
            frequencies: None,
            billing_month: 0,
            delivery_date: None,
            inventory_item_id: Some(IdFixtures::CONCENTRATOR),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = OrderLineId::new(id);
        self
    }

    pub fn with_order_id(mut self, id: OrderId) -> Self {
        self.order_id = id;
        self
    }

    pub fn with_billing_code(mut self, code: impl Into<String>) -> Self {
        self.billing_code = code.into();
        self
    }

    pub fn with_price_code(mut self, code: impl Into<String>) -> Self {
        self.price_code = code.into();
        self
    }

    pub fn with_sale_rent_type(mut self, sale_rent_type: SaleRentType) -> Self {
        self.sale_rent_type = sale_rent_type;
        self
    }

    pub fn with_dos_from(mut self, date: NaiveDate) -> Self {
        self.dos_from = date;
        self
    }

    /// Sets the billable price; the allowable follows unless set separately
    pub fn with_price(mut self, price: Money) -> Self {
        self.price = price;
        self
    }

    pub fn with_allowable(mut self, allowable: Money) -> Self {
        self.allowable = Some(allowable);
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_frequencies(mut self, ordered: BillingFrequency, billed: BillingFrequency) -> Self {
        self.frequencies = Some((ordered, billed));
        self
    }

    pub fn with_billing_month(mut self, month: i32) -> Self {
        self.billing_month = month;
        self
    }

    /// Overrides the delivery date, which defaults to the first DOS
    pub fn with_delivery_date(mut self, date: Option<NaiveDate>) -> Self {
        self.delivery_date = Some(date);
        self
    }

    pub fn with_inventory_item(mut self, item: Option<InventoryItemId>) -> Self {
        self.inventory_item_id = item;
        self
    }

    /// Builds the order line
    pub fn build(self) -> OrderLine {
        let mut line = OrderLine::new(
            self.id,
            self.order_id,
            self.billing_code,
            self.sale_rent_type,
            self.dos_from,
            self.price,
        )
        .with_quantity(self.quantity)
        .with_billing_month(self.billing_month);

        if let Some(allowable) = self.allowable {
            line = line.with_allowable_price(allowable);
        }
        if let Some((ordered, billed)) = self.frequencies {
            line = line.with_frequencies(ordered, billed);
        }
        if let Some(delivery) = self.delivery_date {
            line = line.with_delivery_date(delivery);
        }
        line.inventory_item_id = self.inventory_item_id;
        line.price_code = self.price_code;
        line
    }
}

/// Builder for constructing test orders
pub struct TestOrderBuilder {
    id: OrderId,
    customer_id: CustomerId,
    policies: Vec<PayerPolicy>,
    lines: Vec<OrderLine>,
    icd10_codes: Vec<String>,
    icd9_codes: Vec<String>,
    with_doctor: bool,
}

impl Default for TestOrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestOrderBuilder {
    /// Creates an order for the standard customer with one insurer and no lines
    pub fn new() -> Self {
        Self {
            id: IdFixtures::ORDER,
            customer_id: IdFixtures::CUSTOMER,
            policies: vec![PayerFixtures::medicare()],
            lines: Vec::new(),
            icd10_codes: vec!["J44.9".to_string()],
            icd9_codes: vec!["496".to_string()],
            with_doctor: true,
        }
    }

    pub fn with_id(mut self, id: OrderId) -> Self {
        self.id = id;
        self
    }

    /// Ranks `count` insurers on the order, replacing the defaults
    pub fn with_insurers(mut self, count: usize) -> Self {
        self.policies = (1..=count.min(4)).map(|n| PayerFixtures::policy(n as i64)).collect();
        self
    }

    pub fn without_insurers(mut self) -> Self {
        self.policies.clear();
        self
    }

    pub fn with_line(mut self, line: OrderLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_icd10_codes(mut self, codes: &[&str]) -> Self {
        self.icd10_codes = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn without_doctor(mut self) -> Self {
        self.with_doctor = false;
        self
    }

    /// Builds the order; lines are re-homed onto the order id
    pub fn build(self) -> Order {
        let mut order = Order::new(self.id, self.customer_id);
        for (i, policy) in self.policies.into_iter().enumerate() {
            order = order.with_policy(i + 1, policy);
        }
        order.icd10_codes = self.icd10_codes;
        order.icd9_codes = self.icd9_codes;
        if self.with_doctor {
            order.doctor_id = Some(IdFixtures::DOCTOR);
        }
        let id = order.id;
        self.lines.into_iter().fold(order, |order, mut line| {
            line.order_id = id;
            order.with_line(line)
        })
    }
}

/// An order billed once through the billing engine
pub struct BilledOrder {
    pub order: Order,
    pub book: InvoiceBook,
    pub runs: Vec<BillingRun>,
}

impl BilledOrder {
    /// Runs the billing engine over `order` with an empty book
    pub fn bill(mut order: Order, invoice_date: NaiveDate, actor: UserId) -> Result<Self, BillingError> {
        let mut book = InvoiceBook::new();
        let runs = BillingEngine::new(actor).process_order(&mut order, &mut book, invoice_date)?;
        Ok(Self { order, book, runs })
    }

    /// Bills with the standard invoice date and actor
    pub fn standard(order: Order) -> Result<Self, BillingError> {
        Self::bill(order, TemporalFixtures::invoice_date(), IdFixtures::actor())
    }

    /// Ids of every invoice the runs created
    pub fn invoice_ids(&self) -> Vec<InvoiceId> {
        self.runs.iter().filter_map(|run| run.invoice_id).collect()
    }

    /// First line of the first generated invoice
    pub fn first_line(&self) -> Option<InvoiceLineId> {
        let invoice_id = self.invoice_ids().into_iter().next()?;
        self.book.invoice(invoice_id)?.lines.first().map(|line| line.id)
    }
}

/// Builder for stock ledgers seeded with receipts
pub struct TestLedgerBuilder {
    catalog: TypeCatalog,
    receipts: Vec<(WarehouseId, InventoryItemId, Quantity, Money)>,
    date: NaiveDate,
    actor: UserId,
}

impl Default for TestLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLedgerBuilder {
    /// Creates an empty ledger over the standard transaction types
    pub fn new() -> Self {
        Self {
            catalog: TypeCatalog::standard(),
            receipts: Vec::new(),
            date: TemporalFixtures::service_start(),
            actor: IdFixtures::actor(),
        }
    }

    pub fn with_catalog(mut self, catalog: TypeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Receives `quantity` units of `item` into `warehouse` at `cost` each
    pub fn with_receipt(mut self, warehouse: WarehouseId, item: InventoryItemId, quantity: Quantity, cost: Money) -> Self {
        self.receipts.push((warehouse, item, quantity, cost));
        self
    }

    /// Builds the ledger with every level refreshed
    pub fn build(self) -> InventoryLedger {
        let mut ledger = InventoryLedger::new(self.catalog);
        for (warehouse, item, quantity, cost) in self.receipts {
            let _ = ledger.add_adjustment(
                AdjustmentRequest::new(warehouse, item, RECEIVED, quantity, self.date, self.actor).with_cost(cost),
            );
        }
        let _ = ledger.refresh_all();
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_line_builder_defaults() {
        let line = TestOrderLineBuilder::new().build();
        assert_eq!(line.sale_rent_type, SaleRentType::MonthlyRental);
        assert_eq!(line.billable_price, MoneyFixtures::hundred());
        assert_eq!(line.allowable_price, MoneyFixtures::hundred());
        assert_eq!(line.delivery_date, Some(TemporalFixtures::service_start()));
    }

    #[test]
    fn test_order_line_builder_overrides() {
        let line = TestOrderLineBuilder::new()
            .with_id(9)
            .with_allowable(Money::new(dec!(80)))
            .with_quantity(dec!(2))
            .with_delivery_date(None)
            .build();
        assert_eq!(line.id, OrderLineId::new(9));
        assert_eq!(line.allowable_price, Money::new(dec!(80)));
        assert_eq!(line.billed_quantity, dec!(2));
        assert_eq!(line.delivery_date, None);
    }

    #[test]
    fn test_order_builder_rehomes_lines() {
        let order = TestOrderBuilder::new()
            .with_id(OrderId::new(77))
            .with_insurers(2)
            .with_line(TestOrderLineBuilder::new().build())
            .build();
        assert_eq!(order.lines[0].order_id, OrderId::new(77));
        assert!(order.policies[1].is_some());
        assert!(order.policies[2].is_none());
    }

    #[test]
    fn test_ledger_builder_refreshes_levels() {
        let ledger = TestLedgerBuilder::new()
            .with_receipt(IdFixtures::MAIN_WAREHOUSE, IdFixtures::CONCENTRATOR, 3, Money::new(dec!(400)))
            .build();
        assert_eq!(ledger.on_hand(IdFixtures::MAIN_WAREHOUSE, IdFixtures::CONCENTRATOR), 3);
    }
}
