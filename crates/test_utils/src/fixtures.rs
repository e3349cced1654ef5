//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the billing, inventory and MIR
//! domains. These fixtures are consistent and predictable so tests can
//! compare against literal values.

use chrono::{NaiveDate, NaiveDateTime};
use core_kernel::{
    CustomerId, CustomerInsuranceId, DiagnosisScheme, DoctorId, InsuranceCompanyId, InventoryItemId, Money,
    OrderId, UserId, WarehouseId,
};
use domain_billing::PayerPolicy;
use domain_mir::{
    Address, Customer, CustomerPolicy, DiagnosisCatalog, Doctor, Gender, InsuranceCompany, MirStore,
};
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// A round amount for simple balance checks
    pub fn hundred() -> Money {
        Money::new(dec!(100.00))
    }

    /// Typical monthly rental allowable for an oxygen concentrator
    pub fn concentrator_rental() -> Money {
        Money::new(dec!(183.75))
    }

    /// Purchase price of a hospital bed
    pub fn bed_sale() -> Money {
        Money::new(dec!(1250.00))
    }

    /// Amount small enough to count as a settled balance
    pub fn below_cent() -> Money {
        Money::new(dec!(0.004))
    }

    pub fn zero() -> Money {
        Money::ZERO
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// First date of service of the standard order (Jan 1, 2024)
    pub fn service_start() -> NaiveDate {
        date(2024, 1, 1)
    }

    /// Date stamped on invoices generated by the standard run
    pub fn invoice_date() -> NaiveDate {
        date(2024, 1, 5)
    }

    /// Date remittances are posted
    pub fn payment_date() -> NaiveDate {
        date(2024, 2, 14)
    }

    /// A service date before the ICD-10 cutover
    pub fn icd9_era() -> NaiveDate {
        date(2015, 6, 1)
    }

    /// A delivery before the 2006 rental rules took effect
    pub fn pre_2006_delivery() -> NaiveDate {
        date(2005, 11, 15)
    }

    /// A timestamp on the service start date
    pub fn at(hour: u32) -> NaiveDateTime {
        Self::service_start()
            .and_hms_opt(hour, 0, 0)
            .unwrap_or_default()
    }
}

/// Builds a date, panicking on an invalid one
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| panic!("invalid date {year}-{month}-{day}"))
}

/// Fixture for identifiers shared by the standard scenario
pub struct IdFixtures;

impl IdFixtures {
    pub const CUSTOMER: CustomerId = CustomerId::new(1001);
    pub const ORDER: OrderId = OrderId::new(2001);
    pub const DOCTOR: DoctorId = DoctorId::new(301);
    pub const MAIN_WAREHOUSE: WarehouseId = WarehouseId::new(1);
    pub const BRANCH_WAREHOUSE: WarehouseId = WarehouseId::new(2);
    pub const CONCENTRATOR: InventoryItemId = InventoryItemId::new(50);
    pub const WHEELCHAIR: InventoryItemId = InventoryItemId::new(51);

    /// User recorded on fixture transactions
    pub fn actor() -> UserId {
        UserId::new(7)
    }
}

/// Fixture for payer policies
pub struct PayerFixtures;

impl PayerFixtures {
    /// Policy for insurer slot `n` (1-based); ids are derived from the slot
    pub fn policy(n: i64) -> PayerPolicy {
        PayerPolicy {
            policy_id: CustomerInsuranceId::new(n * 10),
            company_id: InsuranceCompanyId::new(n * 100),
        }
    }

    pub fn medicare() -> PayerPolicy {
        Self::policy(1)
    }
}

/// Fixture for MIR reference data
pub struct MirFixtures;

impl MirFixtures {
    pub fn office() -> Address {
        Address::new("12 State St", "Albany", "NY", "12207-1234")
    }

    pub fn doctor() -> Doctor {
        Doctor::new(IdFixtures::DOCTOR, "Ann", "Lee", Self::office(), "(518) 555-0100", "1234567893")
    }

    pub fn customer() -> Customer {
        Customer::new(IdFixtures::CUSTOMER, "A-1001", "Sam", "Ortiz", Self::office())
            .with_demographics(date(1950, 4, 2), Gender::Male)
    }

    /// The insurer behind [`PayerFixtures::medicare`]
    pub fn medicare_company() -> InsuranceCompany {
        InsuranceCompany::new(PayerFixtures::medicare().company_id, "Medicare", Self::office(), "MCR01")
    }

    pub fn medicare_policy() -> CustomerPolicy {
        let payer = PayerFixtures::medicare();
        CustomerPolicy::for_self(payer.policy_id, IdFixtures::CUSTOMER, payer.company_id, "1EG4TE5MK72")
    }

    pub fn diagnoses() -> DiagnosisCatalog {
        DiagnosisCatalog::new()
            .with_code(DiagnosisScheme::Icd10, "J44.9")
            .with_code(DiagnosisScheme::Icd10, "R06.02")
            .with_code(DiagnosisScheme::Icd9, "496")
    }

    /// Reference data with every record an order of the standard customer
    /// needs to pass validation
    pub fn complete_store() -> MirStore {
        MirStore::new()
            .with_doctor(Self::doctor())
            .with_customer(Self::customer())
            .with_insurance_company(Self::medicare_company())
            .with_policy(Self::medicare_policy())
            .with_diagnoses(Self::diagnoses())
    }
}
