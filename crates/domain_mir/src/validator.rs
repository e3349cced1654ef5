//! Re-entrant MIR recomputation
//!
//! `MirValidator` recomputes flags over a `MirStore` either for every row of
//! a kind (`None`) or for one row (`Some(id)`). Dependencies are propagated
//! through the stored flags, so a full refresh runs in dependency order:
//! facilities, doctors and insurance companies first, then customers and
//! policies, then CMN forms, then orders.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use core_kernel::{
    CmnFormId, CustomerId, CustomerInsuranceId, DoctorId, FacilityId, InsuranceCompanyId, MirFlags, OrderId,
};
use domain_billing::Order;

use crate::entities::{
    CmnForm, Customer, CustomerPolicy, DiagnosisCatalog, Doctor, Facility, InsuranceCompany,
};
use crate::error::MirError;
use crate::rules::MirRules;

/// The reference data MIR rules read
#[derive(Debug, Clone, Default)]
pub struct MirStore {
    pub facilities: BTreeMap<FacilityId, Facility>,
    pub doctors: BTreeMap<DoctorId, Doctor>,
    pub insurance_companies: BTreeMap<InsuranceCompanyId, InsuranceCompany>,
    pub customers: BTreeMap<CustomerId, Customer>,
    pub policies: BTreeMap<CustomerInsuranceId, CustomerPolicy>,
    pub cmn_forms: BTreeMap<CmnFormId, CmnForm>,
    pub diagnoses: DiagnosisCatalog,
    /// Billing codes that cannot be billed without a CMN
    pub cmn_billing_codes: BTreeSet<String>,
}

impl MirStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facility(mut self, facility: Facility) -> Self {
        self.facilities.insert(facility.id, facility);
        self
    }

    pub fn with_doctor(mut self, doctor: Doctor) -> Self {
        self.doctors.insert(doctor.id, doctor);
        self
    }

    pub fn with_insurance_company(mut self, company: InsuranceCompany) -> Self {
        self.insurance_companies.insert(company.id, company);
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customers.insert(customer.id, customer);
        self
    }

    pub fn with_policy(mut self, policy: CustomerPolicy) -> Self {
        self.policies.insert(policy.id, policy);
        self
    }

    pub fn with_cmn_form(mut self, form: CmnForm) -> Self {
        self.cmn_forms.insert(form.id, form);
        self
    }

    pub fn with_diagnoses(mut self, diagnoses: DiagnosisCatalog) -> Self {
        self.diagnoses = diagnoses;
        self
    }

    pub fn with_cmn_billing_code(mut self, code: impl Into<String>) -> Self {
        self.cmn_billing_codes.insert(code.into().trim().to_uppercase());
        self
    }

    pub fn requires_cmn(&self, billing_code: &str) -> bool {
        self.cmn_billing_codes.contains(&billing_code.trim().to_uppercase())
    }
}

/// Rows whose flags changed in a full refresh, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirRefresh {
    pub facilities: usize,
    pub doctors: usize,
    pub insurance_companies: usize,
    pub customers: usize,
    pub policies: usize,
    pub cmn_forms: usize,
    pub orders: usize,
}

impl MirRefresh {
    pub fn total(&self) -> usize {
        self.facilities
            + self.doctors
            + self.insurance_companies
            + self.customers
            + self.policies
            + self.cmn_forms
            + self.orders
    }
}

fn store_flags(slot: &mut MirFlags, flags: MirFlags) -> bool {
    if *slot == flags {
        false
    } else {
        *slot = flags;
        true
    }
}

/// Recomputes and writes back MIR flags
#[derive(Debug, Clone, Copy)]
pub struct MirValidator {
    as_of: NaiveDate,
}

impl MirValidator {
    /// Creates a validator that judges policy activity as of `as_of`
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Recomputes facility flags
    ///
    /// # Returns
    ///
    /// The number of facilities whose flags changed
    ///
    /// # Errors
    ///
    /// `MirError::EntityNotFound` when `id` names a missing facility
    pub fn update_facilities(&self, store: &mut MirStore, id: Option<FacilityId>) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !store.facilities.contains_key(&id) {
                return Err(MirError::not_found("Facility", id));
            }
        }
        let mut changed = 0;
        for facility in store.facilities.values_mut().filter(|f| id.map_or(true, |id| f.id == id)) {
            let flags = MirRules::facility(facility);
            if store_flags(&mut facility.mir, flags) {
                changed += 1;
            }
        }
        debug!(changed, "Facility MIR recomputed");
        Ok(changed)
    }

    /// Recomputes doctor flags
    pub fn update_doctors(&self, store: &mut MirStore, id: Option<DoctorId>) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !store.doctors.contains_key(&id) {
                return Err(MirError::not_found("Doctor", id));
            }
        }
        let mut changed = 0;
        for doctor in store.doctors.values_mut().filter(|d| id.map_or(true, |id| d.id == id)) {
            let flags = MirRules::doctor(doctor);
            if store_flags(&mut doctor.mir, flags) {
                changed += 1;
            }
        }
        debug!(changed, "Doctor MIR recomputed");
        Ok(changed)
    }

    /// Recomputes insurance company flags
    pub fn update_insurance_companies(
        &self,
        store: &mut MirStore,
        id: Option<InsuranceCompanyId>,
    ) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !store.insurance_companies.contains_key(&id) {
                return Err(MirError::not_found("Insurance company", id));
            }
        }
        let mut changed = 0;
        for company in store
            .insurance_companies
            .values_mut()
            .filter(|c| id.map_or(true, |id| c.id == id))
        {
            let flags = MirRules::insurance_company(company);
            if store_flags(&mut company.mir, flags) {
                changed += 1;
            }
        }
        debug!(changed, "Insurance company MIR recomputed");
        Ok(changed)
    }

    /// Recomputes customer flags
    pub fn update_customers(&self, store: &mut MirStore, id: Option<CustomerId>) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !store.customers.contains_key(&id) {
                return Err(MirError::not_found("Customer", id));
            }
        }
        let mut changed = 0;
        for customer in store.customers.values_mut().filter(|c| id.map_or(true, |id| c.id == id)) {
            let flags = MirRules::customer(customer);
            if store_flags(&mut customer.mir, flags) {
                changed += 1;
            }
        }
        debug!(changed, "Customer MIR recomputed");
        Ok(changed)
    }

    /// Recomputes insurance policy flags from the stored company flags
    pub fn update_policies(&self, store: &mut MirStore, id: Option<CustomerInsuranceId>) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !store.policies.contains_key(&id) {
                return Err(MirError::not_found("Customer insurance", id));
            }
        }
        let companies = &store.insurance_companies;
        let mut changed = 0;
        for policy in store.policies.values_mut().filter(|p| id.map_or(true, |id| p.id == id)) {
            let company = policy.company_id.and_then(|c| companies.get(&c));
            let flags = MirRules::policy(policy, company, self.as_of);
            if store_flags(&mut policy.mir, flags) {
                changed += 1;
            }
        }
        debug!(changed, "Policy MIR recomputed");
        Ok(changed)
    }

    /// Recomputes CMN form flags
    pub fn update_cmn_forms(&self, store: &mut MirStore, id: Option<CmnFormId>) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !store.cmn_forms.contains_key(&id) {
                return Err(MirError::not_found("CMN form", id));
            }
        }
        let snapshot: &MirStore = store;
        let computed: Vec<(CmnFormId, MirFlags)> = snapshot
            .cmn_forms
            .values()
            .filter(|f| id.map_or(true, |id| f.id == id))
            .map(|form| (form.id, MirRules::cmn_form(form, snapshot)))
            .collect();

        let mut changed = 0;
        for (form_id, flags) in computed {
            if let Some(form) = store.cmn_forms.get_mut(&form_id) {
                if store_flags(&mut form.mir, flags) {
                    changed += 1;
                }
            }
        }
        debug!(changed, "CMN form MIR recomputed");
        Ok(changed)
    }

    /// Recomputes order and order line flags
    ///
    /// Every line gets the header's findings plus its own; the order's flags
    /// are the header's plus those of its active lines. With `Some(id)` only
    /// that order and its lines are touched.
    pub fn update_orders(&self, store: &MirStore, orders: &mut [Order], id: Option<OrderId>) -> Result<usize, MirError> {
        if let Some(id) = id {
            if !orders.iter().any(|o| o.id == id) {
                return Err(MirError::not_found("Order", id));
            }
        }
        let mut changed = 0;
        for order in orders.iter_mut().filter(|o| id.map_or(true, |id| o.id == id)) {
            if Self::recompute_order(order, store) {
                changed += 1;
            }
        }
        debug!(changed, "Order MIR recomputed");
        Ok(changed)
    }

    fn recompute_order(order: &mut Order, store: &MirStore) -> bool {
        let header = MirRules::order_header(order, store);
        let line_flags: Vec<MirFlags> = order
            .lines
            .iter()
            .map(|line| MirRules::order_line(order, line, &header, store))
            .collect();

        let mut order_flags = header;
        let mut changed = false;
        for (line, flags) in order.lines.iter_mut().zip(line_flags) {
            if line.is_active() {
                order_flags.extend(&flags);
            }
            changed |= store_flags(&mut line.mir, flags);
        }
        changed |= store_flags(&mut order.mir, order_flags);
        changed
    }

    /// Recomputes every kind in dependency order
    pub fn update_all(&self, store: &mut MirStore, orders: &mut [Order]) -> Result<MirRefresh, MirError> {
        let refresh = MirRefresh {
            facilities: self.update_facilities(store, None)?,
            doctors: self.update_doctors(store, None)?,
            insurance_companies: self.update_insurance_companies(store, None)?,
            customers: self.update_customers(store, None)?,
            policies: self.update_policies(store, None)?,
            cmn_forms: self.update_cmn_forms(store, None)?,
            orders: self.update_orders(store, orders, None)?,
        };
        info!(changed = refresh.total(), as_of = %self.as_of, "MIR refresh completed");
        Ok(refresh)
    }
}
