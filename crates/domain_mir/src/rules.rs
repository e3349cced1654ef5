//! MIR rules
//!
//! Each entity kind has one rule function that computes its full flag set
//! from the entity and whatever it references. Rules never mutate; the
//! validator decides what gets written back.
//!
//! # Rule Sets
//!
//! ## Demographics
//! - Names, street address and city must be present
//! - State is a two-letter code, zip is 5 or 9 digits, phone is 10 digits
//! - NPI is 10 digits with a valid check digit
//!
//! ## Insurance Policies
//! - Company must exist and be complete
//! - Unless the patient is the insured (relationship 18), the insured's name
//!   and date of birth are required
//!
//! ## CMN Forms
//! - Dates, length of need, and signature are required
//! - Each form type has its own set of required answers
//!
//! ## Orders
//! - Header: customer, doctor, facility, and ranked payer slots
//! - Lines: pricing and quantities, authorization, CMN coverage, diagnosis
//!   codes valid on the date of service, and DX pointers

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

use core_kernel::temporal::add_months;
use core_kernel::{DiagnosisScheme, MirFlags, MirReason};
use domain_billing::{Order, OrderLine};

use crate::entities::{
    Address, CmnForm, CmnFormType, CmnKind, Customer, CustomerPolicy, Doctor, Facility, InsuranceCompany,
    LIFETIME_LENGTH_OF_NEED,
};
use crate::validator::MirStore;

/// Most diagnosis codes a line may point at
pub const MAX_DX_POINTERS: usize = 4;

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn digits_only(value: &str, allowed: &[char]) -> Option<String> {
    let mut digits = String::new();
    for c in value.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !allowed.contains(&c) {
            return None;
        }
    }
    Some(digits)
}

/// Five-digit zip or zip+4, with or without the dash
pub fn is_valid_zip(zip: &str) -> bool {
    match digits_only(zip, &['-']) {
        Some(digits) => {
            let dashes = zip.matches('-').count();
            match digits.len() {
                5 => dashes == 0,
                9 => dashes == 0 || (dashes == 1 && zip.trim().find('-') == Some(5)),
                _ => false,
            }
        }
        None => false,
    }
}

/// Two-letter state code
pub fn is_valid_state(state: &str) -> bool {
    let state = state.trim();
    state.len() == 2 && state.chars().all(|c| c.is_ascii_uppercase())
}

/// Ten-digit phone number; common punctuation is ignored
pub fn is_valid_phone(phone: &str) -> bool {
    digits_only(phone, &[' ', '(', ')', '-', '.']).is_some_and(|d| d.len() == 10)
}

/// National Provider Identifier check
///
/// Ten digits whose last digit is the Luhn check digit computed over the
/// card-issuer prefix 80840 followed by the first nine digits.
pub fn is_valid_npi(npi: &str) -> bool {
    let npi = npi.trim();
    if npi.len() != 10 || !npi.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = "80840"
        .chars()
        .chain(npi.chars())
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, digit)| {
            if i % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();
    sum % 10 == 0
}

/// Last day a CMN covers, `None` for lifetime or incomplete forms
pub fn cmn_expiration(form: &CmnForm) -> Option<NaiveDate> {
    let months = form.estimated_length_of_need?;
    if months >= LIFETIME_LENGTH_OF_NEED {
        return None;
    }
    form.initial_date.map(|initial| add_months(initial, months))
}

/// Answers every form of a type must carry
pub fn required_answers(form_type: CmnFormType) -> &'static [&'static str] {
    match form_type {
        CmnFormType::Oxygen => &["1c", "2", "3", "4", "5"],
        CmnFormType::PneumaticCompression => &["1", "2", "3", "4", "5", "6"],
        CmnFormType::Osteogenesis => &["1", "2", "3", "4", "5", "6"],
        CmnFormType::Tens => &["1", "2", "3", "4", "5"],
        CmnFormType::SeatLift => &["1", "2", "3", "4", "5"],
        CmnFormType::ExternalInfusion => &["1", "2", "3", "4"],
        CmnFormType::EnteralParenteral => &["1", "2", "3", "4", "5", "6"],
    }
}

/// Oxygen flow above which the second test result is required
const OXYGEN_HIGH_FLOW_LPM: Decimal = dec!(4);

/// Parses a DX pointer list ("1,3") into positions
///
/// Returns `None` when the list is empty, has more than four entries, repeats
/// an entry, or contains something that is not a position in `1..=max`.
pub fn parse_dx_pointer(pointer: &str, max: u8) -> Option<Vec<u8>> {
    let mut seen = BTreeSet::new();
    let mut positions = Vec::new();
    for part in pointer.split(',').map(str::trim) {
        let position: u8 = part.parse().ok()?;
        if position == 0 || position > max || !seen.insert(position) {
            return None;
        }
        positions.push(position);
    }
    if positions.is_empty() || positions.len() > MAX_DX_POINTERS {
        return None;
    }
    Some(positions)
}

/// Rule functions for every entity kind that carries MIR flags
pub struct MirRules;

impl MirRules {
    /// Flags for a facility
    pub fn facility(facility: &Facility) -> MirFlags {
        let mut flags = MirFlags::new();
        flags.require(blank(&facility.name), MirReason::Name);
        Self::check_address(&facility.address, &mut flags);
        if let Some(ref phone) = facility.phone {
            flags.require(!is_valid_phone(phone), MirReason::Phone);
        }
        if let Some(ref npi) = facility.npi {
            flags.require(!is_valid_npi(npi), MirReason::Npi);
        }
        flags
    }

    /// Flags for a doctor
    pub fn doctor(doctor: &Doctor) -> MirFlags {
        let mut flags = MirFlags::new();
        flags.require(blank(&doctor.first_name), MirReason::FirstName);
        flags.require(blank(&doctor.last_name), MirReason::LastName);
        Self::check_address(&doctor.address, &mut flags);
        flags.require(!is_valid_phone(&doctor.phone), MirReason::Phone);
        flags.require(!is_valid_npi(&doctor.npi), MirReason::Npi);
        flags
    }

    /// Flags for an insurance company
    pub fn insurance_company(company: &InsuranceCompany) -> MirFlags {
        let mut flags = MirFlags::new();
        flags.require(blank(&company.name), MirReason::Name);
        Self::check_address(&company.address, &mut flags);
        flags.require(blank(&company.payer_id), MirReason::PayerId);
        flags
    }

    /// Flags for a customer's own demographics
    pub fn customer(customer: &Customer) -> MirFlags {
        let mut flags = MirFlags::new();
        flags.require(blank(&customer.account_number), MirReason::AccountNumber);
        flags.require(blank(&customer.first_name), MirReason::FirstName);
        flags.require(blank(&customer.last_name), MirReason::LastName);
        Self::check_address(&customer.address, &mut flags);
        if let Some(ref phone) = customer.phone {
            flags.require(!is_valid_phone(phone), MirReason::Phone);
        }
        flags.require(customer.date_of_birth.is_none(), MirReason::DateOfBirth);
        flags.require(customer.gender.is_none(), MirReason::Gender);
        flags
    }

    /// Flags for an insurance policy as of `as_of`
    ///
    /// # Arguments
    ///
    /// * `policy` - The policy to check
    /// * `company` - The policy's insurance company, if it exists
    /// * `as_of` - Date the inactive check is made against
    pub fn policy(policy: &CustomerPolicy, company: Option<&InsuranceCompany>, as_of: NaiveDate) -> MirFlags {
        let mut flags = MirFlags::new();
        match company {
            None => flags.insert(MirReason::InsuranceCompany),
            Some(company) => flags.require(!company.mir.is_empty(), MirReason::InsuranceCompanyMir),
        }
        flags.require(blank(&policy.policy_number), MirReason::PolicyNumber);

        match policy.relationship_code.as_deref().map(str::trim) {
            None | Some("") => flags.insert(MirReason::RelationshipCode),
            Some(_) if policy.is_self() => {}
            Some(_) => {
                flags.require(
                    blank(&policy.insured_first_name) || blank(&policy.insured_last_name),
                    MirReason::InsuredName,
                );
                flags.require(policy.insured_date_of_birth.is_none(), MirReason::InsuredDateOfBirth);
            }
        }

        flags.require(policy.is_inactive(as_of), MirReason::PolicyInactive);
        flags
    }

    /// Flags for a CMN form
    pub fn cmn_form(form: &CmnForm, store: &MirStore) -> MirFlags {
        let mut flags = MirFlags::new();
        flags.require(!store.customers.contains_key(&form.customer_id), MirReason::Customer);
        match form.doctor_id.and_then(|id| store.doctors.get(&id)) {
            None => flags.insert(MirReason::Doctor),
            Some(doctor) => flags.require(!doctor.mir.is_empty(), MirReason::DoctorMir),
        }

        flags.require(form.initial_date.is_none(), MirReason::InitialDate);
        match form.kind {
            CmnKind::Initial => {}
            CmnKind::Revised => flags.require(form.revised_date.is_none(), MirReason::RevisedDate),
            CmnKind::Recertification => {
                flags.require(form.recertification_date.is_none(), MirReason::RecertificationDate)
            }
        }
        flags.require(
            !form
                .estimated_length_of_need
                .is_some_and(|months| (1..=LIFETIME_LENGTH_OF_NEED).contains(&months)),
            MirReason::EstimatedLengthOfNeed,
        );
        flags.require(blank(&form.signature_name), MirReason::SignatureName);
        flags.require(form.signature_date.is_none(), MirReason::SignatureDate);

        Self::check_answers(form, &mut flags);
        flags
    }

    /// Flags for an order header
    pub fn order_header(order: &Order, store: &MirStore) -> MirFlags {
        let mut flags = MirFlags::new();

        match store.customers.get(&order.customer_id) {
            None => flags.insert(MirReason::Customer),
            Some(customer) => {
                flags.require(customer.inactive, MirReason::CustomerInactive);
                flags.require(!customer.mir.is_empty(), MirReason::CustomerMir);
            }
        }

        match order.doctor_id.and_then(|id| store.doctors.get(&id)) {
            None => flags.insert(MirReason::Doctor),
            Some(doctor) => flags.require(!doctor.mir.is_empty(), MirReason::DoctorMir),
        }

        if let Some(facility_id) = order.facility_id {
            let incomplete = store
                .facilities
                .get(&facility_id)
                .map_or(true, |facility| !facility.mir.is_empty());
            flags.require(incomplete, MirReason::FacilityMir);
        }

        for (index, slot) in order.policies.iter().enumerate() {
            let number = index as u8 + 1;
            match slot {
                None => {
                    let gap = order.policies[index + 1..].iter().any(Option::is_some);
                    flags.require(gap, MirReason::PolicyRequired(number));
                }
                Some(payer) => match store.policies.get(&payer.policy_id) {
                    None => flags.insert(MirReason::PolicyRequired(number)),
                    Some(policy) => flags.require(!policy.mir.is_empty(), MirReason::PolicyMir(number)),
                },
            }
        }
        flags
    }

    /// Flags for one order line, including the header's findings
    pub fn order_line(order: &Order, line: &OrderLine, header: &MirFlags, store: &MirStore) -> MirFlags {
        let mut flags = header.clone();

        flags.require(blank(&line.billing_code), MirReason::BillingCode);
        flags.require(line.inventory_item_id.is_none(), MirReason::InventoryItem);
        flags.require(blank(&line.price_code), MirReason::PriceCode);
        flags.require(line.ordered_quantity <= Decimal::ZERO, MirReason::OrderedQuantity);
        flags.require(line.billed_quantity <= Decimal::ZERO, MirReason::BilledQuantity);
        flags.require(line.billable_price.is_negative(), MirReason::BillablePrice);
        flags.require(line.allowable_price.is_negative(), MirReason::AllowablePrice);
        flags.require(
            line.delivery_date.is_some_and(|delivered| line.dos.start < delivered),
            MirReason::DosFrom,
        );

        Self::check_authorization(line, &mut flags);
        Self::check_cmn(line, store, &mut flags);
        Self::check_diagnoses(order, line, store, &mut flags);
        flags
    }

    /// Street, city, state and zip
    fn check_address(address: &Address, flags: &mut MirFlags) {
        flags.require(blank(&address.address1), MirReason::Address1);
        flags.require(blank(&address.city), MirReason::City);
        flags.require(!is_valid_state(&address.state), MirReason::State);
        flags.require(!is_valid_zip(&address.zip), MirReason::Zip);
    }

    fn check_answers(form: &CmnForm, flags: &mut MirFlags) {
        for question in required_answers(form.form_type) {
            flags.require(form.answer(question).is_none(), MirReason::Answer(question.to_string()));
        }

        if form.form_type == CmnFormType::Oxygen {
            // Either the blood gas or the saturation result
            let tested = form.answer("1a").is_some() || form.answer("1b").is_some();
            flags.require(!tested, MirReason::Answer("1a".to_string()));

            let high_flow = form
                .answer("5")
                .and_then(|lpm| lpm.parse::<Decimal>().ok())
                .is_some_and(|lpm| lpm > OXYGEN_HIGH_FLOW_LPM);
            if high_flow {
                let retested = form.answer("7a").is_some() || form.answer("7b").is_some();
                flags.require(!retested, MirReason::Answer("7a".to_string()));
                flags.require(form.answer("7c").is_none(), MirReason::Answer("7c".to_string()));
            }
        }
    }

    fn check_authorization(line: &OrderLine, flags: &mut MirFlags) {
        let number = line.authorization_number.as_deref().filter(|n| !blank(n));
        match (number, line.authorization_expiration) {
            (None, Some(_)) => flags.insert(MirReason::AuthorizationNumber),
            (Some(_), Some(expires)) => flags.require(expires < line.dos.start, MirReason::AuthorizationExpired),
            _ => {}
        }
    }

    fn check_cmn(line: &OrderLine, store: &MirStore, flags: &mut MirFlags) {
        if !store.requires_cmn(&line.billing_code) {
            return;
        }
        match line.cmn_form_id.and_then(|id| store.cmn_forms.get(&id)) {
            None => flags.insert(MirReason::CmnRequired),
            Some(form) => {
                flags.require(!form.mir.is_empty(), MirReason::CmnMir);
                flags.require(
                    cmn_expiration(form).is_some_and(|expires| expires < line.dos.start),
                    MirReason::CmnExpired,
                );
            }
        }
    }

    fn check_diagnoses(order: &Order, line: &OrderLine, store: &MirStore, flags: &mut MirFlags) {
        let scheme = DiagnosisScheme::for_service_date(line.dos.start);
        let codes = match scheme {
            DiagnosisScheme::Icd9 => &order.icd9_codes,
            DiagnosisScheme::Icd10 => &order.icd10_codes,
        };

        let present: Vec<(u8, &str)> = codes
            .iter()
            .enumerate()
            .map(|(i, code)| (i as u8 + 1, code.trim()))
            .filter(|(_, code)| !code.is_empty())
            .collect();
        if present.is_empty() {
            flags.insert(MirReason::IcdRequired(scheme));
        }
        for (position, code) in &present {
            match store.diagnoses.get(scheme, code) {
                None => flags.insert(MirReason::IcdUnknown(scheme, *position)),
                Some(entry) => {
                    flags.require(!entry.is_active_on(line.dos.start), MirReason::IcdInactive(scheme, *position))
                }
            }
        }

        let (max, reason) = match scheme {
            DiagnosisScheme::Icd9 => (4, MirReason::DxPointer),
            DiagnosisScheme::Icd10 => (12, MirReason::DxPointer10),
        };
        let valid = parse_dx_pointer(&line.dx_pointer, max).is_some_and(|positions| {
            positions
                .iter()
                .all(|p| present.iter().any(|(position, _)| position == p))
        });
        flags.require(!valid, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_formats() {
        assert!(is_valid_zip("10001"));
        assert!(is_valid_zip("100011234"));
        assert!(is_valid_zip("10001-1234"));
        assert!(!is_valid_zip("1000"));
        assert!(!is_valid_zip("1000-11234"));
        assert!(!is_valid_zip("ABCDE"));
    }

    #[test]
    fn test_state_and_phone() {
        assert!(is_valid_state("NY"));
        assert!(!is_valid_state("ny"));
        assert!(!is_valid_state("NYC"));
        assert!(is_valid_phone("(212) 555-0100"));
        assert!(is_valid_phone("212.555.0100"));
        assert!(!is_valid_phone("555-0100"));
        assert!(!is_valid_phone("212-555-010X"));
    }

    #[test]
    fn test_npi_check_digit() {
        assert!(is_valid_npi("1234567893"));
        assert!(is_valid_npi("1245319599"));
        assert!(!is_valid_npi("1234567890"));
        assert!(!is_valid_npi("123456789"));
    }

    #[test]
    fn test_dx_pointer_parsing() {
        assert_eq!(parse_dx_pointer("1, 3", 4), Some(vec![1, 3]));
        assert_eq!(parse_dx_pointer("12", 12), Some(vec![12]));
        assert_eq!(parse_dx_pointer("5", 4), None);
        assert_eq!(parse_dx_pointer("1,1", 4), None);
        assert_eq!(parse_dx_pointer("1,2,3,4,5", 12), None);
        assert_eq!(parse_dx_pointer("", 4), None);
        assert_eq!(parse_dx_pointer("A", 4), None);
    }

    #[test]
    fn test_cmn_expiration() {
        let initial = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let form = CmnForm::new(
            core_kernel::CmnFormId::new(1),
            core_kernel::CustomerId::new(1),
            CmnFormType::Tens,
            initial,
        );
        assert_eq!(cmn_expiration(&form), None);
        assert_eq!(
            cmn_expiration(&form.clone().with_length_of_need(12)),
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        assert_eq!(cmn_expiration(&form.with_length_of_need(99)), None);
    }
}
