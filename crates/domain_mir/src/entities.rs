//! Entities that carry their own MIR flags
//!
//! These are the billing-side views of customers, referral sources, payers,
//! and certificates of medical necessity. Each keeps the flag set computed by
//! the last recompute in its `mir` field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{
    CmnFormId, CustomerId, CustomerInsuranceId, DiagnosisScheme, DoctorId, FacilityId, InsuranceCompanyId,
    MirFlags,
};

/// A postal address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    pub fn new(
        address1: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            address1: address1.into(),
            address2: None,
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
        }
    }
}

/// Place of service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub address: Address,
    pub phone: Option<String>,
    pub npi: Option<String>,
    pub mir: MirFlags,
}

impl Facility {
    pub fn new(id: FacilityId, name: impl Into<String>, address: Address) -> Self {
        Self {
            id,
            name: name.into(),
            address,
            phone: None,
            npi: None,
            mir: MirFlags::new(),
        }
    }

    pub fn with_npi(mut self, npi: impl Into<String>) -> Self {
        self.npi = Some(npi.into());
        self
    }
}

/// Ordering physician
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub first_name: String,
    pub last_name: String,
    pub address: Address,
    pub phone: String,
    pub npi: String,
    pub mir: MirFlags,
}

impl Doctor {
    pub fn new(
        id: DoctorId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        address: Address,
        phone: impl Into<String>,
        npi: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            address,
            phone: phone.into(),
            npi: npi.into(),
            mir: MirFlags::new(),
        }
    }
}

/// A payer organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceCompany {
    pub id: InsuranceCompanyId,
    pub name: String,
    pub address: Address,
    /// Electronic claims payer id
    pub payer_id: String,
    pub mir: MirFlags,
}

impl InsuranceCompany {
    pub fn new(id: InsuranceCompanyId, name: impl Into<String>, address: Address, payer_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address,
            payer_id: payer_id.into(),
            mir: MirFlags::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

legacy_names!(Gender, "gender" {
    Male => "Male",
    Female => "Female",
});

/// The patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub account_number: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Address,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub doctor_id: Option<DoctorId>,
    pub facility_id: Option<FacilityId>,
    pub inactive: bool,
    pub mir: MirFlags,
}

impl Customer {
    pub fn new(
        id: CustomerId,
        account_number: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        address: Address,
    ) -> Self {
        Self {
            id,
            account_number: account_number.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            address,
            phone: None,
            date_of_birth: None,
            gender: None,
            doctor_id: None,
            facility_id: None,
            inactive: false,
            mir: MirFlags::new(),
        }
    }

    pub fn with_demographics(mut self, date_of_birth: NaiveDate, gender: Gender) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self.gender = Some(gender);
        self
    }
}

/// Relationship code meaning the patient is the insured
pub const RELATIONSHIP_SELF: &str = "18";

/// A customer's insurance policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPolicy {
    pub id: CustomerInsuranceId,
    pub customer_id: CustomerId,
    pub company_id: Option<InsuranceCompanyId>,
    pub policy_number: String,
    /// Claim relationship code of the patient to the insured
    pub relationship_code: Option<String>,
    pub insured_first_name: String,
    pub insured_last_name: String,
    pub insured_date_of_birth: Option<NaiveDate>,
    pub inactive_date: Option<NaiveDate>,
    pub mir: MirFlags,
}

impl CustomerPolicy {
    /// Creates a policy where the patient is the insured
    pub fn for_self(
        id: CustomerInsuranceId,
        customer_id: CustomerId,
        company_id: InsuranceCompanyId,
        policy_number: impl Into<String>,
    ) -> Self {
        Self {
            id,
            customer_id,
            company_id: Some(company_id),
            policy_number: policy_number.into(),
            relationship_code: Some(RELATIONSHIP_SELF.to_string()),
            insured_first_name: String::new(),
            insured_last_name: String::new(),
            insured_date_of_birth: None,
            inactive_date: None,
            mir: MirFlags::new(),
        }
    }

    pub fn is_self(&self) -> bool {
        self.relationship_code.as_deref().map(str::trim) == Some(RELATIONSHIP_SELF)
    }

    /// Inactive once the inactive date has been reached
    pub fn is_inactive(&self, as_of: NaiveDate) -> bool {
        self.inactive_date.is_some_and(|date| date <= as_of)
    }
}

/// Certificate of medical necessity form revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmnFormType {
    /// CMS-484 home oxygen
    Oxygen,
    /// CMS-846 pneumatic compression device
    PneumaticCompression,
    /// CMS-847 osteogenesis stimulator
    Osteogenesis,
    /// CMS-848 TENS
    Tens,
    /// CMS-849 seat lift mechanism
    SeatLift,
    /// CMS-10125 external infusion pump
    ExternalInfusion,
    /// CMS-10126 enteral and parenteral nutrition
    EnteralParenteral,
}

legacy_names!(CmnFormType, "CMN form type" {
    Oxygen => "DME 484.03",
    PneumaticCompression => "DME 04.04B",
    Osteogenesis => "DME 04.04C",
    Tens => "DME 06.03B",
    SeatLift => "DME 07.03A",
    ExternalInfusion => "DME 09.03",
    EnteralParenteral => "DME 10.03",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmnKind {
    Initial,
    Revised,
    Recertification,
}

legacy_names!(CmnKind, "CMN type" {
    Initial => "Initial",
    Revised => "Revised",
    Recertification => "Recertification",
});

/// Length of need that never expires
pub const LIFETIME_LENGTH_OF_NEED: u32 = 99;

/// A certificate of medical necessity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmnForm {
    pub id: CmnFormId,
    pub customer_id: CustomerId,
    pub doctor_id: Option<DoctorId>,
    pub form_type: CmnFormType,
    pub kind: CmnKind,
    pub initial_date: Option<NaiveDate>,
    pub revised_date: Option<NaiveDate>,
    pub recertification_date: Option<NaiveDate>,
    /// Months; 99 means lifetime
    pub estimated_length_of_need: Option<u32>,
    pub signature_name: String,
    pub signature_date: Option<NaiveDate>,
    /// Answers keyed by question label ("1a", "2", ...)
    pub answers: BTreeMap<String, String>,
    pub mir: MirFlags,
}

impl CmnForm {
    pub fn new(id: CmnFormId, customer_id: CustomerId, form_type: CmnFormType, initial_date: NaiveDate) -> Self {
        Self {
            id,
            customer_id,
            doctor_id: None,
            form_type,
            kind: CmnKind::Initial,
            initial_date: Some(initial_date),
            revised_date: None,
            recertification_date: None,
            estimated_length_of_need: None,
            signature_name: String::new(),
            signature_date: None,
            answers: BTreeMap::new(),
            mir: MirFlags::new(),
        }
    }

    pub fn with_signature(mut self, name: impl Into<String>, date: NaiveDate) -> Self {
        self.signature_name = name.into();
        self.signature_date = Some(date);
        self
    }

    pub fn with_length_of_need(mut self, months: u32) -> Self {
        self.estimated_length_of_need = Some(months);
        self
    }

    pub fn with_answer(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers.insert(question.into(), answer.into());
        self
    }

    /// Non-blank answer to `question`
    pub fn answer(&self, question: &str) -> Option<&str> {
        self.answers
            .get(question)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
    }
}

/// A diagnosis code with its validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisCode {
    pub code: String,
    pub active_date: Option<NaiveDate>,
    pub inactive_date: Option<NaiveDate>,
}

impl DiagnosisCode {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.active_date.map_or(true, |from| from <= date) && self.inactive_date.map_or(true, |to| date < to)
    }
}

/// ICD-9 and ICD-10 code tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosisCatalog {
    icd9: BTreeMap<String, DiagnosisCode>,
    icd10: BTreeMap<String, DiagnosisCode>,
}

impl DiagnosisCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scheme: DiagnosisScheme, code: DiagnosisCode) {
        let table = match scheme {
            DiagnosisScheme::Icd9 => &mut self.icd9,
            DiagnosisScheme::Icd10 => &mut self.icd10,
        };
        table.insert(code.code.trim().to_uppercase(), code);
    }

    /// Adds a code with no validity window
    pub fn with_code(mut self, scheme: DiagnosisScheme, code: impl Into<String>) -> Self {
        self.insert(
            scheme,
            DiagnosisCode {
                code: code.into(),
                active_date: None,
                inactive_date: None,
            },
        );
        self
    }

    pub fn get(&self, scheme: DiagnosisScheme, code: &str) -> Option<&DiagnosisCode> {
        let table = match scheme {
            DiagnosisScheme::Icd9 => &self.icd9,
            DiagnosisScheme::Icd10 => &self.icd10,
        };
        table.get(&code.trim().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_policy_inactive_on_its_date() {
        let mut policy = CustomerPolicy::for_self(
            CustomerInsuranceId::new(1),
            CustomerId::new(1),
            InsuranceCompanyId::new(1),
            "A1",
        );
        policy.inactive_date = Some(d(2024, 3, 1));
        assert!(!policy.is_inactive(d(2024, 2, 29)));
        assert!(policy.is_inactive(d(2024, 3, 1)));
        assert!(policy.is_self());
    }

    #[test]
    fn test_diagnosis_window() {
        let code = DiagnosisCode {
            code: "250.00".to_string(),
            active_date: Some(d(2000, 1, 1)),
            inactive_date: Some(d(2015, 10, 1)),
        };
        assert!(code.is_active_on(d(2015, 9, 30)));
        assert!(!code.is_active_on(d(2015, 10, 1)));
        assert!(!code.is_active_on(d(1999, 12, 31)));
    }

    #[test]
    fn test_catalog_lookup_normalizes_case() {
        let catalog = DiagnosisCatalog::new().with_code(DiagnosisScheme::Icd10, "j44.9");
        assert!(catalog.get(DiagnosisScheme::Icd10, " J44.9").is_some());
        assert!(catalog.get(DiagnosisScheme::Icd9, "J44.9").is_none());
    }

    #[test]
    fn test_form_type_legacy_names() {
        assert_eq!("DME 484.03".parse::<CmnFormType>().unwrap(), CmnFormType::Oxygen);
        assert!("DMERC 01.02A".parse::<CmnFormType>().is_err());
    }
}
