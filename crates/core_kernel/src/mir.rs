//! Missing Information Report vocabulary
//!
//! Every billable entity carries a set of violation reasons. An empty set
//! means the entity is ready to bill. At the persistence boundary the set is
//! written as the legacy comma-joined token string (`"FirstName,Zip"`), which
//! downstream report consumers parse, so the token spellings are fixed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ICD coding scheme used for a diagnosis code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosisScheme {
    Icd9,
    Icd10,
}

impl DiagnosisScheme {
    /// First date of service that must be coded with ICD-10
    pub fn icd10_effective_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 10, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The scheme that applies to a date of service
    pub fn for_service_date(date: NaiveDate) -> Self {
        if date >= Self::icd10_effective_date() {
            DiagnosisScheme::Icd10
        } else {
            DiagnosisScheme::Icd9
        }
    }

    fn token(&self) -> &'static str {
        match self {
            DiagnosisScheme::Icd9 => "ICD9",
            DiagnosisScheme::Icd10 => "ICD10",
        }
    }

    fn parse_token(token: &str) -> Option<Self> {
        match token {
            "ICD9" => Some(DiagnosisScheme::Icd9),
            "ICD10" => Some(DiagnosisScheme::Icd10),
            _ => None,
        }
    }
}

/// A single MIR violation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MirReason {
    // Demographics shared by customer, doctor, facility and insurance company
    AccountNumber,
    Name,
    FirstName,
    LastName,
    Address1,
    City,
    State,
    Zip,
    Phone,
    DateOfBirth,
    Gender,
    Npi,
    PayerId,

    // Cross-entity references
    Customer,
    CustomerInactive,
    CustomerMir,
    Doctor,
    DoctorMir,
    FacilityMir,
    InsuranceCompany,
    InsuranceCompanyMir,

    // Insurance policy
    PolicyNumber,
    RelationshipCode,
    InsuredName,
    InsuredDateOfBirth,
    PolicyInactive,
    /// Payer slot (1-4) is flagged billable but has no policy
    PolicyRequired(u8),
    /// The policy in payer slot (1-4) has its own violations
    PolicyMir(u8),

    // Diagnosis codes
    IcdRequired(DiagnosisScheme),
    /// Code at position (1-12) does not exist in the code table
    IcdUnknown(DiagnosisScheme, u8),
    /// Code at position (1-12) is not active on the date of service
    IcdInactive(DiagnosisScheme, u8),

    // CMN form
    InitialDate,
    RevisedDate,
    RecertificationDate,
    EstimatedLengthOfNeed,
    SignatureName,
    SignatureDate,
    /// Required answer missing, keyed by question label (e.g. "1a")
    Answer(String),

    // Order line
    BillingCode,
    InventoryItem,
    PriceCode,
    SaleRentType,
    OrderedQuantity,
    BilledQuantity,
    DosFrom,
    BillablePrice,
    AllowablePrice,
    AuthorizationNumber,
    AuthorizationExpired,
    CmnRequired,
    CmnMir,
    CmnExpired,
    DxPointer,
    DxPointer10,
}

impl fmt::Display for MirReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirReason::AccountNumber => f.write_str("AccountNumber"),
            MirReason::Name => f.write_str("Name"),
            MirReason::FirstName => f.write_str("FirstName"),
            MirReason::LastName => f.write_str("LastName"),
            MirReason::Address1 => f.write_str("Address1"),
            MirReason::City => f.write_str("City"),
            MirReason::State => f.write_str("State"),
            MirReason::Zip => f.write_str("Zip"),
            MirReason::Phone => f.write_str("Phone"),
            MirReason::DateOfBirth => f.write_str("DateofBirth"),
            MirReason::Gender => f.write_str("Gender"),
            MirReason::Npi => f.write_str("NPI"),
            MirReason::PayerId => f.write_str("PayerID"),
            MirReason::Customer => f.write_str("Customer"),
            MirReason::CustomerInactive => f.write_str("Customer.Inactive"),
            MirReason::CustomerMir => f.write_str("Customer.MIR"),
            MirReason::Doctor => f.write_str("Doctor"),
            MirReason::DoctorMir => f.write_str("Doctor.MIR"),
            MirReason::FacilityMir => f.write_str("Facility.MIR"),
            MirReason::InsuranceCompany => f.write_str("InsuranceCompany"),
            MirReason::InsuranceCompanyMir => f.write_str("InsuranceCompany.MIR"),
            MirReason::PolicyNumber => f.write_str("PolicyNumber"),
            MirReason::RelationshipCode => f.write_str("RelationshipCode"),
            MirReason::InsuredName => f.write_str("InsuredName"),
            MirReason::InsuredDateOfBirth => f.write_str("InsuredDateofBirth"),
            MirReason::PolicyInactive => f.write_str("Inactive"),
            MirReason::PolicyRequired(slot) => write!(f, "Policy{}.Required", slot),
            MirReason::PolicyMir(slot) => write!(f, "Policy{}.MIR", slot),
            MirReason::IcdRequired(scheme) => write!(f, "{}.Required", scheme.token()),
            MirReason::IcdUnknown(scheme, pos) => write!(f, "{}.{:02}.Unknown", scheme.token(), pos),
            MirReason::IcdInactive(scheme, pos) => write!(f, "{}.{:02}.Inactive", scheme.token(), pos),
            MirReason::InitialDate => f.write_str("InitialDate"),
            MirReason::RevisedDate => f.write_str("RevisedDate"),
            MirReason::RecertificationDate => f.write_str("RecertificationDate"),
            MirReason::EstimatedLengthOfNeed => f.write_str("EstimatedLengthOfNeed"),
            MirReason::SignatureName => f.write_str("Signature_Name"),
            MirReason::SignatureDate => f.write_str("Signature_Date"),
            MirReason::Answer(label) => write!(f, "Answer{}", label),
            MirReason::BillingCode => f.write_str("BillingCode"),
            MirReason::InventoryItem => f.write_str("InventoryItem"),
            MirReason::PriceCode => f.write_str("PriceCode"),
            MirReason::SaleRentType => f.write_str("SaleRentType"),
            MirReason::OrderedQuantity => f.write_str("OrderedQuantity"),
            MirReason::BilledQuantity => f.write_str("BilledQuantity"),
            MirReason::DosFrom => f.write_str("DOSFrom"),
            MirReason::BillablePrice => f.write_str("BillablePrice"),
            MirReason::AllowablePrice => f.write_str("AllowablePrice"),
            MirReason::AuthorizationNumber => f.write_str("AuthorizationNumber"),
            MirReason::AuthorizationExpired => f.write_str("AuthorizationNumber.Expired"),
            MirReason::CmnRequired => f.write_str("CMNForm.Required"),
            MirReason::CmnMir => f.write_str("CMNForm.MIR"),
            MirReason::CmnExpired => f.write_str("CMNForm.Expired"),
            MirReason::DxPointer => f.write_str("DXPointer"),
            MirReason::DxPointer10 => f.write_str("DXPointer10"),
        }
    }
}

/// Error returned when a token is not part of the vocabulary
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown MIR token: {0}")]
pub struct UnknownMirToken(pub String);

impl FromStr for MirReason {
    type Err = UnknownMirToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let unknown = || UnknownMirToken(token.to_string());

        let simple = match token {
            "AccountNumber" => Some(MirReason::AccountNumber),
            "Name" => Some(MirReason::Name),
            "FirstName" => Some(MirReason::FirstName),
            "LastName" => Some(MirReason::LastName),
            "Address1" => Some(MirReason::Address1),
            "City" => Some(MirReason::City),
            "State" => Some(MirReason::State),
            "Zip" => Some(MirReason::Zip),
            "Phone" => Some(MirReason::Phone),
            "DateofBirth" => Some(MirReason::DateOfBirth),
            "Gender" => Some(MirReason::Gender),
            "NPI" => Some(MirReason::Npi),
            "PayerID" => Some(MirReason::PayerId),
            "Customer" => Some(MirReason::Customer),
            "Customer.Inactive" => Some(MirReason::CustomerInactive),
            "Customer.MIR" => Some(MirReason::CustomerMir),
            "Doctor" => Some(MirReason::Doctor),
            "Doctor.MIR" => Some(MirReason::DoctorMir),
            "Facility.MIR" => Some(MirReason::FacilityMir),
            "InsuranceCompany" => Some(MirReason::InsuranceCompany),
            "InsuranceCompany.MIR" => Some(MirReason::InsuranceCompanyMir),
            "PolicyNumber" => Some(MirReason::PolicyNumber),
            "RelationshipCode" => Some(MirReason::RelationshipCode),
            "InsuredName" => Some(MirReason::InsuredName),
            "InsuredDateofBirth" => Some(MirReason::InsuredDateOfBirth),
            "Inactive" => Some(MirReason::PolicyInactive),
            "InitialDate" => Some(MirReason::InitialDate),
            "RevisedDate" => Some(MirReason::RevisedDate),
            "RecertificationDate" => Some(MirReason::RecertificationDate),
            "EstimatedLengthOfNeed" => Some(MirReason::EstimatedLengthOfNeed),
            "Signature_Name" => Some(MirReason::SignatureName),
            "Signature_Date" => Some(MirReason::SignatureDate),
            "BillingCode" => Some(MirReason::BillingCode),
            "InventoryItem" => Some(MirReason::InventoryItem),
            "PriceCode" => Some(MirReason::PriceCode),
            "SaleRentType" => Some(MirReason::SaleRentType),
            "OrderedQuantity" => Some(MirReason::OrderedQuantity),
            "BilledQuantity" => Some(MirReason::BilledQuantity),
            "DOSFrom" => Some(MirReason::DosFrom),
            "BillablePrice" => Some(MirReason::BillablePrice),
            "AllowablePrice" => Some(MirReason::AllowablePrice),
            "AuthorizationNumber" => Some(MirReason::AuthorizationNumber),
            "AuthorizationNumber.Expired" => Some(MirReason::AuthorizationExpired),
            "CMNForm.Required" => Some(MirReason::CmnRequired),
            "CMNForm.MIR" => Some(MirReason::CmnMir),
            "CMNForm.Expired" => Some(MirReason::CmnExpired),
            "DXPointer" => Some(MirReason::DxPointer),
            "DXPointer10" => Some(MirReason::DxPointer10),
            _ => None,
        };
        if let Some(reason) = simple {
            return Ok(reason);
        }

        if let Some(label) = token.strip_prefix("Answer") {
            if !label.is_empty() {
                return Ok(MirReason::Answer(label.to_string()));
            }
        }

        if let Some(rest) = token.strip_prefix("Policy") {
            let (slot, suffix) = rest.split_once('.').ok_or_else(unknown)?;
            let slot: u8 = slot.parse().map_err(|_| unknown())?;
            return match suffix {
                "Required" => Ok(MirReason::PolicyRequired(slot)),
                "MIR" => Ok(MirReason::PolicyMir(slot)),
                _ => Err(unknown()),
            };
        }

        let mut parts = token.split('.');
        let scheme = parts
            .next()
            .and_then(DiagnosisScheme::parse_token)
            .ok_or_else(unknown)?;
        match (parts.next(), parts.next(), parts.next()) {
            (Some("Required"), None, None) => Ok(MirReason::IcdRequired(scheme)),
            (Some(pos), Some(kind), None) => {
                let pos: u8 = pos.parse().map_err(|_| unknown())?;
                match kind {
                    "Unknown" => Ok(MirReason::IcdUnknown(scheme, pos)),
                    "Inactive" => Ok(MirReason::IcdInactive(scheme, pos)),
                    _ => Err(unknown()),
                }
            }
            _ => Err(unknown()),
        }
    }
}

/// The set of MIR violations recorded on one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirFlags(BTreeSet<MirReason>);

impl MirFlags {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// True when nothing blocks billing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, reason: MirReason) {
        self.0.insert(reason);
    }

    /// Inserts `reason` when `missing` holds
    pub fn require(&mut self, missing: bool, reason: MirReason) {
        if missing {
            self.0.insert(reason);
        }
    }

    pub fn contains(&self, reason: &MirReason) -> bool {
        self.0.contains(reason)
    }

    pub fn extend(&mut self, other: &MirFlags) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &MirReason> {
        self.0.iter()
    }

    /// The legacy comma-joined wire form
    pub fn to_wire(&self) -> String {
        self.0
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses the legacy wire form; empty tokens are ignored
    pub fn parse_wire(wire: &str) -> Result<Self, UnknownMirToken> {
        wire.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(MirReason::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(MirFlags)
    }
}

impl FromIterator<MirReason> for MirFlags {
    fn from_iter<I: IntoIterator<Item = MirReason>>(iter: I) -> Self {
        MirFlags(iter.into_iter().collect())
    }
}

impl fmt::Display for MirFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}
