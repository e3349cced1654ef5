//! Comprehensive tests for domain_mir

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{
    CmnFormId, CustomerId, CustomerInsuranceId, DiagnosisScheme, DoctorId, FacilityId, InsuranceCompanyId,
    InventoryItemId, MirReason, Money, OrderId, OrderLineId,
};
use domain_billing::{Order, OrderLine, OrderLineState, PayerPolicy, SaleRentType};
use domain_mir::{
    Address, CmnForm, CmnFormType, Customer, CustomerPolicy, DiagnosisCatalog, DiagnosisCode, Doctor, Facility,
    Gender, InsuranceCompany, MirStore, MirValidator,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

const CUSTOMER: CustomerId = CustomerId::new(1);
const DOCTOR: DoctorId = DoctorId::new(2);
const PAYER: InsuranceCompanyId = InsuranceCompanyId::new(3);
const POLICY: CustomerInsuranceId = CustomerInsuranceId::new(4);
const ORDER: OrderId = OrderId::new(5);

fn office() -> Address {
    Address::new("12 State St", "Albany", "NY", "12207-1234")
}

fn validator() -> MirValidator {
    MirValidator::new(d(2024, 3, 1))
}

fn complete_store() -> MirStore {
    MirStore::new()
        .with_doctor(Doctor::new(DOCTOR, "Ann", "Lee", office(), "(518) 555-0100", "1234567893"))
        .with_customer(
            Customer::new(CUSTOMER, "A-1001", "Sam", "Ortiz", office()).with_demographics(d(1950, 4, 2), Gender::Male),
        )
        .with_insurance_company(InsuranceCompany::new(PAYER, "Medicare", office(), "MCR01"))
        .with_policy(CustomerPolicy::for_self(POLICY, CUSTOMER, PAYER, "1EG4TE5MK72"))
        .with_diagnoses(
            DiagnosisCatalog::new()
                .with_code(DiagnosisScheme::Icd10, "J44.9")
                .with_code(DiagnosisScheme::Icd10, "R06.02")
                .with_code(DiagnosisScheme::Icd9, "496"),
        )
}

fn line(id: i64, billing_code: &str, dos: NaiveDate) -> OrderLine {
    let mut line = OrderLine::new(
        OrderLineId::new(id),
        ORDER,
        billing_code,
        SaleRentType::MonthlyRental,
        dos,
        Money::new(dec!(120)),
    );
    line.inventory_item_id = Some(InventoryItemId::new(70));
    line.price_code = "Retail".to_string();
    line
}

fn complete_order() -> Order {
    let mut order = Order::new(ORDER, CUSTOMER)
        .with_policy(1, PayerPolicy {
            policy_id: POLICY,
            company_id: PAYER,
        })
        .with_line(line(1, "E0601", d(2024, 3, 1)));
    order.doctor_id = Some(DOCTOR);
    order.icd10_codes = vec!["J44.9".to_string()];
    order
}

fn refresh(store: &mut MirStore, orders: &mut [Order]) {
    validator().update_all(store, orders).unwrap();
}

// ============================================================================
// Order Readiness Tests
// ============================================================================

mod order_tests {
    use super::*;

    #[test]
    fn test_complete_order_is_ready_to_bill() {
        let mut store = complete_store();
        let mut orders = [complete_order()];
        refresh(&mut store, &mut orders);

        assert!(orders[0].mir.is_empty(), "order flags: {}", orders[0].mir);
        assert!(orders[0].lines[0].mir.is_empty());
    }

    #[test]
    fn test_incomplete_doctor_propagates_to_lines() {
        let mut store = complete_store();
        if let Some(doctor) = store.doctors.get_mut(&DOCTOR) {
            doctor.npi = "1234567890".to_string();
        }
        let mut orders = [complete_order()];
        refresh(&mut store, &mut orders);

        assert_eq!(store.doctors[&DOCTOR].mir.to_wire(), "NPI");
        assert_eq!(orders[0].mir.to_wire(), "Doctor.MIR");
        assert_eq!(orders[0].lines[0].mir.to_wire(), "Doctor.MIR");
    }

    #[test]
    fn test_missing_customer_and_doctor() {
        let mut store = MirStore::new();
        let mut orders = [complete_order()];
        orders[0].doctor_id = None;
        refresh(&mut store, &mut orders);

        let flags = &orders[0].mir;
        assert!(flags.contains(&MirReason::Customer));
        assert!(flags.contains(&MirReason::Doctor));
        assert!(flags.contains(&MirReason::PolicyRequired(1)));
    }

    #[test]
    fn test_inactive_customer_flagged() {
        let mut store = complete_store();
        if let Some(customer) = store.customers.get_mut(&CUSTOMER) {
            customer.inactive = true;
        }
        let mut orders = [complete_order()];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].mir.to_wire(), "Customer.Inactive");
    }

    #[test]
    fn test_incomplete_facility_flagged() {
        let mut store = complete_store().with_facility(Facility::new(FacilityId::new(8), "Clinic", office()).with_npi("1"));
        let mut orders = [complete_order()];
        orders[0].facility_id = Some(FacilityId::new(8));
        refresh(&mut store, &mut orders);
        assert!(orders[0].mir.contains(&MirReason::FacilityMir));
    }

    #[test]
    fn test_payer_slot_gap_requires_policy() {
        let mut store = complete_store();
        let mut orders = [complete_order()];
        orders[0].policies = [
            None,
            Some(PayerPolicy {
                policy_id: POLICY,
                company_id: PAYER,
            }),
            None,
            None,
        ];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].mir.to_wire(), "Policy1.Required");
    }

    #[test]
    fn test_closed_lines_not_rolled_up() {
        let mut store = complete_store();
        let mut closed = line(2, "E0601", d(2024, 3, 1));
        closed.price_code.clear();
        closed.state = OrderLineState::Closed;
        let mut orders = [complete_order().with_line(closed)];
        refresh(&mut store, &mut orders);

        assert!(orders[0].lines[1].mir.contains(&MirReason::PriceCode));
        assert!(orders[0].mir.is_empty());
    }

    #[test]
    fn test_line_field_checks() {
        let mut store = complete_store();
        let mut order = complete_order();
        let bad = &mut order.lines[0];
        bad.billing_code = " ".to_string();
        bad.inventory_item_id = None;
        bad.billed_quantity = dec!(0);
        bad.allowable_price = Money::new(dec!(-1));
        bad.delivery_date = Some(d(2024, 3, 5));
        let mut orders = [order];
        refresh(&mut store, &mut orders);

        let wire = orders[0].lines[0].mir.to_wire();
        for token in ["BillingCode", "InventoryItem", "BilledQuantity", "AllowablePrice", "DOSFrom"] {
            assert!(wire.split(',').any(|t| t == token), "missing {} in {}", token, wire);
        }
        assert!(!orders[0].lines[0].mir.contains(&MirReason::OrderedQuantity));
    }

    #[test]
    fn test_authorization_windows() {
        let mut store = complete_store();
        let mut order = complete_order();
        order.lines[0].authorization_expiration = Some(d(2024, 12, 31));
        let mut orders = [order];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].lines[0].mir.to_wire(), "AuthorizationNumber");

        orders[0].lines[0].authorization_number = Some("PA-77".to_string());
        orders[0].lines[0].authorization_expiration = Some(d(2024, 2, 28));
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].lines[0].mir.to_wire(), "AuthorizationNumber.Expired");
    }
}

// ============================================================================
// Diagnosis Tests
// ============================================================================

mod diagnosis_tests {
    use super::*;

    #[test]
    fn test_unknown_code_reported_by_position() {
        let mut store = complete_store();
        let mut order = complete_order();
        order.icd10_codes = vec!["J44.9".to_string(), "Z99.99".to_string()];
        let mut orders = [order];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].mir.to_wire(), "ICD10.02.Unknown");
    }

    #[test]
    fn test_inactive_code_on_date_of_service() {
        let mut store = complete_store();
        store.diagnoses.insert(
            DiagnosisScheme::Icd10,
            DiagnosisCode {
                code: "E11.9".to_string(),
                active_date: None,
                inactive_date: Some(d(2024, 1, 1)),
            },
        );
        let mut order = complete_order();
        order.icd10_codes = vec!["E11.9".to_string()];
        let mut orders = [order];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].mir.to_wire(), "ICD10.01.Inactive");
    }

    #[test]
    fn test_pre_icd10_service_uses_icd9_codes() {
        let mut store = complete_store();
        let mut order = complete_order();
        order.lines[0] = line(1, "E0601", d(2015, 9, 1));
        let mut orders = [order];
        refresh(&mut store, &mut orders);

        let flags = &orders[0].lines[0].mir;
        assert!(flags.contains(&MirReason::IcdRequired(DiagnosisScheme::Icd9)));
        assert!(flags.contains(&MirReason::DxPointer));

        orders[0].icd9_codes = vec!["496".to_string()];
        refresh(&mut store, &mut orders);
        assert!(orders[0].lines[0].mir.is_empty());
    }

    #[test]
    fn test_dx_pointer_must_reference_present_codes() {
        let mut store = complete_store();
        let mut order = complete_order();
        order.lines[0].dx_pointer = "1,2".to_string();
        let mut orders = [order];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].lines[0].mir.to_wire(), "DXPointer10");

        orders[0].icd10_codes.push("R06.02".to_string());
        refresh(&mut store, &mut orders);
        assert!(orders[0].lines[0].mir.is_empty());

        orders[0].lines[0].dx_pointer = "2,2".to_string();
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].lines[0].mir.to_wire(), "DXPointer10");
    }
}

// ============================================================================
// Policy Tests
// ============================================================================

mod policy_tests {
    use super::*;

    #[test]
    fn test_dependent_policy_needs_insured() {
        let mut store = complete_store();
        if let Some(policy) = store.policies.get_mut(&POLICY) {
            policy.relationship_code = Some("19".to_string());
        }
        let mut orders = [complete_order()];
        refresh(&mut store, &mut orders);

        assert_eq!(store.policies[&POLICY].mir.to_wire(), "InsuredName,InsuredDateofBirth");
        assert_eq!(orders[0].mir.to_wire(), "Policy1.MIR");
    }

    #[test]
    fn test_expired_policy_is_inactive() {
        let mut store = complete_store();
        if let Some(policy) = store.policies.get_mut(&POLICY) {
            policy.inactive_date = Some(d(2024, 3, 1));
        }
        refresh(&mut store, &mut []);
        assert_eq!(store.policies[&POLICY].mir.to_wire(), "Inactive");
    }

    #[test]
    fn test_incomplete_company_propagates() {
        let mut store = complete_store();
        if let Some(company) = store.insurance_companies.get_mut(&PAYER) {
            company.payer_id.clear();
        }
        refresh(&mut store, &mut []);
        assert_eq!(store.insurance_companies[&PAYER].mir.to_wire(), "PayerID");
        assert_eq!(store.policies[&POLICY].mir.to_wire(), "InsuranceCompany.MIR");
    }
}

// ============================================================================
// CMN Tests
// ============================================================================

mod cmn_tests {
    use super::*;

    const FORM: CmnFormId = CmnFormId::new(40);

    fn oxygen_form() -> CmnForm {
        let mut form = CmnForm::new(FORM, CUSTOMER, CmnFormType::Oxygen, d(2024, 1, 10))
            .with_signature("Ann Lee", d(2024, 1, 12))
            .with_length_of_need(99)
            .with_answer("1b", "87")
            .with_answer("1c", "2024-01-05")
            .with_answer("2", "1")
            .with_answer("3", "1")
            .with_answer("4", "Y")
            .with_answer("5", "2");
        form.doctor_id = Some(DOCTOR);
        form
    }

    fn oxygen_order(form: Option<CmnFormId>) -> Order {
        let mut order = complete_order();
        order.lines[0] = line(1, "E1390", d(2024, 3, 1));
        order.lines[0].cmn_form_id = form;
        order
    }

    #[test]
    fn test_cmn_required_for_listed_codes() {
        let mut store = complete_store().with_cmn_billing_code("E1390");
        let mut orders = [oxygen_order(None)];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].lines[0].mir.to_wire(), "CMNForm.Required");
    }

    #[test]
    fn test_complete_form_satisfies_line() {
        let mut store = complete_store().with_cmn_billing_code("E1390").with_cmn_form(oxygen_form());
        let mut orders = [oxygen_order(Some(FORM))];
        refresh(&mut store, &mut orders);

        assert!(store.cmn_forms[&FORM].mir.is_empty(), "form flags: {}", store.cmn_forms[&FORM].mir);
        assert!(orders[0].mir.is_empty());
    }

    #[test]
    fn test_high_flow_oxygen_needs_retest() {
        let mut store = complete_store()
            .with_cmn_billing_code("E1390")
            .with_cmn_form(oxygen_form().with_answer("5", "6"));
        let mut orders = [oxygen_order(Some(FORM))];
        refresh(&mut store, &mut orders);

        assert_eq!(store.cmn_forms[&FORM].mir.to_wire(), "Answer7a,Answer7c");
        assert_eq!(orders[0].lines[0].mir.to_wire(), "CMNForm.MIR");
    }

    #[test]
    fn test_length_of_need_expires_form() {
        let mut store = complete_store()
            .with_cmn_billing_code("E1390")
            .with_cmn_form(oxygen_form().with_length_of_need(1));
        let mut orders = [oxygen_order(Some(FORM))];
        refresh(&mut store, &mut orders);
        assert_eq!(orders[0].lines[0].mir.to_wire(), "CMNForm.Expired");
    }

    #[test]
    fn test_unsigned_form_flags() {
        let mut form = oxygen_form();
        form.signature_name.clear();
        form.signature_date = None;
        form.answers.remove("1b");
        let mut store = complete_store().with_cmn_form(form);
        refresh(&mut store, &mut []);
        assert_eq!(store.cmn_forms[&FORM].mir.to_wire(), "Signature_Name,Signature_Date,Answer1a");
    }
}

// ============================================================================
// Recompute Scope Tests
// ============================================================================

mod scope_tests {
    use super::*;

    #[test]
    fn test_single_order_touches_only_that_order() {
        let mut store = complete_store();
        let mut other = complete_order();
        other.id = OrderId::new(6);
        other.doctor_id = None;
        let mut orders = [complete_order(), other];
        orders[0].doctor_id = None;

        let changed = validator().update_orders(&store, &mut orders, Some(ORDER)).unwrap();
        assert_eq!(changed, 1);
        assert!(orders[0].mir.contains(&MirReason::Doctor));
        assert!(orders[1].mir.is_empty());

        let _ = validator().update_all(&mut store, &mut orders).unwrap();
        assert!(orders[1].mir.contains(&MirReason::Doctor));
    }

    #[test]
    fn test_refresh_reaches_fixed_point() {
        let mut store = complete_store();
        if let Some(doctor) = store.doctors.get_mut(&DOCTOR) {
            doctor.phone = "555".to_string();
        }
        let mut orders = [complete_order()];

        let first = validator().update_all(&mut store, &mut orders).unwrap();
        let second = validator().update_all(&mut store, &mut orders).unwrap();
        assert_eq!((first.doctors, first.orders), (1, 1));
        assert_eq!(second.total(), 0);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn customer_findings_always_reach_the_order(
            blank_account in any::<bool>(),
            blank_name in any::<bool>(),
            zip in "[0-9]{3,10}",
            state in "[A-Za-z]{1,3}",
        ) {
            let mut store = complete_store();
            if let Some(customer) = store.customers.get_mut(&CUSTOMER) {
                if blank_account {
                    customer.account_number.clear();
                }
                if blank_name {
                    customer.first_name.clear();
                }
                customer.address.zip = zip;
                customer.address.state = state;
            }
            let mut orders = [complete_order()];
            validator().update_all(&mut store, &mut orders).unwrap();

            let incomplete = !store.customers[&CUSTOMER].mir.is_empty();
            prop_assert_eq!(orders[0].mir.contains(&MirReason::CustomerMir), incomplete);
            prop_assert_eq!(validator().update_all(&mut store, &mut orders).unwrap().total(), 0);
        }
    }
}
