mod common;

use common::*;
use rust_decimal_macros::dec;
use leases_core::charges::{ChargeMethod, RepetitionType};
use leases_core::error::WorkflowError;
use leases_core::proposals::domain::{
    ComplianceStatus, Proposal, ProposalRequirement, GROSS_TURNOVER_STATEMENT_ANNUALLY,
    GROSS_TURNOVER_STATEMENT_MONTHLY, GROSS_TURNOVER_STATEMENT_QUARTERLY,
};
use leases_core::store::{ComplianceStore, RequirementStore};

fn statement_requirement(
    harness: &Harness,
    proposal: &Proposal,
    code: &str,
) -> Option<ProposalRequirement> {
    harness
        .store
        .requirements_for_proposal(proposal.id)
        .expect("requirements")
        .into_iter()
        .find(|requirement| requirement.standard_code() == Some(code))
}

fn set_cadence(harness: &Harness, proposal: &Proposal, cadence: RepetitionType) {
    let mut details = harness
        .service
        .invoicing_details_for(proposal.id)
        .expect("details exist");
    details.invoicing_repetition_type = Some(cadence);
    harness
        .service
        .update_invoicing_details(FINANCE, proposal.id, details, date(2025, 6, 10))
        .expect("details updated");
}

fn issue_arrears_lease(harness: &Harness) -> Proposal {
    let (proposal, _) = issue_lease(
        harness,
        ChargeMethod::PercentageOfGrossTurnoverInArrears,
        date(2025, 7, 1),
        date(2027, 6, 30),
        date(2025, 6, 10),
    );
    proposal
}

#[test]
fn arrears_approvals_always_submit_annual_statements() {
    let harness = harness();
    let proposal = issue_arrears_lease(&harness);

    let annual = statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_ANNUALLY)
        .expect("annual statement requirement");
    assert!(!annual.is_deleted);
    // First financial year ends 2026-06-30; the audited statement is due the
    // following 31 October.
    assert_eq!(annual.due_date, Some(date(2026, 10, 31)));
    assert_eq!(annual.reminder_date, Some(date(2026, 7, 1)));

    assert!(statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_QUARTERLY)
        .is_none());
    assert!(statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_MONTHLY)
        .is_none());

    let compliances = harness
        .store
        .compliances_for_requirement(annual.id)
        .expect("annual compliances");
    let mut due_dates: Vec<_> = compliances
        .iter()
        .map(|compliance| compliance.due_date)
        .collect();
    due_dates.sort();
    assert_eq!(due_dates, vec![date(2026, 10, 31), date(2027, 10, 31)]);
}

#[test]
fn quarterly_cadence_generates_statements_four_months_after_each_quarter() {
    let harness = harness();
    let proposal = issue_arrears_lease(&harness);
    set_cadence(&harness, &proposal, RepetitionType::Quarterly);

    let quarterly =
        statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_QUARTERLY)
            .expect("quarterly statement requirement");
    assert!(!quarterly.is_deleted);
    // First quarter of the term ends 2025-09-30.
    assert_eq!(quarterly.due_date, Some(date(2025, 10, 30)));

    let compliances = harness
        .store
        .compliances_for_requirement(quarterly.id)
        .expect("quarterly compliances");
    // Eight quarters across the two-year term.
    assert_eq!(compliances.len(), 8);
    let mut due_dates: Vec<_> = compliances
        .iter()
        .map(|compliance| compliance.due_date)
        .collect();
    due_dates.sort();
    assert_eq!(due_dates[0], date(2026, 1, 30));
    assert_eq!(due_dates[7], date(2027, 10, 30));
}

#[test]
fn monthly_cadence_generates_statements_two_months_after_each_month_end() {
    let harness = harness();
    let proposal = issue_arrears_lease(&harness);
    set_cadence(&harness, &proposal, RepetitionType::Monthly);

    let monthly = statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_MONTHLY)
        .expect("monthly statement requirement");
    assert!(!monthly.is_deleted);
    assert_eq!(monthly.due_date, Some(date(2025, 8, 31)));

    let compliances = harness
        .store
        .compliances_for_requirement(monthly.id)
        .expect("monthly compliances");
    // Twenty-four months across the two-year term.
    assert_eq!(compliances.len(), 24);
    let mut due_dates: Vec<_> = compliances
        .iter()
        .map(|compliance| compliance.due_date)
        .collect();
    due_dates.sort();
    // July 2025 ends 2025-07-31; the statement is due two months later.
    assert_eq!(due_dates[0], date(2025, 9, 30));
}

#[test]
fn switching_cadence_retires_the_other_and_discards_its_future_obligations() {
    let harness = harness();
    let proposal = issue_arrears_lease(&harness);
    set_cadence(&harness, &proposal, RepetitionType::Quarterly);
    let quarterly =
        statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_QUARTERLY)
            .expect("quarterly statement requirement");

    set_cadence(&harness, &proposal, RepetitionType::Monthly);

    let retired =
        statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_QUARTERLY)
            .expect("requirement is soft deleted, not removed");
    assert!(retired.is_deleted);
    assert_eq!(retired.id, quarterly.id);

    let quarterly_compliances = harness
        .store
        .compliances_for_requirement(quarterly.id)
        .expect("quarterly compliances");
    assert!(!quarterly_compliances.is_empty());
    assert!(quarterly_compliances
        .iter()
        .all(|compliance| compliance.status == ComplianceStatus::Discarded));

    let monthly = statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_MONTHLY)
        .expect("monthly statement requirement");
    assert!(!monthly.is_deleted);

    // Switching back resurrects the quarterly requirement in place.
    set_cadence(&harness, &proposal, RepetitionType::Quarterly);
    let resurrected =
        statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_QUARTERLY)
            .expect("quarterly statement requirement");
    assert!(!resurrected.is_deleted);
    assert_eq!(resurrected.id, quarterly.id);
}

#[test]
fn reapplying_the_same_cadence_creates_no_duplicates() {
    let harness = harness();
    let proposal = issue_arrears_lease(&harness);
    set_cadence(&harness, &proposal, RepetitionType::Quarterly);

    let requirements_before = harness
        .store
        .requirements_for_proposal(proposal.id)
        .expect("requirements")
        .len();
    let compliances_before = harness
        .store
        .compliances_for_proposal(proposal.id)
        .expect("compliances")
        .len();

    set_cadence(&harness, &proposal, RepetitionType::Quarterly);

    assert_eq!(
        harness
            .store
            .requirements_for_proposal(proposal.id)
            .expect("requirements")
            .len(),
        requirements_before
    );
    assert_eq!(
        harness
            .store
            .compliances_for_proposal(proposal.id)
            .expect("compliances")
            .len(),
        compliances_before
    );
}

#[test]
fn advance_billing_ignores_sub_annual_cadences() {
    let harness = harness();
    let (proposal, _) = issue_lease(
        &harness,
        ChargeMethod::PercentageOfGrossTurnoverInAdvance,
        date(2025, 7, 1),
        date(2027, 6, 30),
        date(2025, 6, 10),
    );
    set_cadence(&harness, &proposal, RepetitionType::Quarterly);

    assert!(statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_ANNUALLY)
        .is_some_and(|requirement| !requirement.is_deleted));
    assert!(statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_QUARTERLY)
        .is_none());
    assert!(statement_requirement(&harness, &proposal, GROSS_TURNOVER_STATEMENT_MONTHLY)
        .is_none());
}

#[test]
fn gross_turnover_approvals_complete_editing_without_invoices() {
    let harness = harness();
    let proposal = issue_arrears_lease(&harness);
    set_cadence(&harness, &proposal, RepetitionType::Quarterly);

    let mut details = harness
        .service
        .invoicing_details_for(proposal.id)
        .expect("details exist");
    details.base_fee = Some(dec!(1000));
    harness
        .service
        .update_invoicing_details(FINANCE, proposal.id, details, date(2025, 6, 10))
        .expect("details updated");

    let raised = harness
        .service
        .finance_complete_editing(FINANCE, proposal.id, date(2025, 7, 1))
        .expect("editing completes");
    assert!(raised.is_empty());

    let error = harness
        .service
        .finance_complete_editing(FINANCE, proposal.id, date(2025, 7, 1))
        .expect_err("single shot");
    assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
}
