mod common;

use std::sync::Arc;

use common::*;
use rust_decimal_macros::dec;
use leases_core::charges::ChargeMethod;
use leases_core::invoicing::reminders::CrownLandRentReviewReminderJob;
use leases_core::ports::Notification;
use leases_core::proposals::domain::Proposal;

fn issue_reviewed_lease(harness: &Harness, charge_method: ChargeMethod) -> Proposal {
    let (proposal, _) = issue_lease(
        harness,
        charge_method,
        date(2025, 7, 1),
        date(2030, 6, 30),
        date(2025, 6, 10),
    );
    let mut details = harness
        .service
        .invoicing_details_for(proposal.id)
        .expect("details exist");
    details.base_fee = Some(dec!(10000));
    details.crown_land_rent_review_dates = vec![date(2027, 7, 1)];
    harness
        .service
        .update_invoicing_details(FINANCE, proposal.id, details, date(2025, 6, 10))
        .expect("details updated");
    proposal
}

fn review_job(
    harness: &Harness,
) -> CrownLandRentReviewReminderJob<leases_core::store::InMemoryLeasingStore, RecordingSender> {
    CrownLandRentReviewReminderJob::new(
        Arc::clone(&harness.store),
        Arc::clone(&harness.notifications),
    )
}

#[test]
fn an_upcoming_review_is_chased_a_year_out() {
    let harness = harness();
    issue_reviewed_lease(&harness, ChargeMethod::BaseFeePlusFixedAnnualPercentage);
    let job = review_job(&harness);

    // Eleven months before the 2027-07-01 review.
    let report = job.run(date(2026, 8, 1)).expect("run succeeds");
    assert_eq!(report.approvals_checked, 1);
    assert_eq!(report.reminders_sent, 1);

    let reminders: Vec<_> = harness
        .notifications
        .events()
        .into_iter()
        .filter(|event| matches!(event, Notification::CrownLandRentReviewDue { .. }))
        .collect();
    assert_eq!(reminders.len(), 1);
    assert!(matches!(
        &reminders[0],
        Notification::CrownLandRentReviewDue {
            months_until_review: 12,
            ..
        }
    ));

    assert_eq!(job.run(date(2026, 8, 1)).expect("run succeeds").reminders_sent, 0);
}

#[test]
fn each_threshold_fires_once_down_to_the_review_day() {
    let harness = harness();
    issue_reviewed_lease(&harness, ChargeMethod::BaseFeePlusFixedAnnualPercentage);
    let job = review_job(&harness);

    assert_eq!(job.run(date(2026, 8, 1)).expect("run succeeds").reminders_sent, 1);
    // Five months out: only the six-month threshold is newly crossed.
    assert_eq!(job.run(date(2027, 2, 1)).expect("run succeeds").reminders_sent, 1);
    assert_eq!(job.run(date(2027, 2, 2)).expect("run succeeds").reminders_sent, 0);
    // The review day itself.
    assert_eq!(job.run(date(2027, 7, 1)).expect("run succeeds").reminders_sent, 1);
    assert_eq!(job.run(date(2027, 7, 1)).expect("run succeeds").reminders_sent, 0);
}

#[test]
fn past_reviews_are_not_chased() {
    let harness = harness();
    issue_reviewed_lease(&harness, ChargeMethod::BaseFeePlusFixedAnnualPercentage);

    let report = review_job(&harness)
        .run(date(2027, 8, 1))
        .expect("run succeeds");
    assert_eq!(report.reminders_sent, 0);
}

#[test]
fn charge_methods_without_a_negotiated_rent_are_ignored() {
    let harness = harness();
    issue_reviewed_lease(&harness, ChargeMethod::PercentageOfGrossTurnoverInArrears);

    let report = review_job(&harness)
        .run(date(2026, 8, 1))
        .expect("run succeeds");
    assert_eq!(report.approvals_checked, 1);
    assert_eq!(report.reminders_sent, 0);
}
