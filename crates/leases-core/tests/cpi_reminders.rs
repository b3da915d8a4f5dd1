mod common;

use std::sync::Arc;

use common::*;
use rust_decimal_macros::dec;
use leases_core::charges::ChargeMethod;
use leases_core::invoicing::details::CustomCpiEntry;
use leases_core::invoicing::reminders::CustomCpiReminderJob;
use leases_core::ports::Notification;
use leases_core::proposals::domain::Proposal;

fn issue_custom_cpi_lease(harness: &Harness) -> Proposal {
    let (proposal, _) = issue_lease(
        harness,
        ChargeMethod::BaseFeePlusAnnualCpiCustom,
        date(2025, 7, 1),
        date(2027, 6, 30),
        date(2025, 6, 10),
    );
    let mut details = harness
        .service
        .invoicing_details_for(proposal.id)
        .expect("details exist");
    details.base_fee = Some(dec!(8000));
    harness
        .service
        .update_invoicing_details(FINANCE, proposal.id, details, date(2025, 6, 10))
        .expect("details updated");
    proposal
}

fn reminder_job(
    harness: &Harness,
) -> CustomCpiReminderJob<leases_core::store::InMemoryLeasingStore, RecordingSender> {
    CustomCpiReminderJob::new(Arc::clone(&harness.store), Arc::clone(&harness.notifications))
}

#[test]
fn a_missing_figure_is_chased_sixty_days_out() {
    let harness = harness();
    issue_custom_cpi_lease(&harness);
    let job = reminder_job(&harness);

    // 52 days before year two starts on 2026-07-01: inside the 60-day
    // threshold, not yet inside the 45-day one.
    let report = job.run(date(2026, 5, 10)).expect("run succeeds");
    assert_eq!(report.approvals_checked, 1);
    assert_eq!(report.reminders_sent, 1);

    let reminders: Vec<_> = harness
        .notifications
        .events()
        .into_iter()
        .filter(|event| matches!(event, Notification::CustomCpiFigureDue { .. }))
        .collect();
    assert_eq!(reminders.len(), 1);
    assert!(matches!(
        &reminders[0],
        Notification::CustomCpiFigureDue {
            year: 2,
            days_before_invoicing: 60,
            ..
        }
    ));
}

#[test]
fn each_threshold_fires_at_most_once() {
    let harness = harness();
    issue_custom_cpi_lease(&harness);
    let job = reminder_job(&harness);

    assert_eq!(
        job.run(date(2026, 5, 10)).expect("run succeeds").reminders_sent,
        1
    );
    // Same day again: the 60-day reminder is already logged.
    assert_eq!(
        job.run(date(2026, 5, 10)).expect("run succeeds").reminders_sent,
        0
    );
    // 42 days out: only the 45-day threshold is newly crossed.
    assert_eq!(
        job.run(date(2026, 5, 20)).expect("run succeeds").reminders_sent,
        1
    );
    assert_eq!(
        job.run(date(2026, 5, 21)).expect("run succeeds").reminders_sent,
        0
    );
}

#[test]
fn an_entered_figure_silences_the_reminders() {
    let harness = harness();
    let proposal = issue_custom_cpi_lease(&harness);

    let mut details = harness
        .service
        .invoicing_details_for(proposal.id)
        .expect("details exist");
    details.custom_cpi_entries = vec![CustomCpiEntry {
        year: 2,
        percentage: Some(dec!(3.2)),
    }];
    harness
        .service
        .update_invoicing_details(FINANCE, proposal.id, details, date(2026, 5, 1))
        .expect("details updated");

    let report = reminder_job(&harness)
        .run(date(2026, 5, 10))
        .expect("run succeeds");
    assert_eq!(report.reminders_sent, 0);
}

#[test]
fn other_charge_methods_are_ignored() {
    let harness = harness();
    issue_lease(
        &harness,
        ChargeMethod::BaseFeePlusAnnualCpi,
        date(2025, 7, 1),
        date(2027, 6, 30),
        date(2025, 6, 10),
    );

    let report = reminder_job(&harness)
        .run(date(2026, 5, 10))
        .expect("run succeeds");
    assert_eq!(report.approvals_checked, 1);
    assert_eq!(report.reminders_sent, 0);
}

#[test]
fn years_already_started_are_not_chased() {
    let harness = harness();
    issue_custom_cpi_lease(&harness);

    // Year two has already begun; the missed figure is finance's problem in
    // the invoicing run, not the reminder job's.
    let report = reminder_job(&harness)
        .run(date(2026, 8, 1))
        .expect("run succeeds");
    assert_eq!(report.reminders_sent, 0);
}
