//! Daily reminder runs chasing finance on manually maintained figures.
//!
//! Custom-CPI approvals need the negotiated percentage entered by hand each
//! year, so that run warns 60 and then 45 days before the next invoicing
//! period starts if the figure is still missing. Crown land rent reviews are
//! chased 12 and 6 months out and on the review day itself. Every reminder
//! is logged and sent at most once; re-running a job on the same day is a
//! no-op.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

use crate::charges::finance::add_months;
use crate::charges::ChargeMethod;
use crate::error::WorkflowError;
use crate::invoicing::details::ApprovalPeriod;
use crate::ports::{Notification, NotificationSender};
use crate::store::{ApprovalStore, InvoicingStore, ProposalStore, ReminderLogStore};

/// Days before the next sequential year starts at which a reminder goes out.
pub const REMINDER_THRESHOLDS: [u16; 2] = [60, 45];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderRunReport {
    pub approvals_checked: usize,
    pub reminders_sent: usize,
    pub errors: usize,
}

pub struct CustomCpiReminderJob<S, N> {
    store: Arc<S>,
    notifications: Arc<N>,
}

impl<S, N> CustomCpiReminderJob<S, N>
where
    S: ApprovalStore + ProposalStore + InvoicingStore + ReminderLogStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// One failing approval never stops the rest of the pass.
    pub fn run(&self, today: NaiveDate) -> Result<ReminderRunReport, WorkflowError> {
        let mut report = ReminderRunReport::default();
        for approval in self.store.current_approvals()? {
            report.approvals_checked += 1;
            if let Err(error) = self.check_approval(&approval.id, today, &mut report) {
                report.errors += 1;
                warn!(approval = %approval.id, %error, "custom CPI reminder check failed");
            }
        }
        info!(
            checked = report.approvals_checked,
            sent = report.reminders_sent,
            errors = report.errors,
            "custom CPI reminder run finished"
        );
        Ok(report)
    }

    fn check_approval(
        &self,
        approval_id: &crate::proposals::domain::ApprovalId,
        today: NaiveDate,
        report: &mut ReminderRunReport,
    ) -> Result<(), WorkflowError> {
        let approval = self.store.approval(*approval_id)?;
        let proposal = self.store.proposal(approval.current_proposal)?;
        let Some(details_id) = proposal.invoicing_details else {
            return Ok(());
        };
        let details = self.store.invoicing_details(details_id)?;
        if details.charge_method != ChargeMethod::BaseFeePlusAnnualCpiCustom {
            return Ok(());
        }

        let period = ApprovalPeriod {
            start: approval.start_date,
            expiry: approval.expiry_date,
        };
        for year in period.sequential_years() {
            // Year one invoices on the base fee alone.
            if year.index <= 1 || year.start <= today {
                continue;
            }
            let figure_entered = details
                .custom_cpi_entries
                .iter()
                .any(|entry| entry.year == year.index && entry.percentage.is_some());
            if figure_entered {
                continue;
            }
            let days_until = (year.start - today).num_days();
            for threshold in REMINDER_THRESHOLDS {
                if days_until > i64::from(threshold) {
                    continue;
                }
                if self
                    .store
                    .reminder_sent(approval.id, year.index, threshold)?
                {
                    continue;
                }
                self.notifications
                    .send(Notification::CustomCpiFigureDue {
                        approval: approval.id,
                        year: year.index,
                        days_before_invoicing: threshold,
                    })
                    .map_err(WorkflowError::from)?;
                self.store.record_reminder(approval.id, year.index, threshold)?;
                report.reminders_sent += 1;
                info!(
                    approval = %approval.id,
                    year = year.index,
                    threshold,
                    "custom CPI figure reminder sent"
                );
            }
        }
        Ok(())
    }
}

/// Months before a crown land rent review at which a reminder goes out; zero
/// fires on the review day itself.
pub const RENT_REVIEW_THRESHOLDS_MONTHS: [u16; 3] = [12, 6, 0];

/// Chases upcoming crown land rent reviews for base-fee charge methods.
pub struct CrownLandRentReviewReminderJob<S, N> {
    store: Arc<S>,
    notifications: Arc<N>,
}

impl<S, N> CrownLandRentReviewReminderJob<S, N>
where
    S: ApprovalStore + ProposalStore + InvoicingStore + ReminderLogStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub fn run(&self, today: NaiveDate) -> Result<ReminderRunReport, WorkflowError> {
        let mut report = ReminderRunReport::default();
        for approval in self.store.current_approvals()? {
            report.approvals_checked += 1;
            if let Err(error) = self.check_approval(&approval.id, today, &mut report) {
                report.errors += 1;
                warn!(approval = %approval.id, %error, "rent review reminder check failed");
            }
        }
        info!(
            checked = report.approvals_checked,
            sent = report.reminders_sent,
            errors = report.errors,
            "crown land rent review reminder run finished"
        );
        Ok(report)
    }

    fn check_approval(
        &self,
        approval_id: &crate::proposals::domain::ApprovalId,
        today: NaiveDate,
        report: &mut ReminderRunReport,
    ) -> Result<(), WorkflowError> {
        let approval = self.store.approval(*approval_id)?;
        let proposal = self.store.proposal(approval.current_proposal)?;
        let Some(details_id) = proposal.invoicing_details else {
            return Ok(());
        };
        let details = self.store.invoicing_details(details_id)?;
        // Only base-fee rents are renegotiated at a review.
        if !details.charge_method.uses_base_fee() {
            return Ok(());
        }

        for review_date in &details.crown_land_rent_review_dates {
            if *review_date < today {
                continue;
            }
            for months in RENT_REVIEW_THRESHOLDS_MONTHS {
                if add_months(today, u32::from(months)) < *review_date {
                    continue;
                }
                if self
                    .store
                    .review_reminder_sent(approval.id, *review_date, months)?
                {
                    continue;
                }
                self.notifications
                    .send(Notification::CrownLandRentReviewDue {
                        approval: approval.id,
                        review_date: *review_date,
                        months_until_review: months,
                    })
                    .map_err(WorkflowError::from)?;
                self.store
                    .record_review_reminder(approval.id, *review_date, months)?;
                report.reminders_sent += 1;
                info!(
                    approval = %approval.id,
                    review = %review_date,
                    months,
                    "crown land rent review reminder sent"
                );
            }
        }
        Ok(())
    }
}
