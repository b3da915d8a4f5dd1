//! Daily invoice generation for recurring charge methods.
//!
//! Walks every current approval whose proposal is fully approved and raises
//! the scheduled invoices whose cover period has started. No-charge and
//! once-off approvals have nothing recurring, and gross-turnover rent is
//! raised from compliance figures rather than a schedule, so all three are
//! skipped. Creation is keyed on (approval, cover start); re-running the job
//! raises nothing twice.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::charges::cpi::CpiTable;
use crate::charges::ChargeMethod;
use crate::error::WorkflowError;
use crate::invoicing::details::ApprovalPeriod;
use crate::invoicing::ledger::Invoice;
use crate::ports::{Notification, NotificationSender};
use crate::proposals::domain::{Approval, ProcessingStatus};
use crate::store::{ApprovalStore, InvoiceStore, InvoicingStore, ProposalStore};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRunReport {
    pub approvals_processed: usize,
    pub invoices_created: usize,
    pub errors: usize,
}

pub struct InvoiceGenerationJob<S, N> {
    store: Arc<S>,
    notifications: Arc<N>,
    cpi: CpiTable,
    gst_rate: Decimal,
}

impl<S, N> InvoiceGenerationJob<S, N>
where
    S: ApprovalStore + ProposalStore + InvoicingStore + InvoiceStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>, cpi: CpiTable, gst_rate: Decimal) -> Self {
        Self {
            store,
            notifications,
            cpi,
            gst_rate,
        }
    }

    /// One failing approval never stops the rest of the pass.
    pub fn run(&self, today: NaiveDate) -> Result<GenerationRunReport, WorkflowError> {
        let mut report = GenerationRunReport::default();
        for approval in self.store.current_approvals()? {
            match self.generate_for_approval(&approval, today) {
                Ok(created) => {
                    report.approvals_processed += 1;
                    report.invoices_created += created;
                }
                Err(error) => {
                    report.errors += 1;
                    warn!(approval = %approval.id, %error, "invoice generation failed");
                }
            }
        }
        info!(
            processed = report.approvals_processed,
            created = report.invoices_created,
            errors = report.errors,
            "invoice generation run finished"
        );
        Ok(report)
    }

    fn generate_for_approval(
        &self,
        approval: &Approval,
        today: NaiveDate,
    ) -> Result<usize, WorkflowError> {
        let proposal = self.store.proposal(approval.current_proposal)?;
        if proposal.processing_status != ProcessingStatus::Approved {
            return Ok(0);
        }
        let Some(details_id) = proposal.invoicing_details else {
            return Ok(0);
        };
        let details = self.store.invoicing_details(details_id)?;
        if matches!(
            details.charge_method,
            ChargeMethod::NoRentOrLicenceCharge
                | ChargeMethod::OnceOffCharge
                | ChargeMethod::PercentageOfGrossTurnoverInArrears
                | ChargeMethod::PercentageOfGrossTurnoverInAdvance
        ) {
            return Ok(0);
        }

        let schedule = details.invoice_schedule(
            ApprovalPeriod {
                start: approval.start_date,
                expiry: approval.expiry_date,
            },
            &self.cpi,
            self.gst_rate,
            approval.approval_type.gst_free,
        )?;
        let existing = self.store.invoices_for_approval(approval.id)?;

        let mut created = 0;
        for entry in schedule {
            if entry.cover_start > today {
                continue;
            }
            let already_raised = existing
                .iter()
                .any(|invoice| invoice.cover_start == Some(entry.cover_start));
            if already_raised {
                continue;
            }
            let mut invoice = Invoice::pending(
                approval.id,
                entry.amount_incl_tax,
                approval.approval_type.gst_free,
            );
            invoice.cover_start = Some(entry.cover_start);
            invoice.cover_end = Some(entry.cover_end);
            let invoice = self.store.insert_invoice(invoice)?;
            if let Err(error) = self.notifications.send(Notification::InvoiceRaised {
                approval: approval.id,
                invoice_uuid: invoice.uuid,
            }) {
                warn!(approval = %approval.id, %error, "invoice notification failed");
            }
            created += 1;
        }
        Ok(created)
    }
}
