//! Compliance generation: turning approved requirements into dated
//! obligations, one per occurrence, idempotently.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

use crate::charges::finance::{
    add_months, end_of_month, financial_quarters_in_range, financial_years_in_range,
    months_in_range,
};
use crate::charges::{ChargeMethod, RepetitionType};
use crate::error::WorkflowError;
use crate::invoicing::details::InvoicingDetails;
use crate::proposals::domain::{
    Approval, Compliance, ComplianceId, ComplianceStatus, Proposal, ProposalId,
    ProposalRequirement, RequirementId, GROSS_TURNOVER_STATEMENT_ANNUALLY,
    GROSS_TURNOVER_STATEMENT_MONTHLY, GROSS_TURNOVER_STATEMENT_QUARTERLY,
};
use crate::store::{ComplianceStore, RequirementStore};

fn is_gross_turnover_code(code: &str) -> bool {
    matches!(
        code,
        GROSS_TURNOVER_STATEMENT_ANNUALLY
            | GROSS_TURNOVER_STATEMENT_QUARTERLY
            | GROSS_TURNOVER_STATEMENT_MONTHLY
    )
}

/// Generates compliances for an approval's requirements.
pub struct ComplianceEngine<S> {
    store: Arc<S>,
}

impl<S> ComplianceEngine<S>
where
    S: RequirementStore + ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create one `future` compliance per occurrence of each live requirement,
    /// stepping recurrences until they pass the approval expiry. Re-running
    /// never duplicates an occurrence: creation is keyed on
    /// (requirement, due date).
    pub fn generate_compliances(
        &self,
        proposal: &Proposal,
        approval: &Approval,
        details: &InvoicingDetails,
        today: NaiveDate,
    ) -> Result<usize, WorkflowError> {
        let mut created = 0;
        for requirement in self.store.requirements_for_proposal(proposal.id)? {
            if requirement.is_deleted {
                continue;
            }
            if requirement
                .standard_code()
                .is_some_and(is_gross_turnover_code)
            {
                continue;
            }
            created +=
                self.generate_requirement_compliances(proposal, approval, &requirement, today)?;
        }
        created += self.generate_gross_turnover_compliances(proposal, approval, details, today)?;
        info!(proposal = %proposal.id, approval = %approval.id, created, "compliances generated");
        Ok(created)
    }

    fn generate_requirement_compliances(
        &self,
        proposal: &Proposal,
        approval: &Approval,
        requirement: &ProposalRequirement,
        today: NaiveDate,
    ) -> Result<usize, WorkflowError> {
        let Some(first_due) = requirement.due_date else {
            return Ok(0);
        };
        if first_due < today {
            return Ok(0);
        }

        let mut created = 0;
        let mut due = first_due;
        loop {
            if due > approval.expiry_date {
                break;
            }
            created += usize::from(self.get_or_create(
                proposal.id,
                approval,
                requirement.id,
                due,
                None,
            )?);
            match requirement.recurrence {
                Some(recurrence) => due = recurrence.advance(due),
                None => break,
            }
        }
        Ok(created)
    }

    fn generate_gross_turnover_compliances(
        &self,
        proposal: &Proposal,
        approval: &Approval,
        details: &InvoicingDetails,
        today: NaiveDate,
    ) -> Result<usize, WorkflowError> {
        let requirements = self.store.requirements_for_proposal(proposal.id)?;
        let live = |code: &str| {
            requirements
                .iter()
                .find(|requirement| {
                    !requirement.is_deleted && requirement.standard_code() == Some(code)
                })
                .cloned()
        };
        if !requirements.iter().any(|requirement| {
            !requirement.is_deleted
                && requirement
                    .standard_code()
                    .is_some_and(is_gross_turnover_code)
        }) {
            return Ok(0);
        }

        let mut created = 0;

        match live(GROSS_TURNOVER_STATEMENT_ANNUALLY) {
            Some(annual) => {
                for financial_year in
                    financial_years_in_range(approval.start_date, approval.expiry_date)
                {
                    let due = NaiveDate::from_ymd_opt(financial_year.end_year(), 10, 31)
                        .unwrap_or(financial_year.end());
                    created += usize::from(self.get_or_create(
                        proposal.id,
                        approval,
                        annual.id,
                        due,
                        Some(format!(
                            "Please enter the gross turnover and upload an audited financial \
                             statement for the financial year {financial_year}"
                        )),
                    )?);
                }
            }
            None => {
                warn!(proposal = %proposal.id, "annual gross turnover requirement missing");
            }
        }

        let cadence = match details.charge_method {
            ChargeMethod::PercentageOfGrossTurnoverInArrears => details.turnover_repetition(),
            _ => RepetitionType::Annually,
        };

        if cadence == RepetitionType::Quarterly {
            if let Some(quarterly) = live(GROSS_TURNOVER_STATEMENT_QUARTERLY) {
                for quarter in
                    financial_quarters_in_range(approval.start_date, approval.expiry_date)
                {
                    let due = add_months(quarter.end(), 4);
                    created += usize::from(self.get_or_create(
                        proposal.id,
                        approval,
                        quarterly.id,
                        due,
                        Some(format!(
                            "Please enter the gross turnover and upload a financial \
                             statement for {}",
                            quarter.label()
                        )),
                    )?);
                }
            }
            self.discard_future_statement_compliances(
                proposal.id,
                &requirements,
                GROSS_TURNOVER_STATEMENT_MONTHLY,
                today,
            )?;
        }

        if cadence == RepetitionType::Monthly {
            if let Some(monthly) = live(GROSS_TURNOVER_STATEMENT_MONTHLY) {
                for month in months_in_range(approval.start_date, approval.expiry_date) {
                    let due = add_months(end_of_month(month), 2);
                    created += usize::from(self.get_or_create(
                        proposal.id,
                        approval,
                        monthly.id,
                        due,
                        Some(format!(
                            "Please enter the gross turnover and upload a financial \
                             statement for {}",
                            month.format("%B %Y")
                        )),
                    )?);
                }
            }
            self.discard_future_statement_compliances(
                proposal.id,
                &requirements,
                GROSS_TURNOVER_STATEMENT_QUARTERLY,
                today,
            )?;
        }

        Ok(created)
    }

    /// Returns true when a new compliance row was created.
    fn get_or_create(
        &self,
        proposal: ProposalId,
        approval: &Approval,
        requirement: RequirementId,
        due_date: NaiveDate,
        text: Option<String>,
    ) -> Result<bool, WorkflowError> {
        if self.store.find_compliance(requirement, due_date)?.is_some() {
            return Ok(false);
        }
        self.store.insert_compliance(Compliance {
            id: ComplianceId(0),
            proposal,
            approval: approval.id,
            requirement,
            due_date,
            status: ComplianceStatus::Future,
            text,
            reminder_sent: false,
        })?;
        Ok(true)
    }

    fn discard_future_statement_compliances(
        &self,
        proposal: ProposalId,
        requirements: &[ProposalRequirement],
        code: &str,
        today: NaiveDate,
    ) -> Result<(), WorkflowError> {
        let Some(requirement) = requirements
            .iter()
            .find(|requirement| requirement.standard_code() == Some(code))
        else {
            return Ok(());
        };

        let mut discarded = 0;
        for mut compliance in self.store.compliances_for_requirement(requirement.id)? {
            if compliance.status == ComplianceStatus::Future && compliance.due_date > today {
                compliance.status = ComplianceStatus::Discarded;
                self.store.update_compliance(compliance)?;
                discarded += 1;
            }
        }
        if discarded > 0 {
            info!(%proposal, code, discarded, "future statement compliances discarded");
        }
        Ok(())
    }

    /// For an amendment, move obligations already raised under the previous
    /// proposal across to the new one. Compliances of a requirement the
    /// amendment dropped are discarded; the rest are re-pointed, never
    /// duplicated.
    pub fn repoint_amendment_compliances(
        &self,
        previous: &Proposal,
        amended: &Proposal,
        approval: &Approval,
    ) -> Result<(), WorkflowError> {
        for requirement in self.store.requirements_for_proposal(amended.id)? {
            let Some(copied_from) = requirement.copied_from else {
                continue;
            };
            for mut compliance in self.store.compliances_for_requirement(copied_from)? {
                if compliance.proposal != previous.id {
                    continue;
                }
                if !matches!(
                    compliance.status,
                    ComplianceStatus::Due | ComplianceStatus::Overdue
                ) {
                    continue;
                }
                if requirement.is_deleted {
                    compliance.status = ComplianceStatus::Discarded;
                } else {
                    compliance.proposal = amended.id;
                    compliance.approval = approval.id;
                    compliance.requirement = requirement.id;
                }
                self.store.update_compliance(compliance)?;
            }
        }
        Ok(())
    }
}

// Month formatting only; creation paths are exercised through the service
// integration suites.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gross_turnover_codes_are_recognised() {
        assert!(is_gross_turnover_code(GROSS_TURNOVER_STATEMENT_ANNUALLY));
        assert!(is_gross_turnover_code(GROSS_TURNOVER_STATEMENT_MONTHLY));
        assert!(!is_gross_turnover_code("public_liability_insurance"));
    }
}
