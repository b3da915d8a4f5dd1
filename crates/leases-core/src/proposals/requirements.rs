//! Requirement generation: default conditions attached during assessment and
//! the gross-turnover statement requirements derived from the invoicing
//! configuration.

use chrono::{Datelike, Duration, NaiveDate};
use std::sync::Arc;
use tracing::info;

use crate::charges::finance::{
    add_months, end_of_month, end_of_next_financial_year, FinancialQuarter,
};
use crate::charges::{ChargeMethod, RepetitionType};
use crate::error::WorkflowError;
use crate::invoicing::details::InvoicingDetails;
use crate::proposals::domain::{
    ComplianceStatus, ProposalId, ProposalRequirement, Recurrence, RecurrencePattern,
    RequirementId, RequirementSource, StandardRequirement, GROSS_TURNOVER_STATEMENT_ANNUALLY,
    GROSS_TURNOVER_STATEMENT_MONTHLY, GROSS_TURNOVER_STATEMENT_QUARTERLY,
};
use crate::store::{ComplianceStore, RequirementStore};

/// The built-in standard requirement catalogue.
pub fn standard_requirement_catalogue() -> Vec<StandardRequirement> {
    vec![
        StandardRequirement {
            code: "public_liability_insurance".to_string(),
            text: "Maintain public liability insurance for the term of the approval"
                .to_string(),
            is_default: true,
            gross_turnover_required: false,
            application_type: None,
        },
        StandardRequirement {
            code: "site_condition_report".to_string(),
            text: "Submit an annual site condition report".to_string(),
            is_default: true,
            gross_turnover_required: false,
            application_type: None,
        },
        StandardRequirement {
            code: GROSS_TURNOVER_STATEMENT_ANNUALLY.to_string(),
            text: "Submit an audited financial statement for each financial year"
                .to_string(),
            is_default: false,
            gross_turnover_required: true,
            application_type: None,
        },
        StandardRequirement {
            code: GROSS_TURNOVER_STATEMENT_QUARTERLY.to_string(),
            text: "Submit a financial statement for each financial quarter".to_string(),
            is_default: false,
            gross_turnover_required: true,
            application_type: None,
        },
        StandardRequirement {
            code: GROSS_TURNOVER_STATEMENT_MONTHLY.to_string(),
            text: "Submit a financial statement for each month".to_string(),
            is_default: false,
            gross_turnover_required: true,
            application_type: None,
        },
    ]
}

/// Creates and reconciles proposal requirements against a store.
pub struct RequirementEngine<S> {
    store: Arc<S>,
    catalogue: Vec<StandardRequirement>,
}

impl<S> RequirementEngine<S>
where
    S: RequirementStore + ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>, catalogue: Vec<StandardRequirement>) -> Self {
        Self { store, catalogue }
    }

    pub fn catalogue(&self) -> &[StandardRequirement] {
        &self.catalogue
    }

    /// Attach the catalogue's default requirements the first time a proposal
    /// reaches conditions editing. A proposal that already has requirements
    /// is left untouched.
    pub fn add_default_requirements(&self, proposal: ProposalId) -> Result<usize, WorkflowError> {
        if !self.store.requirements_for_proposal(proposal)?.is_empty() {
            return Ok(0);
        }

        let mut added = 0;
        for (index, standard) in self
            .catalogue
            .iter()
            .filter(|standard| standard.is_default)
            .enumerate()
        {
            self.store.insert_requirement(ProposalRequirement {
                id: RequirementId(0),
                proposal,
                source: RequirementSource::Standard {
                    code: standard.code.clone(),
                },
                due_date: None,
                reminder_date: None,
                recurrence: None,
                is_deleted: false,
                copied_from: None,
                copied_for_renewal: false,
                order: index as u32 + 1,
            })?;
            added += 1;
        }
        info!(%proposal, added, "default requirements attached");
        Ok(added)
    }

    /// Generate the gross-turnover statement requirements for the approval
    /// term. Safe to re-run after a finance officer edits the charge method:
    /// existing rows are updated in place and rows that no longer apply are
    /// soft deleted together with their future compliances.
    pub fn update_gross_turnover_requirements(
        &self,
        proposal: ProposalId,
        details: &InvoicingDetails,
        approval_start: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), WorkflowError> {
        if !details.charge_method.is_gross_turnover() {
            return Ok(());
        }

        // Every gross-turnover approval submits annual statements.
        let fy_end = end_of_next_financial_year(approval_start);
        let annual_due = NaiveDate::from_ymd_opt(fy_end.year(), 10, 31).unwrap_or(fy_end);
        self.upsert_statement_requirement(
            proposal,
            GROSS_TURNOVER_STATEMENT_ANNUALLY,
            annual_due,
            Some(fy_end + Duration::days(1)),
            Recurrence {
                pattern: RecurrencePattern::Yearly,
                every: 1,
            },
        )?;

        // Arrears approvals additionally submit quarterly or monthly
        // statements; the two cadences are mutually exclusive.
        let cadence = match details.charge_method {
            ChargeMethod::PercentageOfGrossTurnoverInArrears => details.turnover_repetition(),
            _ => RepetitionType::Annually,
        };
        match cadence {
            RepetitionType::Quarterly => {
                let first_quarter_end = FinancialQuarter::from_date(approval_start).end();
                self.upsert_statement_requirement(
                    proposal,
                    GROSS_TURNOVER_STATEMENT_QUARTERLY,
                    first_quarter_end + Duration::days(30),
                    None,
                    Recurrence {
                        pattern: RecurrencePattern::Monthly,
                        every: 3,
                    },
                )?;
                self.retire_statement_requirement(
                    proposal,
                    GROSS_TURNOVER_STATEMENT_MONTHLY,
                    today,
                )?;
            }
            RepetitionType::Monthly => {
                self.upsert_statement_requirement(
                    proposal,
                    GROSS_TURNOVER_STATEMENT_MONTHLY,
                    add_months(end_of_month(approval_start), 1),
                    None,
                    Recurrence {
                        pattern: RecurrencePattern::Monthly,
                        every: 1,
                    },
                )?;
                self.retire_statement_requirement(
                    proposal,
                    GROSS_TURNOVER_STATEMENT_QUARTERLY,
                    today,
                )?;
            }
            RepetitionType::Annually => {
                self.retire_statement_requirement(
                    proposal,
                    GROSS_TURNOVER_STATEMENT_QUARTERLY,
                    today,
                )?;
                self.retire_statement_requirement(
                    proposal,
                    GROSS_TURNOVER_STATEMENT_MONTHLY,
                    today,
                )?;
            }
        }
        Ok(())
    }

    fn upsert_statement_requirement(
        &self,
        proposal: ProposalId,
        code: &str,
        due_date: NaiveDate,
        reminder_date: Option<NaiveDate>,
        recurrence: Recurrence,
    ) -> Result<ProposalRequirement, WorkflowError> {
        let existing = self
            .store
            .requirements_for_proposal(proposal)?
            .into_iter()
            .find(|requirement| requirement.standard_code() == Some(code));

        let requirement = match existing {
            Some(mut requirement) => {
                requirement.due_date = Some(due_date);
                requirement.reminder_date = reminder_date;
                requirement.recurrence = Some(recurrence);
                requirement.is_deleted = false;
                self.store.update_requirement(requirement.clone())?;
                requirement
            }
            None => {
                let order = self
                    .store
                    .requirements_for_proposal(proposal)?
                    .iter()
                    .map(|requirement| requirement.order)
                    .max()
                    .unwrap_or(0)
                    + 1;
                let requirement = self.store.insert_requirement(ProposalRequirement {
                    id: RequirementId(0),
                    proposal,
                    source: RequirementSource::Standard {
                        code: code.to_string(),
                    },
                    due_date: Some(due_date),
                    reminder_date,
                    recurrence: Some(recurrence),
                    is_deleted: false,
                    copied_from: None,
                    copied_for_renewal: false,
                    order,
                })?;
                info!(%proposal, code, %due_date, "gross turnover requirement created");
                requirement
            }
        };
        Ok(requirement)
    }

    /// Soft-delete a statement requirement that no longer applies and discard
    /// its not-yet-due compliances.
    fn retire_statement_requirement(
        &self,
        proposal: ProposalId,
        code: &str,
        today: NaiveDate,
    ) -> Result<(), WorkflowError> {
        let Some(mut requirement) = self
            .store
            .requirements_for_proposal(proposal)?
            .into_iter()
            .find(|requirement| {
                requirement.standard_code() == Some(code) && !requirement.is_deleted
            })
        else {
            return Ok(());
        };

        requirement.is_deleted = true;
        self.store.update_requirement(requirement.clone())?;

        let mut discarded = 0;
        for mut compliance in self.store.compliances_for_requirement(requirement.id)? {
            if compliance.status == ComplianceStatus::Future && compliance.due_date > today {
                compliance.status = ComplianceStatus::Discarded;
                self.store.update_compliance(compliance)?;
                discarded += 1;
            }
        }
        info!(%proposal, code, discarded, "gross turnover requirement retired");
        Ok(())
    }
}
