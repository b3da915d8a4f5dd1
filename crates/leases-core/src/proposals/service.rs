//! The proposal state machine: lodgement, assessment movements, referrals,
//! decline, approval issuance, renewal and amendment cloning, and the finance
//! hand-off that closes invoicing editing.
//!
//! Every state-changing operation re-reads the proposal, validates against
//! the observed status, and lands its write through the store's
//! compare-and-update primitive, so two officers racing on the same proposal
//! cannot both succeed.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::charges::cpi::CpiTable;
use crate::charges::ChargeMethod;
use crate::compliances::ComplianceEngine;
use crate::error::WorkflowError;
use crate::invoicing::details::{ApprovalPeriod, InvoicingDetails};
use crate::invoicing::ledger::Invoice;
use crate::ports::{
    DocumentCategory, DocumentStore, IdentityDirectory, Notification, NotificationSender,
};
use crate::proposals::domain::{
    Applicant, ApplicationType, Approval, ApprovalId, ApprovalStatus, ApprovalType,
    CompetitiveProcessId, IssuanceDecision, OrganisationId, PostalAddress, ProcessingStatus,
    Proposal, ProposalGeometry, ProposalId, ProposalRequirement, ProposalType, ProposedIssuance,
    Referral, ReferralId, ReferralOrigin, ReferralStatus, RequirementId, UserId,
};
use crate::proposals::requirements::RequirementEngine;
use crate::store::{
    ApprovalStore, ComplianceStore, InvoiceStore, InvoicingStore, ProposalStore, ReferralStore,
    RequirementStore, StoreError,
};

/// Everything needed to lodge a new proposal.
#[derive(Debug, Clone)]
pub struct LodgementRequest {
    pub proposal_type: ProposalType,
    pub application_type: ApplicationType,
    pub submitter: UserId,
    pub organisation: Option<OrganisationId>,
    pub individual: Option<UserId>,
    pub proxy: Option<UserId>,
    pub postal_address: Option<PostalAddress>,
    pub site_name: Option<String>,
    pub groups: Vec<String>,
}

/// Issuance details confirmed by the approver at `final_approval`.
#[derive(Debug, Clone, Default)]
pub struct IssuanceRequest {
    pub decision: Option<IssuanceDecision>,
    pub approval_type: Option<ApprovalType>,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub record_management_number: Option<String>,
    pub details: Option<String>,
    pub charge_method: Option<ChargeMethod>,
}

/// Outcome of a `final_approval` call, varying with the proposal branch.
#[derive(Debug, Clone)]
pub enum FinalApprovalOutcome {
    /// An approval was issued (or refreshed) and awaits invoicing editing.
    ApprovalReady {
        proposal: Proposal,
        approval: Approval,
    },
    /// A lease/licence application was spawned from a registration of interest.
    ApplicationGenerated {
        proposal: Proposal,
        generated: Proposal,
    },
    /// A competitive process was opened instead of a direct approval.
    CompetitiveProcessGenerated {
        proposal: Proposal,
        competitive_process: CompetitiveProcessId,
    },
}

pub struct ProposalService<S, D, N, C> {
    store: Arc<S>,
    identity: Arc<D>,
    notifications: Arc<N>,
    documents: Arc<C>,
    requirements: RequirementEngine<S>,
    compliances: ComplianceEngine<S>,
    cpi: CpiTable,
    gst_rate: Decimal,
}

impl<S, D, N, C> ProposalService<S, D, N, C>
where
    S: ProposalStore
        + ReferralStore
        + RequirementStore
        + ApprovalStore
        + ComplianceStore
        + InvoicingStore
        + InvoiceStore
        + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        identity: Arc<D>,
        notifications: Arc<N>,
        documents: Arc<C>,
        requirements: RequirementEngine<S>,
        cpi: CpiTable,
        gst_rate: Decimal,
    ) -> Self {
        let compliances = ComplianceEngine::new(Arc::clone(&store));
        Self {
            store,
            identity,
            notifications,
            documents,
            requirements,
            compliances,
            cpi,
            gst_rate,
        }
    }

    pub fn proposal(&self, id: ProposalId) -> Result<Proposal, WorkflowError> {
        Ok(self.store.proposal(id)?)
    }

    pub fn referrals(&self, id: ProposalId) -> Result<Vec<Referral>, WorkflowError> {
        Ok(self.store.referrals_for_proposal(id)?)
    }

    /// Lodge a draft proposal. The applicant is resolved once, here.
    pub fn lodge(&self, request: LodgementRequest) -> Result<Proposal, WorkflowError> {
        let applicant = Applicant::resolve(
            request.organisation,
            request.individual,
            request.proxy,
            request.submitter,
        );
        let proposal = self.store.insert_proposal(Proposal {
            id: ProposalId(0),
            proposal_type: request.proposal_type,
            application_type: request.application_type,
            processing_status: ProcessingStatus::Draft,
            prev_processing_status: None,
            applicant,
            submitter: request.submitter,
            postal_address: request.postal_address,
            site_name: request.site_name,
            groups: request.groups,
            geometries: Vec::new(),
            assigned_officer: None,
            assigned_approver: None,
            approver_comment: None,
            proposed_decline_reason: None,
            proposed_issuance: ProposedIssuance::default(),
            approval: None,
            invoicing_details: None,
            previous_application: None,
            generated_proposal: None,
            generated_competitive_process: None,
        })?;
        info!(proposal = %proposal.id, applicant = applicant.kind(), "proposal lodged");
        Ok(proposal)
    }

    /// Record a drawn geometry against an editable proposal.
    pub fn add_geometry(
        &self,
        actor: UserId,
        id: ProposalId,
    ) -> Result<Proposal, WorkflowError> {
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if !matches!(
            observed,
            ProcessingStatus::Draft | ProcessingStatus::AmendmentRequired
        ) {
            return Err(WorkflowError::Validation(
                "geometries can only be drawn while the proposal is editable".to_string(),
            ));
        }
        proposal.geometries.push(ProposalGeometry {
            drawn_by: actor,
            locked: false,
        });
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        Ok(proposal)
    }

    /// Submit a draft for assessment. Locks the submitter's geometries.
    pub fn submit(&self, actor: UserId, id: ProposalId) -> Result<Proposal, WorkflowError> {
        let mut proposal = self.store.proposal(id)?;
        if actor != proposal.submitter {
            return Err(WorkflowError::NotAuthorized);
        }
        let observed = proposal.processing_status;
        if !matches!(
            observed,
            ProcessingStatus::Draft | ProcessingStatus::AmendmentRequired
        ) {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: ProcessingStatus::WithAssessor,
            });
        }
        proposal.lock_geometries_drawn_by(actor);
        proposal.processing_status = ProcessingStatus::WithAssessor;
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        info!(proposal = %id, "proposal submitted for assessment");
        Ok(proposal)
    }

    /// Move a proposal between assessment stages.
    ///
    /// Calling with the current status is a no-op success: nothing is
    /// re-triggered, no default requirements are re-attached.
    pub fn move_to_status(
        &self,
        actor: UserId,
        id: ProposalId,
        target: ProcessingStatus,
        approver_comment: Option<String>,
    ) -> Result<Proposal, WorkflowError> {
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if observed == target {
            return Ok(proposal);
        }

        let roles = self.identity.roles(actor);
        match target {
            ProcessingStatus::WithAssessor | ProcessingStatus::WithAssessorConditions => {
                if !roles.is_assessor {
                    return Err(WorkflowError::NotAuthorized);
                }
            }
            ProcessingStatus::WithApprover => {
                if !roles.is_approver {
                    return Err(WorkflowError::NotAuthorized);
                }
            }
            ProcessingStatus::WithReferral | ProcessingStatus::WithReferralConditions => {
                if !self.is_pending_referee(actor, id)? {
                    return Err(WorkflowError::NotAuthorized);
                }
            }
            other => {
                return Err(WorkflowError::InvalidTransition {
                    from: observed,
                    to: other,
                })
            }
        }

        // Referrals must resolve before officers can pull the proposal back.
        if observed == ProcessingStatus::WithReferral
            && (target.is_assessor_target() || target == ProcessingStatus::WithApprover)
        {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: target,
            });
        }

        if matches!(
            observed,
            ProcessingStatus::Draft | ProcessingStatus::AmendmentRequired
        ) {
            proposal.lock_geometries_drawn_by(actor);
        }

        let sent_back = observed == ProcessingStatus::WithApprover && target.is_assessor_target();
        if sent_back {
            proposal.approver_comment = approver_comment.clone();
        }

        proposal.processing_status = target;
        self.store.update_proposal_if_status(observed, proposal.clone())?;

        if target == ProcessingStatus::WithAssessorConditions {
            self.requirements.add_default_requirements(id)?;
        }
        if sent_back {
            self.notify(Notification::SentBackToAssessor {
                proposal: id,
                comment: approver_comment.unwrap_or_default(),
            });
        }
        info!(proposal = %id, from = %observed, to = %target, "proposal moved");
        Ok(proposal)
    }

    /// Ask another officer for input. The proposal waits in a referral state
    /// until every referral resolves.
    pub fn send_referral(
        &self,
        actor: UserId,
        id: ProposalId,
        referee: UserId,
        text: String,
    ) -> Result<Referral, WorkflowError> {
        let roles = self.identity.roles(actor);
        if !roles.can_assess() {
            return Err(WorkflowError::NotAuthorized);
        }
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        let (sent_from, target) = match observed {
            ProcessingStatus::WithApprover => {
                (ReferralOrigin::Approver, ProcessingStatus::WithReferral)
            }
            ProcessingStatus::WithAssessor | ProcessingStatus::WithReferral => {
                (ReferralOrigin::Assessor, ProcessingStatus::WithReferral)
            }
            ProcessingStatus::WithAssessorConditions
            | ProcessingStatus::WithReferralConditions => (
                ReferralOrigin::Assessor,
                ProcessingStatus::WithReferralConditions,
            ),
            other => {
                return Err(WorkflowError::InvalidTransition {
                    from: other,
                    to: ProcessingStatus::WithReferral,
                })
            }
        };

        let referral = self
            .store
            .insert_referral(Referral {
                id: ReferralId(0),
                proposal: id,
                referee,
                sent_by: actor,
                sent_from,
                status: ReferralStatus::Pending,
                text,
                comment: None,
            })
            .map_err(|error| match error {
                StoreError::Conflict => WorkflowError::AlreadyExists(
                    "a referral to this user already exists for this proposal".to_string(),
                ),
                other => other.into(),
            })?;

        if observed != target {
            proposal.processing_status = target;
            self.store.update_proposal_if_status(observed, proposal)?;
        }
        self.notify(Notification::ReferralSent {
            proposal: id,
            referral: referral.id,
            referee,
        });
        info!(proposal = %id, referral = %referral.id, "referral sent");
        Ok(referral)
    }

    /// Complete a referral. Only once no other referral is still pending does
    /// the proposal return to the stage that dispatched it.
    pub fn complete_referral(
        &self,
        actor: UserId,
        referral_id: ReferralId,
        comment: Option<String>,
    ) -> Result<Referral, WorkflowError> {
        let mut referral = self.store.referral(referral_id)?;
        if referral.referee != actor {
            return Err(WorkflowError::NotAuthorized);
        }
        if referral.status != ReferralStatus::Pending {
            return Err(WorkflowError::Validation(
                "only a pending referral can be completed".to_string(),
            ));
        }
        referral.status = ReferralStatus::Completed;
        referral.comment = comment;
        self.store.update_referral(referral.clone())?;
        self.restore_after_referrals(referral.proposal, referral.sent_from)?;
        info!(referral = %referral_id, "referral completed");
        Ok(referral)
    }

    /// Recall a referral before the referee responds.
    pub fn recall_referral(
        &self,
        actor: UserId,
        referral_id: ReferralId,
    ) -> Result<Referral, WorkflowError> {
        let mut referral = self.store.referral(referral_id)?;
        let roles = self.identity.roles(actor);
        if referral.sent_by != actor && !roles.can_assess() {
            return Err(WorkflowError::NotAuthorized);
        }
        if referral.status != ReferralStatus::Pending {
            return Err(WorkflowError::Validation(
                "only a pending referral can be recalled".to_string(),
            ));
        }
        referral.status = ReferralStatus::Recalled;
        self.store.update_referral(referral.clone())?;
        self.restore_after_referrals(referral.proposal, referral.sent_from)?;
        info!(referral = %referral_id, "referral recalled");
        Ok(referral)
    }

    /// Send a recalled referral out again.
    pub fn resend_referral(
        &self,
        actor: UserId,
        referral_id: ReferralId,
    ) -> Result<Referral, WorkflowError> {
        let mut referral = self.store.referral(referral_id)?;
        let roles = self.identity.roles(actor);
        if referral.sent_by != actor && !roles.can_assess() {
            return Err(WorkflowError::NotAuthorized);
        }
        if referral.status != ReferralStatus::Recalled {
            return Err(WorkflowError::Validation(
                "only a recalled referral can be resent".to_string(),
            ));
        }
        referral.status = ReferralStatus::Pending;
        self.store.update_referral(referral.clone())?;

        let mut proposal = self.store.proposal(referral.proposal)?;
        let observed = proposal.processing_status;
        if !observed.is_referral_state() {
            proposal.processing_status = ProcessingStatus::WithReferral;
            self.store.update_proposal_if_status(observed, proposal)?;
        }
        self.notify(Notification::ReferralSent {
            proposal: referral.proposal,
            referral: referral.id,
            referee: referral.referee,
        });
        Ok(referral)
    }

    fn restore_after_referrals(
        &self,
        proposal_id: ProposalId,
        sent_from: ReferralOrigin,
    ) -> Result<(), WorkflowError> {
        let still_pending = self
            .store
            .referrals_for_proposal(proposal_id)?
            .iter()
            .any(|referral| referral.status == ReferralStatus::Pending);
        if still_pending {
            return Ok(());
        }
        let mut proposal = self.store.proposal(proposal_id)?;
        let observed = proposal.processing_status;
        if !observed.is_referral_state() {
            return Ok(());
        }
        proposal.processing_status = sent_from.return_status();
        self.store.update_proposal_if_status(observed, proposal)?;
        self.notify(Notification::ReferralsComplete {
            proposal: proposal_id,
        });
        Ok(())
    }

    fn is_pending_referee(&self, actor: UserId, id: ProposalId) -> Result<bool, WorkflowError> {
        Ok(self
            .store
            .referrals_for_proposal(id)?
            .iter()
            .any(|referral| {
                referral.referee == actor && referral.status == ReferralStatus::Pending
            }))
    }

    /// Assessor recommends declining; the approver gets the final say.
    pub fn propose_decline(
        &self,
        actor: UserId,
        id: ProposalId,
        reason: String,
    ) -> Result<Proposal, WorkflowError> {
        if !self.identity.roles(actor).is_assessor {
            return Err(WorkflowError::NotAuthorized);
        }
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if !observed.is_assessor_target() {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: ProcessingStatus::WithApprover,
            });
        }
        proposal.proposed_decline_reason = Some(reason);
        proposal.processing_status = ProcessingStatus::WithApprover;
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        info!(proposal = %id, "decline proposed");
        Ok(proposal)
    }

    pub fn final_decline(
        &self,
        actor: UserId,
        id: ProposalId,
        reason: String,
    ) -> Result<Proposal, WorkflowError> {
        if !self.identity.roles(actor).is_approver {
            return Err(WorkflowError::NotAuthorized);
        }
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if observed != ProcessingStatus::WithApprover {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: ProcessingStatus::Declined,
            });
        }
        proposal.proposed_decline_reason = Some(reason);
        proposal.processing_status = ProcessingStatus::Declined;
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        self.notify(Notification::ProposalDeclined { proposal: id });
        info!(proposal = %id, "proposal declined");
        Ok(proposal)
    }

    /// Park a proposal. The prior status is restored when the hold lifts.
    pub fn on_hold(&self, actor: UserId, id: ProposalId) -> Result<Proposal, WorkflowError> {
        self.park(actor, id, ProcessingStatus::OnHold)
    }

    pub fn on_hold_remove(&self, actor: UserId, id: ProposalId) -> Result<Proposal, WorkflowError> {
        self.unpark(actor, id, ProcessingStatus::OnHold)
    }

    pub fn send_to_qa_officer(
        &self,
        actor: UserId,
        id: ProposalId,
    ) -> Result<Proposal, WorkflowError> {
        self.park(actor, id, ProcessingStatus::WithQaOfficer)
    }

    pub fn return_from_qa_officer(
        &self,
        actor: UserId,
        id: ProposalId,
    ) -> Result<Proposal, WorkflowError> {
        self.unpark(actor, id, ProcessingStatus::WithQaOfficer)
    }

    fn park(
        &self,
        actor: UserId,
        id: ProposalId,
        parked: ProcessingStatus,
    ) -> Result<Proposal, WorkflowError> {
        if !self.identity.roles(actor).can_assess() {
            return Err(WorkflowError::NotAuthorized);
        }
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if observed.is_terminal() || observed == parked {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: parked,
            });
        }
        proposal.prev_processing_status = Some(observed);
        proposal.processing_status = parked;
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        Ok(proposal)
    }

    fn unpark(
        &self,
        actor: UserId,
        id: ProposalId,
        parked: ProcessingStatus,
    ) -> Result<Proposal, WorkflowError> {
        if !self.identity.roles(actor).can_assess() {
            return Err(WorkflowError::NotAuthorized);
        }
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if observed != parked {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: proposal
                    .prev_processing_status
                    .unwrap_or(ProcessingStatus::WithAssessor),
            });
        }
        proposal.processing_status = proposal
            .prev_processing_status
            .take()
            .unwrap_or(ProcessingStatus::WithAssessor);
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        Ok(proposal)
    }

    /// A submitter abandons their own draft.
    pub fn discard(&self, actor: UserId, id: ProposalId) -> Result<Proposal, WorkflowError> {
        let mut proposal = self.store.proposal(id)?;
        if actor != proposal.submitter {
            return Err(WorkflowError::NotAuthorized);
        }
        let observed = proposal.processing_status;
        if observed != ProcessingStatus::Draft {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: ProcessingStatus::Discarded,
            });
        }
        proposal.processing_status = ProcessingStatus::Discarded;
        self.store.update_proposal_if_status(observed, proposal.clone())?;
        Ok(proposal)
    }

    /// Issue (or refresh) the approval for a proposal.
    pub fn final_approval(
        &self,
        actor: UserId,
        id: ProposalId,
        request: IssuanceRequest,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FinalApprovalOutcome, WorkflowError> {
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;

        // Amendments arrive through payment-driven completion and skip the
        // with-approver gate.
        if proposal.proposal_type != ProposalType::Amendment {
            if !self.identity.roles(actor).can_assess() {
                return Err(WorkflowError::NotAuthorized);
            }
            if observed != ProcessingStatus::WithApprover {
                return Err(WorkflowError::InvalidTransition {
                    from: observed,
                    to: ProcessingStatus::Approved,
                });
            }
        }
        if proposal.postal_address.is_none() {
            return Err(WorkflowError::Validation(
                "applicant has no postal address on file".to_string(),
            ));
        }

        merge_issuance(&mut proposal.proposed_issuance, &request);
        proposal.proposed_issuance.approved_on = Some(now);
        proposal.proposed_issuance.approved_by = Some(actor);

        match (proposal.proposal_type, proposal.application_type) {
            (ProposalType::Renewal, ApplicationType::LeaseLicence)
            | (ProposalType::Amendment, ApplicationType::LeaseLicence) => {
                self.approve_successor(proposal, observed, today, now)
            }
            (ProposalType::New, ApplicationType::RegistrationOfInterest) => {
                self.approve_registration_of_interest(proposal, observed)
            }
            (ProposalType::New, ApplicationType::LeaseLicence) => {
                self.approve_new_lease_licence(proposal, observed, today, now)
            }
            _ => Err(WorkflowError::UnsupportedCombination),
        }
    }

    fn approve_new_lease_licence(
        &self,
        mut proposal: Proposal,
        observed: ProcessingStatus,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FinalApprovalOutcome, WorkflowError> {
        self.check_licence_documents(proposal.id)?;
        let (approval_type, start_date, expiry_date) = required_issuance(&proposal)?;

        // Reserve the status first so a racing approver fails fast with a
        // stale-state error before any child record exists.
        proposal.processing_status = ProcessingStatus::ApprovedEditingInvoicing;
        self.store
            .update_proposal_if_status(observed, proposal.clone())?;

        let approval = self.store.insert_approval(Approval {
            id: ApprovalId(0),
            approval_type,
            status: ApprovalStatus::Current,
            current_proposal: proposal.id,
            start_date,
            expiry_date,
            issue_date: now,
            record_management_number: proposal.proposed_issuance.record_management_number.clone(),
        })?;
        proposal.approval = Some(approval.id);

        let details = self.ensure_invoicing_details(&mut proposal, approval.id)?;
        self.requirements.update_gross_turnover_requirements(
            proposal.id,
            &details,
            approval.start_date,
            today,
        )?;
        self.compliances
            .generate_compliances(&proposal, &approval, &details, today)?;
        self.store.update_proposal(proposal.clone())?;

        self.notify(Notification::ApprovalIssued {
            proposal: proposal.id,
            approval: approval.id,
        });
        self.notify(Notification::ReadyForInvoicing {
            proposal: proposal.id,
            approval: approval.id,
        });
        info!(proposal = %proposal.id, approval = %approval.id, "approval issued");
        Ok(FinalApprovalOutcome::ApprovalReady { proposal, approval })
    }

    fn approve_successor(
        &self,
        mut proposal: Proposal,
        observed: ProcessingStatus,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FinalApprovalOutcome, WorkflowError> {
        let approval_id = proposal
            .approval
            .ok_or(WorkflowError::NotFound("approval"))?;
        self.check_licence_documents(proposal.id)?;
        let (_, start_date, expiry_date) = required_issuance(&proposal)?;

        proposal.processing_status = ProcessingStatus::ApprovedEditingInvoicing;
        self.store
            .update_proposal_if_status(observed, proposal.clone())?;

        let mut approval = self.store.approval(approval_id)?;
        let previous_proposal = approval.current_proposal;
        approval.current_proposal = proposal.id;
        approval.start_date = start_date;
        approval.expiry_date = expiry_date;
        approval.issue_date = now;
        self.store.update_approval(approval.clone())?;

        let details = self.ensure_invoicing_details(&mut proposal, approval.id)?;
        self.requirements.update_gross_turnover_requirements(
            proposal.id,
            &details,
            approval.start_date,
            today,
        )?;
        self.compliances
            .generate_compliances(&proposal, &approval, &details, today)?;

        if proposal.proposal_type == ProposalType::Amendment {
            let previous = self.store.proposal(previous_proposal)?;
            self.compliances
                .repoint_amendment_compliances(&previous, &proposal, &approval)?;
        }
        self.store.update_proposal(proposal.clone())?;

        self.notify(Notification::ReadyForInvoicing {
            proposal: proposal.id,
            approval: approval.id,
        });
        info!(proposal = %proposal.id, approval = %approval.id, "approval refreshed");
        Ok(FinalApprovalOutcome::ApprovalReady { proposal, approval })
    }

    fn approve_registration_of_interest(
        &self,
        mut proposal: Proposal,
        observed: ProcessingStatus,
    ) -> Result<FinalApprovalOutcome, WorkflowError> {
        match proposal.proposed_issuance.decision {
            Some(IssuanceDecision::ApproveLeaseLicence) => {
                if proposal.generated_proposal.is_some() {
                    return Err(WorkflowError::AlreadyGenerated("a lease/licence application"));
                }
                proposal.processing_status = ProcessingStatus::ApprovedApplication;
                self.store
                    .update_proposal_if_status(observed, proposal.clone())?;

                let generated = self.store.insert_proposal(Proposal {
                    id: ProposalId(0),
                    proposal_type: ProposalType::New,
                    application_type: ApplicationType::LeaseLicence,
                    processing_status: ProcessingStatus::Draft,
                    prev_processing_status: None,
                    applicant: proposal.applicant,
                    submitter: proposal.submitter,
                    postal_address: proposal.postal_address.clone(),
                    site_name: proposal.site_name.clone(),
                    groups: proposal.groups.clone(),
                    geometries: proposal.geometries.clone(),
                    assigned_officer: None,
                    assigned_approver: None,
                    approver_comment: None,
                    proposed_decline_reason: None,
                    proposed_issuance: ProposedIssuance::default(),
                    approval: None,
                    invoicing_details: None,
                    previous_application: Some(proposal.id),
                    generated_proposal: None,
                    generated_competitive_process: None,
                })?;
                proposal.generated_proposal = Some(generated.id);
                self.store.update_proposal(proposal.clone())?;

                info!(
                    proposal = %proposal.id,
                    generated = %generated.id,
                    "lease/licence application generated from registration of interest"
                );
                Ok(FinalApprovalOutcome::ApplicationGenerated { proposal, generated })
            }
            Some(IssuanceDecision::ApproveCompetitiveProcess) => {
                if proposal.generated_competitive_process.is_some() {
                    return Err(WorkflowError::AlreadyGenerated("a competitive process"));
                }
                proposal.processing_status = ProcessingStatus::ApprovedCompetitiveProcess;
                // Competitive processes live in a separate system; the key is
                // derived from the originating proposal.
                let competitive_process = CompetitiveProcessId(proposal.id.0);
                proposal.generated_competitive_process = Some(competitive_process);
                self.store
                    .update_proposal_if_status(observed, proposal.clone())?;

                self.notify(Notification::CompetitiveProcessCreated {
                    proposal: proposal.id,
                    competitive_process,
                });
                info!(proposal = %proposal.id, "competitive process generated");
                Ok(FinalApprovalOutcome::CompetitiveProcessGenerated {
                    proposal,
                    competitive_process,
                })
            }
            None => Err(WorkflowError::Validation(
                "an approval decision is required for a registration of interest".to_string(),
            )),
        }
    }

    /// Clone a proposal so its approval can be renewed for a further,
    /// contiguous term of the same length.
    pub fn renew_approval(
        &self,
        actor: UserId,
        approval_id: ApprovalId,
    ) -> Result<Proposal, WorkflowError> {
        let approval = self.store.approval(approval_id)?;
        self.ensure_no_pending_successor(approval.current_proposal)?;
        let previous = self.store.proposal(approval.current_proposal)?;

        let term = approval.expiry_date - approval.start_date;
        let issuance = ProposedIssuance {
            approval_type: Some(approval.approval_type),
            start_date: Some(approval.expiry_date + Duration::days(1)),
            expiry_date: Some(approval.expiry_date + term),
            record_management_number: approval.record_management_number.clone(),
            ..ProposedIssuance::default()
        };
        let clone = self.clone_for_successor(
            actor,
            &previous,
            approval_id,
            ProposalType::Renewal,
            issuance,
        )?;
        self.copy_requirements(&previous, &clone, true)?;
        info!(approval = %approval_id, renewal = %clone.id, "renewal proposal created");
        Ok(clone)
    }

    /// Clone a proposal so the approval's conditions can be amended without
    /// changing the term.
    pub fn amend_approval(
        &self,
        actor: UserId,
        approval_id: ApprovalId,
    ) -> Result<Proposal, WorkflowError> {
        let approval = self.store.approval(approval_id)?;
        self.ensure_no_pending_successor(approval.current_proposal)?;
        let previous = self.store.proposal(approval.current_proposal)?;

        let issuance = ProposedIssuance {
            approval_type: Some(approval.approval_type),
            start_date: Some(approval.start_date),
            expiry_date: Some(approval.expiry_date),
            record_management_number: approval.record_management_number.clone(),
            ..ProposedIssuance::default()
        };
        let clone = self.clone_for_successor(
            actor,
            &previous,
            approval_id,
            ProposalType::Amendment,
            issuance,
        )?;
        self.copy_requirements(&previous, &clone, false)?;
        info!(approval = %approval_id, amendment = %clone.id, "amendment proposal created");
        Ok(clone)
    }

    fn ensure_no_pending_successor(&self, previous: ProposalId) -> Result<(), WorkflowError> {
        let pending = self.store.child_proposal_with_status(
            previous,
            &[ProcessingStatus::WithAssessor],
        )?;
        if let Some(child) = pending {
            return Err(WorkflowError::AlreadyExists(format!(
                "proposal {} for this approval is already awaiting review",
                child.lodgement_number()
            )));
        }
        Ok(())
    }

    fn clone_for_successor(
        &self,
        actor: UserId,
        previous: &Proposal,
        approval: ApprovalId,
        proposal_type: ProposalType,
        proposed_issuance: ProposedIssuance,
    ) -> Result<Proposal, WorkflowError> {
        Ok(self.store.insert_proposal(Proposal {
            id: ProposalId(0),
            proposal_type,
            application_type: previous.application_type,
            processing_status: ProcessingStatus::Draft,
            prev_processing_status: None,
            applicant: previous.applicant,
            submitter: actor,
            postal_address: previous.postal_address.clone(),
            site_name: previous.site_name.clone(),
            groups: previous.groups.clone(),
            geometries: previous.geometries.clone(),
            assigned_officer: None,
            assigned_approver: None,
            approver_comment: None,
            proposed_decline_reason: None,
            proposed_issuance,
            approval: Some(approval),
            invoicing_details: None,
            previous_application: Some(previous.id),
            generated_proposal: None,
            generated_competitive_process: None,
        })?)
    }

    /// Deep-copy the previous proposal's live requirements onto the clone.
    /// Renewal copies reset due dates; amendments keep them.
    fn copy_requirements(
        &self,
        previous: &Proposal,
        clone: &Proposal,
        for_renewal: bool,
    ) -> Result<(), WorkflowError> {
        for requirement in self.store.requirements_for_proposal(previous.id)? {
            if requirement.is_deleted {
                continue;
            }
            self.store.insert_requirement(ProposalRequirement {
                id: RequirementId(0),
                proposal: clone.id,
                source: requirement.source.clone(),
                due_date: if for_renewal { None } else { requirement.due_date },
                reminder_date: if for_renewal {
                    None
                } else {
                    requirement.reminder_date
                },
                recurrence: requirement.recurrence,
                is_deleted: false,
                copied_from: Some(requirement.id),
                copied_for_renewal: for_renewal,
                order: requirement.order,
            })?;
        }
        Ok(())
    }

    /// Finance officer edits the invoicing configuration. Gross-turnover
    /// requirement and compliance reconciliation runs immediately so a
    /// cadence switch retires the other cadence's future obligations.
    pub fn update_invoicing_details(
        &self,
        actor: UserId,
        id: ProposalId,
        details: InvoicingDetails,
        today: NaiveDate,
    ) -> Result<InvoicingDetails, WorkflowError> {
        if !self.identity.roles(actor).is_finance_officer {
            return Err(WorkflowError::NotAuthorized);
        }
        let proposal = self.store.proposal(id)?;
        let stored_id = proposal
            .invoicing_details
            .ok_or(WorkflowError::NotFound("invoicing details"))?;
        if details.id != stored_id {
            return Err(WorkflowError::Validation(
                "invoicing details do not belong to this proposal".to_string(),
            ));
        }
        self.store.update_invoicing_details(details.clone())?;

        if let Some(approval_id) = proposal.approval {
            let approval = self.store.approval(approval_id)?;
            self.requirements.update_gross_turnover_requirements(
                id,
                &details,
                approval.start_date,
                today,
            )?;
            self.compliances
                .generate_compliances(&proposal, &approval, &details, today)?;
        }
        Ok(details)
    }

    pub fn invoicing_details_for(
        &self,
        id: ProposalId,
    ) -> Result<InvoicingDetails, WorkflowError> {
        let proposal = self.store.proposal(id)?;
        let details_id = proposal
            .invoicing_details
            .ok_or(WorkflowError::NotFound("invoicing details"))?;
        Ok(self.store.invoicing_details(details_id)?)
    }

    /// Finance completes invoicing editing: the proposal becomes `approved`
    /// and the charge method decides what is raised immediately.
    pub fn finance_complete_editing(
        &self,
        actor: UserId,
        id: ProposalId,
        today: NaiveDate,
    ) -> Result<Vec<Invoice>, WorkflowError> {
        if !self.identity.roles(actor).is_finance_officer {
            return Err(WorkflowError::NotAuthorized);
        }
        let mut proposal = self.store.proposal(id)?;
        let observed = proposal.processing_status;
        if observed != ProcessingStatus::ApprovedEditingInvoicing {
            return Err(WorkflowError::InvalidTransition {
                from: observed,
                to: ProcessingStatus::Approved,
            });
        }
        let approval_id = proposal
            .approval
            .ok_or(WorkflowError::NotFound("approval"))?;
        let approval = self.store.approval(approval_id)?;
        let details = self.invoicing_details_for(id)?;

        // Validate the schedule before committing the transition.
        let schedule = details.invoice_schedule(
            ApprovalPeriod {
                start: approval.start_date,
                expiry: approval.expiry_date,
            },
            &self.cpi,
            self.gst_rate,
            approval.approval_type.gst_free,
        )?;

        proposal.processing_status = ProcessingStatus::Approved;
        self.store.update_proposal_if_status(observed, proposal.clone())?;

        let mut raised = Vec::new();
        match details.charge_method {
            ChargeMethod::NoRentOrLicenceCharge => {}
            ChargeMethod::PercentageOfGrossTurnoverInArrears
            | ChargeMethod::PercentageOfGrossTurnoverInAdvance => {
                self.requirements.update_gross_turnover_requirements(
                    id,
                    &details,
                    approval.start_date,
                    today,
                )?;
                self.compliances
                    .generate_compliances(&proposal, &approval, &details, today)?;
            }
            _ => {
                // Once-off invoices go out now; recurring schedules raise the
                // periods already reached and leave the rest to the daily run.
                for entry in &schedule {
                    if details.charge_method != ChargeMethod::OnceOffCharge
                        && entry.cover_start > today
                    {
                        continue;
                    }
                    let mut invoice = Invoice::pending(
                        approval.id,
                        entry.amount_incl_tax,
                        approval.approval_type.gst_free,
                    );
                    invoice.cover_start = Some(entry.cover_start);
                    invoice.cover_end = Some(entry.cover_end);
                    raised.push(self.store.insert_invoice(invoice)?);
                }
            }
        }

        info!(
            proposal = %id,
            approval = %approval_id,
            invoices = raised.len(),
            "invoicing editing completed"
        );
        Ok(raised)
    }

    fn ensure_invoicing_details(
        &self,
        proposal: &mut Proposal,
        approval: ApprovalId,
    ) -> Result<InvoicingDetails, WorkflowError> {
        if let Some(details_id) = proposal.invoicing_details {
            let mut details = self.store.invoicing_details(details_id)?;
            if details.approval != Some(approval) {
                details.approval = Some(approval);
                self.store.update_invoicing_details(details.clone())?;
            }
            return Ok(details);
        }
        let charge_method = proposal
            .proposed_issuance
            .charge_method
            .unwrap_or(ChargeMethod::NoRentOrLicenceCharge);
        let mut details = InvoicingDetails::new(
            crate::proposals::domain::InvoicingDetailsId(0),
            charge_method,
        );
        details.approval = Some(approval);
        // Successor proposals keep a lineage link to the configuration they
        // supersede.
        if let Some(previous) = proposal.previous_application {
            details.previous_invoicing_details =
                self.store.proposal(previous)?.invoicing_details;
        }
        let details = self.store.insert_invoicing_details(details)?;
        proposal.invoicing_details = Some(details.id);
        Ok(details)
    }

    /// Exactly one document of each licence category must be on file before
    /// documents can be generated.
    fn check_licence_documents(&self, proposal: ProposalId) -> Result<(), WorkflowError> {
        for category in [
            DocumentCategory::LicenceDocument,
            DocumentCategory::CoverLetter,
            DocumentCategory::SignOffSheet,
        ] {
            let count = self.documents.count(proposal, category);
            if count != 1 {
                return Err(WorkflowError::Validation(format!(
                    "expected exactly one {} document, found {count}",
                    category.label()
                )));
            }
        }
        Ok(())
    }

    // Notification failures never unwind a committed workflow step.
    fn notify(&self, notification: Notification) {
        if let Err(error) = self.notifications.send(notification) {
            warn!(%error, "notification delivery failed");
        }
    }
}

fn merge_issuance(issuance: &mut ProposedIssuance, request: &IssuanceRequest) {
    if request.decision.is_some() {
        issuance.decision = request.decision;
    }
    if request.approval_type.is_some() {
        issuance.approval_type = request.approval_type;
    }
    if request.start_date.is_some() {
        issuance.start_date = request.start_date;
    }
    if request.expiry_date.is_some() {
        issuance.expiry_date = request.expiry_date;
    }
    if let Some(number) = &request.record_management_number {
        issuance.record_management_number = Some(number.clone());
    }
    if let Some(details) = &request.details {
        issuance.details = Some(details.clone());
    }
    if request.charge_method.is_some() {
        issuance.charge_method = request.charge_method;
    }
}

fn required_issuance(
    proposal: &Proposal,
) -> Result<(ApprovalType, NaiveDate, NaiveDate), WorkflowError> {
    let issuance = &proposal.proposed_issuance;
    let approval_type = issuance
        .approval_type
        .ok_or_else(|| WorkflowError::Validation("an approval type is required".to_string()))?;
    let start_date = issuance
        .start_date
        .ok_or_else(|| WorkflowError::Validation("a start date is required".to_string()))?;
    let expiry_date = issuance
        .expiry_date
        .ok_or_else(|| WorkflowError::Validation("an expiry date is required".to_string()))?;
    if expiry_date <= start_date {
        return Err(WorkflowError::Validation(
            "the expiry date must fall after the start date".to_string(),
        ));
    }
    Ok((approval_type, start_date, expiry_date))
}
