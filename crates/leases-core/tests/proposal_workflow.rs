mod common;

use common::*;
use leases_core::error::WorkflowError;
use leases_core::ports::{DocumentStore, Notification};
use leases_core::proposals::domain::{
    ApplicationType, IssuanceDecision, ProcessingStatus, ProposalType, ReferralStatus, UserId,
};
use leases_core::proposals::service::{IssuanceRequest, LodgementRequest};
use leases_core::store::{ProposalStore, RequirementStore};

#[test]
fn submit_locks_the_submitters_geometries() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .add_geometry(APPLICANT, proposal.id)
        .expect("geometry drawn");

    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("proposal submits");

    let stored = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(stored.processing_status, ProcessingStatus::WithAssessor);
    assert!(stored.geometries.iter().all(|geometry| geometry.locked));
}

#[test]
fn only_the_submitter_may_submit() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    let error = harness
        .service
        .submit(UserId(999), proposal.id)
        .expect_err("stranger rejected");
    assert!(matches!(error, WorkflowError::NotAuthorized));
}

#[test]
fn moving_to_the_current_status_is_a_no_op() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .move_to_status(
            ASSESSOR,
            proposal.id,
            ProcessingStatus::WithAssessorConditions,
            None,
        )
        .expect("moves to conditions");
    let defaults = harness
        .store
        .requirements_for_proposal(proposal.id)
        .expect("requirements")
        .len();
    assert!(defaults > 0);

    // Repeating the move neither fails nor re-attaches defaults.
    harness
        .service
        .move_to_status(
            ASSESSOR,
            proposal.id,
            ProcessingStatus::WithAssessorConditions,
            None,
        )
        .expect("idempotent move");
    let after = harness
        .store
        .requirements_for_proposal(proposal.id)
        .expect("requirements")
        .len();
    assert_eq!(defaults, after);
}

#[test]
fn unrecognised_targets_are_invalid_transitions() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    let error = harness
        .service
        .move_to_status(ASSESSOR, proposal.id, ProcessingStatus::Approved, None)
        .expect_err("cannot jump to approved");
    assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
}

#[test]
fn sending_back_to_assessor_records_the_comment() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .move_to_status(APPROVER, proposal.id, ProcessingStatus::WithApprover, None)
        .expect("moves to approver");

    harness
        .service
        .move_to_status(
            ASSESSOR,
            proposal.id,
            ProcessingStatus::WithAssessor,
            Some("Conditions need tightening".to_string()),
        )
        .expect("sent back");

    let stored = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(
        stored.approver_comment.as_deref(),
        Some("Conditions need tightening")
    );
    assert!(harness.notifications.events().iter().any(|event| matches!(
        event,
        Notification::SentBackToAssessor { comment, .. } if comment == "Conditions need tightening"
    )));
}

#[test]
fn proposal_returns_only_after_every_referral_resolves() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");

    let first = harness
        .service
        .send_referral(ASSESSOR, proposal.id, REFEREE, "check access".to_string())
        .expect("first referral");
    let second = harness
        .service
        .send_referral(
            ASSESSOR,
            proposal.id,
            SECOND_REFEREE,
            "check heritage register".to_string(),
        )
        .expect("second referral");

    let stored = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(stored.processing_status, ProcessingStatus::WithReferral);

    harness
        .service
        .complete_referral(REFEREE, first.id, None)
        .expect("first completes");
    let still_waiting = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(
        still_waiting.processing_status,
        ProcessingStatus::WithReferral
    );

    harness
        .service
        .complete_referral(SECOND_REFEREE, second.id, Some("clear".to_string()))
        .expect("second completes");
    let restored = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(restored.processing_status, ProcessingStatus::WithAssessor);
}

#[test]
fn duplicate_referral_to_the_same_referee_is_rejected() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .send_referral(ASSESSOR, proposal.id, REFEREE, "first".to_string())
        .expect("first referral");
    let error = harness
        .service
        .send_referral(ASSESSOR, proposal.id, REFEREE, "again".to_string())
        .expect_err("duplicate rejected");
    assert!(matches!(error, WorkflowError::AlreadyExists(_)));
}

#[test]
fn recalled_referral_can_be_resent() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    let referral = harness
        .service
        .send_referral(ASSESSOR, proposal.id, REFEREE, "check access".to_string())
        .expect("referral");

    harness
        .service
        .recall_referral(ASSESSOR, referral.id)
        .expect("recalled");
    let back = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(back.processing_status, ProcessingStatus::WithAssessor);

    let resent = harness
        .service
        .resend_referral(ASSESSOR, referral.id)
        .expect("resent");
    assert_eq!(resent.status, ReferralStatus::Pending);
    let waiting = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(waiting.processing_status, ProcessingStatus::WithReferral);
}

#[test]
fn officers_cannot_pull_a_proposal_out_of_referral() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .send_referral(ASSESSOR, proposal.id, REFEREE, "check access".to_string())
        .expect("referral");

    let error = harness
        .service
        .move_to_status(ASSESSOR, proposal.id, ProcessingStatus::WithAssessor, None)
        .expect_err("blocked while referred");
    assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
}

#[test]
fn decline_flows_through_the_approver() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .propose_decline(ASSESSOR, proposal.id, "site unsuitable".to_string())
        .expect("decline proposed");

    let pending = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(pending.processing_status, ProcessingStatus::WithApprover);

    harness
        .service
        .final_decline(APPROVER, proposal.id, "site unsuitable".to_string())
        .expect("declined");
    let declined = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(declined.processing_status, ProcessingStatus::Declined);
    assert!(harness
        .notifications
        .events()
        .iter()
        .any(|event| matches!(event, Notification::ProposalDeclined { .. })));
}

#[test]
fn on_hold_restores_the_previous_stage() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .on_hold(ASSESSOR, proposal.id)
        .expect("parked");
    let parked = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(parked.processing_status, ProcessingStatus::OnHold);

    harness
        .service
        .on_hold_remove(ASSESSOR, proposal.id)
        .expect("resumed");
    let resumed = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(resumed.processing_status, ProcessingStatus::WithAssessor);
    assert_eq!(resumed.prev_processing_status, None);
}

#[test]
fn missing_cover_letter_blocks_approval_and_creates_nothing() {
    let harness = harness();
    let proposal = lodge_lease_licence(&harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .move_to_status(APPROVER, proposal.id, ProcessingStatus::WithApprover, None)
        .expect("moves to approver");

    // Licence document and sign off sheet only; no cover letter.
    harness.documents.attach(
        proposal.id,
        leases_core::ports::DocumentCategory::LicenceDocument,
    );
    harness.documents.attach(
        proposal.id,
        leases_core::ports::DocumentCategory::SignOffSheet,
    );

    let error = harness
        .service
        .final_approval(
            APPROVER,
            proposal.id,
            IssuanceRequest {
                approval_type: Some(leases_core::proposals::domain::ApprovalType {
                    kind: leases_core::proposals::domain::ApprovalTypeKind::Licence,
                    gst_free: false,
                }),
                start_date: Some(date(2025, 7, 1)),
                expiry_date: Some(date(2026, 6, 30)),
                ..IssuanceRequest::default()
            },
            date(2025, 6, 10),
            at_nine(date(2025, 6, 10)),
        )
        .expect_err("missing document rejected");

    match error {
        WorkflowError::Validation(message) => assert!(message.contains("cover letter")),
        other => panic!("expected a validation error, got {other:?}"),
    }

    let stored = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(stored.processing_status, ProcessingStatus::WithApprover);
    assert!(stored.approval.is_none());
}

#[test]
fn registration_of_interest_spawns_one_application_only() {
    let harness = harness();
    let proposal = harness
        .service
        .lodge(LodgementRequest {
            proposal_type: ProposalType::New,
            application_type: ApplicationType::RegistrationOfInterest,
            submitter: APPLICANT,
            organisation: None,
            individual: Some(APPLICANT),
            proxy: None,
            postal_address: Some(perth_address()),
            site_name: None,
            groups: Vec::new(),
        })
        .expect("lodges");
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("submits");
    harness
        .service
        .move_to_status(APPROVER, proposal.id, ProcessingStatus::WithApprover, None)
        .expect("moves to approver");

    harness
        .service
        .final_approval(
            APPROVER,
            proposal.id,
            IssuanceRequest {
                decision: Some(IssuanceDecision::ApproveLeaseLicence),
                ..IssuanceRequest::default()
            },
            date(2025, 6, 10),
            at_nine(date(2025, 6, 10)),
        )
        .expect("application generated");

    let stored = harness.store.proposal(proposal.id).expect("stored");
    assert_eq!(
        stored.processing_status,
        ProcessingStatus::ApprovedApplication
    );
    let generated = stored.generated_proposal.expect("child recorded");
    let child = harness.store.proposal(generated).expect("child exists");
    assert_eq!(child.application_type, ApplicationType::LeaseLicence);
    assert_eq!(child.previous_application, Some(proposal.id));

    let error = harness
        .service
        .final_approval(
            APPROVER,
            proposal.id,
            IssuanceRequest {
                decision: Some(IssuanceDecision::ApproveLeaseLicence),
                ..IssuanceRequest::default()
            },
            date(2025, 6, 11),
            at_nine(date(2025, 6, 11)),
        )
        .expect_err("second generation blocked");
    assert!(matches!(
        error,
        WorkflowError::AlreadyGenerated(_) | WorkflowError::InvalidTransition { .. }
    ));
}
