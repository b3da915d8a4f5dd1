//! Core records for lease and licence applications.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::charges::ChargeMethod;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{:06}"), self.0)
            }
        }
    };
}

record_id!(
    /// Identifier for a lodged proposal; displays as its lodgement number.
    ProposalId,
    "A"
);
record_id!(
    /// Identifier for an issued lease or licence.
    ApprovalId,
    "L"
);
record_id!(ReferralId, "R");
record_id!(RequirementId, "RQ");
record_id!(ComplianceId, "C");
record_id!(InvoicingDetailsId, "ID");
record_id!(CompetitiveProcessId, "CP");
record_id!(UserId, "U");
record_id!(OrganisationId, "ORG");

/// Where a proposal sits in the assessment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Draft,
    AmendmentRequired,
    WithAssessor,
    WithAssessorConditions,
    WithReferral,
    WithReferralConditions,
    WithApprover,
    OnHold,
    WithQaOfficer,
    ApprovedApplication,
    ApprovedCompetitiveProcess,
    ApprovedEditingInvoicing,
    Approved,
    Declined,
    Discarded,
}

impl ProcessingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProcessingStatus::Draft => "Draft",
            ProcessingStatus::AmendmentRequired => "Amendment Required",
            ProcessingStatus::WithAssessor => "With Assessor",
            ProcessingStatus::WithAssessorConditions => "With Assessor (Conditions)",
            ProcessingStatus::WithReferral => "With Referral",
            ProcessingStatus::WithReferralConditions => "With Referral (Conditions)",
            ProcessingStatus::WithApprover => "With Approver",
            ProcessingStatus::OnHold => "On Hold",
            ProcessingStatus::WithQaOfficer => "With QA Officer",
            ProcessingStatus::ApprovedApplication => "Approved (Application)",
            ProcessingStatus::ApprovedCompetitiveProcess => "Approved (Competitive Process)",
            ProcessingStatus::ApprovedEditingInvoicing => "Approved (Editing Invoicing)",
            ProcessingStatus::Approved => "Approved",
            ProcessingStatus::Declined => "Declined",
            ProcessingStatus::Discarded => "Discarded",
        }
    }

    /// Statuses an assessor may move a proposal between directly.
    pub const fn is_assessor_target(self) -> bool {
        matches!(
            self,
            ProcessingStatus::WithAssessor | ProcessingStatus::WithAssessorConditions
        )
    }

    pub const fn is_referral_state(self) -> bool {
        matches!(
            self,
            ProcessingStatus::WithReferral | ProcessingStatus::WithReferralConditions
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Approved | ProcessingStatus::Declined | ProcessingStatus::Discarded
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How the proposal came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    New,
    Renewal,
    Amendment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    RegistrationOfInterest,
    LeaseLicence,
}

impl ApplicationType {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationType::RegistrationOfInterest => "Registration of Interest",
            ApplicationType::LeaseLicence => "Lease / Licence",
        }
    }
}

/// The party a proposal is held on behalf of. Resolved exactly once at
/// lodgement; precedence is organisation, then individual, then proxy, then
/// the submitter themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Applicant {
    Organisation(OrganisationId),
    Individual(UserId),
    Proxy(UserId),
    Submitter(UserId),
}

impl Applicant {
    pub fn resolve(
        organisation: Option<OrganisationId>,
        individual: Option<UserId>,
        proxy: Option<UserId>,
        submitter: UserId,
    ) -> Self {
        if let Some(org) = organisation {
            Applicant::Organisation(org)
        } else if let Some(user) = individual {
            Applicant::Individual(user)
        } else if let Some(user) = proxy {
            Applicant::Proxy(user)
        } else {
            Applicant::Submitter(submitter)
        }
    }

    pub const fn kind(self) -> &'static str {
        match self {
            Applicant::Organisation(_) => "organisation",
            Applicant::Individual(_) => "individual",
            Applicant::Proxy(_) => "proxy",
            Applicant::Submitter(_) => "submitter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: String,
    pub locality: String,
    pub state: String,
    pub postcode: String,
}

/// A spatial feature drawn against the proposal. Locked geometries can no
/// longer be edited by the officer who drew them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalGeometry {
    pub drawn_by: UserId,
    pub locked: bool,
}

/// Kind of tenure an approval grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTypeKind {
    Lease,
    Licence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalType {
    pub kind: ApprovalTypeKind,
    pub gst_free: bool,
}

/// The approver's recorded decision for a registration of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceDecision {
    ApproveLeaseLicence,
    ApproveCompetitiveProcess,
}

/// Issuance details proposed by the assessor and confirmed by the approver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedIssuance {
    pub decision: Option<IssuanceDecision>,
    pub approval_type: Option<ApprovalType>,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub record_management_number: Option<String>,
    pub details: Option<String>,
    pub charge_method: Option<ChargeMethod>,
    pub approved_on: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposal_type: ProposalType,
    pub application_type: ApplicationType,
    pub processing_status: ProcessingStatus,
    /// Status to restore when the proposal comes off hold or QA review.
    pub prev_processing_status: Option<ProcessingStatus>,
    pub applicant: Applicant,
    pub submitter: UserId,
    pub postal_address: Option<PostalAddress>,
    pub site_name: Option<String>,
    pub groups: Vec<String>,
    pub geometries: Vec<ProposalGeometry>,
    pub assigned_officer: Option<UserId>,
    pub assigned_approver: Option<UserId>,
    pub approver_comment: Option<String>,
    pub proposed_decline_reason: Option<String>,
    pub proposed_issuance: ProposedIssuance,
    pub approval: Option<ApprovalId>,
    pub invoicing_details: Option<InvoicingDetailsId>,
    /// Set on renewals and amendments; points at the proposal being replaced.
    pub previous_application: Option<ProposalId>,
    /// Lease/licence proposal generated from an approved registration of interest.
    pub generated_proposal: Option<ProposalId>,
    pub generated_competitive_process: Option<CompetitiveProcessId>,
}

impl Proposal {
    pub fn lodgement_number(&self) -> String {
        self.id.to_string()
    }

    /// Lock every geometry drawn by `user` so it survives the handover
    /// between processing stages unchanged.
    pub fn lock_geometries_drawn_by(&mut self, user: UserId) {
        for geometry in &mut self.geometries {
            if geometry.drawn_by == user {
                geometry.locked = true;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Current,
    Expired,
    Cancelled,
    Surrendered,
}

/// An issued lease or licence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub approval_type: ApprovalType,
    pub status: ApprovalStatus,
    pub current_proposal: ProposalId,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub issue_date: DateTime<Utc>,
    pub record_management_number: Option<String>,
}

impl Approval {
    pub fn lodgement_number(&self) -> String {
        self.id.to_string()
    }
}

/// Which stage of assessment dispatched a referral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralOrigin {
    Assessor,
    Approver,
}

impl ReferralOrigin {
    /// Status the proposal returns to once every referral is resolved.
    pub const fn return_status(self) -> ProcessingStatus {
        match self {
            ReferralOrigin::Assessor => ProcessingStatus::WithAssessor,
            ReferralOrigin::Approver => ProcessingStatus::WithApprover,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Recalled,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: ReferralId,
    pub proposal: ProposalId,
    pub referee: UserId,
    pub sent_by: UserId,
    pub sent_from: ReferralOrigin,
    pub status: ReferralStatus,
    pub text: String,
    pub comment: Option<String>,
}

/// Catalogue entry requirements are drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardRequirement {
    pub code: String,
    pub text: String,
    pub is_default: bool,
    pub gross_turnover_required: bool,
    pub application_type: Option<ApplicationType>,
}

/// Standard gross-turnover statement requirement codes.
pub const GROSS_TURNOVER_STATEMENT_ANNUALLY: &str = "gross_turnover_statement_annually";
pub const GROSS_TURNOVER_STATEMENT_QUARTERLY: &str = "gross_turnover_statement_quarterly";
pub const GROSS_TURNOVER_STATEMENT_MONTHLY: &str = "gross_turnover_statement_monthly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Weekly,
    Monthly,
    Yearly,
}

/// How often a recurring requirement falls due after its first due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub pattern: RecurrencePattern,
    /// Number of pattern units between occurrences, at least 1.
    pub every: u32,
}

impl Recurrence {
    pub fn advance(&self, date: NaiveDate) -> NaiveDate {
        let every = self.every.max(1);
        match self.pattern {
            RecurrencePattern::Weekly => date + chrono::Duration::weeks(i64::from(every)),
            RecurrencePattern::Monthly => crate::charges::finance::add_months(date, every),
            RecurrencePattern::Yearly => crate::charges::finance::add_months(date, every * 12),
        }
    }
}

/// Source text for a proposal requirement: either a catalogue entry or free
/// text entered by the assessor. Exactly one is ever present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementSource {
    Standard { code: String },
    Free { text: String },
}

/// A condition attached to a proposal, optionally recurring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequirement {
    pub id: RequirementId,
    pub proposal: ProposalId,
    pub source: RequirementSource,
    pub due_date: Option<NaiveDate>,
    pub reminder_date: Option<NaiveDate>,
    pub recurrence: Option<Recurrence>,
    /// Requirements are never hard deleted; generated compliances keep
    /// pointing at them.
    pub is_deleted: bool,
    pub copied_from: Option<RequirementId>,
    pub copied_for_renewal: bool,
    pub order: u32,
}

impl ProposalRequirement {
    pub fn standard_code(&self) -> Option<&str> {
        match &self.source {
            RequirementSource::Standard { code } => Some(code),
            RequirementSource::Free { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Future,
    Due,
    Overdue,
    Completed,
    Discarded,
}

/// A dated obligation generated from an approved requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compliance {
    pub id: ComplianceId,
    pub proposal: ProposalId,
    pub approval: ApprovalId,
    pub requirement: RequirementId,
    pub due_date: NaiveDate,
    pub status: ComplianceStatus,
    pub text: Option<String>,
    pub reminder_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applicant_precedence_prefers_organisation() {
        let applicant = Applicant::resolve(
            Some(OrganisationId(7)),
            Some(UserId(3)),
            Some(UserId(4)),
            UserId(5),
        );
        assert_eq!(applicant, Applicant::Organisation(OrganisationId(7)));

        let applicant = Applicant::resolve(None, None, Some(UserId(4)), UserId(5));
        assert_eq!(applicant, Applicant::Proxy(UserId(4)));

        let applicant = Applicant::resolve(None, None, None, UserId(5));
        assert_eq!(applicant, Applicant::Submitter(UserId(5)));
    }

    #[test]
    fn lodgement_numbers_are_prefixed_and_padded() {
        assert_eq!(ProposalId(42).to_string(), "A000042");
        assert_eq!(ApprovalId(7).to_string(), "L000007");
    }

    #[test]
    fn recurrence_advances_by_pattern() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date");
        let monthly = Recurrence {
            pattern: RecurrencePattern::Monthly,
            every: 1,
        };
        assert_eq!(
            monthly.advance(date),
            NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date")
        );
        let yearly = Recurrence {
            pattern: RecurrencePattern::Yearly,
            every: 1,
        };
        assert_eq!(
            yearly.advance(date),
            NaiveDate::from_ymd_opt(2025, 1, 31).expect("valid date")
        );
    }
}
