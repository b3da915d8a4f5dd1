//! Outbound collaborator ports. The core never talks to the identity system,
//! mail transport, document storage, or the payment gateway directly; adapters
//! implement these traits at the service edge (tests use recording fakes).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::proposals::domain::{
    ApprovalId, CompetitiveProcessId, ProposalId, ReferralId, UserId,
};

/// Group memberships resolved for an acting user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles {
    pub is_assessor: bool,
    pub is_approver: bool,
    pub is_finance_officer: bool,
}

impl Roles {
    pub const fn none() -> Self {
        Self {
            is_assessor: false,
            is_approver: false,
            is_finance_officer: false,
        }
    }

    /// Assessors and approvers both count as able to assess a proposal.
    pub const fn can_assess(self) -> bool {
        self.is_assessor || self.is_approver
    }
}

pub trait IdentityDirectory: Send + Sync {
    fn roles(&self, user: UserId) -> Roles;
}

/// Events the workflow announces to applicants and internal groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum Notification {
    ReferralSent {
        proposal: ProposalId,
        referral: ReferralId,
        referee: UserId,
    },
    ReferralsComplete {
        proposal: ProposalId,
    },
    SentBackToAssessor {
        proposal: ProposalId,
        comment: String,
    },
    ProposalDeclined {
        proposal: ProposalId,
    },
    ApprovalIssued {
        proposal: ProposalId,
        approval: ApprovalId,
    },
    ReadyForInvoicing {
        proposal: ProposalId,
        approval: ApprovalId,
    },
    CompetitiveProcessCreated {
        proposal: ProposalId,
        competitive_process: CompetitiveProcessId,
    },
    InvoiceRaised {
        approval: ApprovalId,
        invoice_uuid: Uuid,
    },
    InvoicePaid {
        approval: ApprovalId,
        invoice_uuid: Uuid,
    },
    CustomCpiFigureDue {
        approval: ApprovalId,
        year: u32,
        days_before_invoicing: u16,
    },
    CrownLandRentReviewDue {
        approval: ApprovalId,
        review_date: NaiveDate,
        months_until_review: u16,
    },
}

pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Document categories checked before licence documents can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    LicenceDocument,
    CoverLetter,
    SignOffSheet,
    Supporting,
}

impl DocumentCategory {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentCategory::LicenceDocument => "licence document",
            DocumentCategory::CoverLetter => "cover letter",
            DocumentCategory::SignOffSheet => "sign off sheet",
            DocumentCategory::Supporting => "supporting document",
        }
    }
}

pub trait DocumentStore: Send + Sync {
    /// Register one stored document against the proposal.
    fn attach(&self, proposal: ProposalId, category: DocumentCategory);
    fn count(&self, proposal: ProposalId, category: DocumentCategory) -> usize;
}

/// Request to register a raised invoice with the external payment system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureInvoiceRequest {
    pub invoice_uuid: Uuid,
    pub description: String,
    pub amount_incl_tax: Decimal,
    pub amount_excl_tax: Decimal,
    pub callback_url: String,
}

/// Correlation keys issued by the payment system for a registered invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureInvoice {
    pub order_number: String,
    pub basket_id: String,
    pub invoice_reference: String,
}

pub trait PaymentGateway: Send + Sync {
    fn create_future_invoice(
        &self,
        request: FutureInvoiceRequest,
    ) -> Result<FutureInvoice, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}
