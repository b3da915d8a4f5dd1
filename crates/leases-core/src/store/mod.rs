//! Storage ports, one per aggregate, plus the shared in-memory store.
//!
//! Every `insert_*` method assigns a fresh identifier (whatever is in the
//! record's `id` field is ignored) and returns the stored copy. The
//! `update_*_if_status` methods are compare-and-update primitives: the write
//! only lands while the stored record still carries the expected status, and
//! fails with [`StoreError::Stale`] otherwise.

mod memory;

pub use memory::InMemoryLeasingStore;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::invoicing::details::InvoicingDetails;
use crate::invoicing::ledger::{Invoice, InvoiceId, InvoiceStatus, InvoiceTransaction};
use crate::invoicing::outbox::OutboxRecord;
use crate::proposals::domain::{
    Approval, ApprovalId, Compliance, ComplianceId, InvoicingDetailsId, ProcessingStatus,
    Proposal, ProposalId, ProposalRequirement, Referral, ReferralId, RequirementId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("record was modified by another actor")]
    Stale,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience bound for services and adapters that span every aggregate.
pub trait LeasingStore:
    ProposalStore
    + ReferralStore
    + RequirementStore
    + ApprovalStore
    + ComplianceStore
    + InvoicingStore
    + InvoiceStore
    + OutboxStore
    + ReminderLogStore
{
}

impl<T> LeasingStore for T where
    T: ProposalStore
        + ReferralStore
        + RequirementStore
        + ApprovalStore
        + ComplianceStore
        + InvoicingStore
        + InvoiceStore
        + OutboxStore
        + ReminderLogStore
{
}

pub trait ProposalStore: Send + Sync {
    fn insert_proposal(&self, proposal: Proposal) -> Result<Proposal, StoreError>;
    fn proposal(&self, id: ProposalId) -> Result<Proposal, StoreError>;
    fn update_proposal(&self, proposal: Proposal) -> Result<(), StoreError>;
    fn update_proposal_if_status(
        &self,
        expected: ProcessingStatus,
        proposal: Proposal,
    ) -> Result<(), StoreError>;
    /// The open successor of `previous`, if one is already lodged.
    fn child_proposal_with_status(
        &self,
        previous: ProposalId,
        statuses: &[ProcessingStatus],
    ) -> Result<Option<Proposal>, StoreError>;
}

pub trait ReferralStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when a non-recalled referral for
    /// the same proposal and referee already exists.
    fn insert_referral(&self, referral: Referral) -> Result<Referral, StoreError>;
    fn referral(&self, id: ReferralId) -> Result<Referral, StoreError>;
    fn update_referral(&self, referral: Referral) -> Result<(), StoreError>;
    fn referrals_for_proposal(&self, proposal: ProposalId) -> Result<Vec<Referral>, StoreError>;
}

pub trait RequirementStore: Send + Sync {
    fn insert_requirement(
        &self,
        requirement: ProposalRequirement,
    ) -> Result<ProposalRequirement, StoreError>;
    fn requirement(&self, id: RequirementId) -> Result<ProposalRequirement, StoreError>;
    fn update_requirement(&self, requirement: ProposalRequirement) -> Result<(), StoreError>;
    /// Every requirement for the proposal, soft-deleted ones included.
    fn requirements_for_proposal(
        &self,
        proposal: ProposalId,
    ) -> Result<Vec<ProposalRequirement>, StoreError>;
}

pub trait ApprovalStore: Send + Sync {
    fn insert_approval(&self, approval: Approval) -> Result<Approval, StoreError>;
    fn approval(&self, id: ApprovalId) -> Result<Approval, StoreError>;
    fn update_approval(&self, approval: Approval) -> Result<(), StoreError>;
    fn current_approvals(&self) -> Result<Vec<Approval>, StoreError>;
}

pub trait ComplianceStore: Send + Sync {
    fn insert_compliance(&self, compliance: Compliance) -> Result<Compliance, StoreError>;
    fn compliance(&self, id: ComplianceId) -> Result<Compliance, StoreError>;
    fn update_compliance(&self, compliance: Compliance) -> Result<(), StoreError>;
    fn compliances_for_requirement(
        &self,
        requirement: RequirementId,
    ) -> Result<Vec<Compliance>, StoreError>;
    fn compliances_for_proposal(
        &self,
        proposal: ProposalId,
    ) -> Result<Vec<Compliance>, StoreError>;
    /// Idempotency probe keyed on (requirement, due date).
    fn find_compliance(
        &self,
        requirement: RequirementId,
        due_date: NaiveDate,
    ) -> Result<Option<Compliance>, StoreError>;
}

pub trait InvoicingStore: Send + Sync {
    fn insert_invoicing_details(
        &self,
        details: InvoicingDetails,
    ) -> Result<InvoicingDetails, StoreError>;
    fn invoicing_details(&self, id: InvoicingDetailsId)
        -> Result<InvoicingDetails, StoreError>;
    fn update_invoicing_details(&self, details: InvoicingDetails) -> Result<(), StoreError>;
}

pub trait InvoiceStore: Send + Sync {
    fn insert_invoice(&self, invoice: Invoice) -> Result<Invoice, StoreError>;
    fn invoice(&self, id: InvoiceId) -> Result<Invoice, StoreError>;
    fn invoice_by_uuid(&self, uuid: Uuid) -> Result<Option<Invoice>, StoreError>;
    fn update_invoice(&self, invoice: Invoice) -> Result<(), StoreError>;
    fn update_invoice_if_status(
        &self,
        expected: InvoiceStatus,
        invoice: Invoice,
    ) -> Result<(), StoreError>;
    fn invoices_for_approval(&self, approval: ApprovalId) -> Result<Vec<Invoice>, StoreError>;
    fn insert_transaction(
        &self,
        transaction: InvoiceTransaction,
    ) -> Result<InvoiceTransaction, StoreError>;
    fn transactions_for_invoice(
        &self,
        invoice: InvoiceId,
    ) -> Result<Vec<InvoiceTransaction>, StoreError>;
}

pub trait OutboxStore: Send + Sync {
    fn enqueue_outbox(&self, record: OutboxRecord) -> Result<OutboxRecord, StoreError>;
    fn pending_outbox(&self) -> Result<Vec<OutboxRecord>, StoreError>;
    fn update_outbox(&self, record: OutboxRecord) -> Result<(), StoreError>;
}

/// Log of sent reminders so the daily jobs stay idempotent. Custom-CPI
/// reminders are keyed per sequential year, rent review reminders per
/// review date; both carry the threshold that fired.
pub trait ReminderLogStore: Send + Sync {
    fn reminder_sent(
        &self,
        approval: ApprovalId,
        year: u32,
        threshold: u16,
    ) -> Result<bool, StoreError>;
    fn record_reminder(
        &self,
        approval: ApprovalId,
        year: u32,
        threshold: u16,
    ) -> Result<(), StoreError>;
    fn review_reminder_sent(
        &self,
        approval: ApprovalId,
        review_date: NaiveDate,
        months: u16,
    ) -> Result<bool, StoreError>;
    fn record_review_reminder(
        &self,
        approval: ApprovalId,
        review_date: NaiveDate,
        months: u16,
    ) -> Result<(), StoreError>;
}
