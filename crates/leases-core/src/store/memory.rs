//! Single-process store backed by a mutex-guarded map per aggregate.
//! Serves the HTTP service, the demo, and every integration test.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::invoicing::details::InvoicingDetails;
use crate::invoicing::ledger::{
    Invoice, InvoiceId, InvoiceStatus, InvoiceTransaction, TransactionId,
};
use crate::invoicing::outbox::{OutboxRecord, OutboxRecordId, OutboxStatus};
use crate::proposals::domain::{
    Approval, ApprovalId, ApprovalStatus, Compliance, ComplianceId, InvoicingDetailsId,
    ProcessingStatus, Proposal, ProposalId, ProposalRequirement, Referral, ReferralId,
    ReferralStatus, RequirementId,
};

use super::{
    ApprovalStore, ComplianceStore, InvoiceStore, InvoicingStore, OutboxStore, ProposalStore,
    ReferralStore, ReminderLogStore, RequirementStore, StoreError,
};

#[derive(Default)]
struct Inner {
    proposals: HashMap<ProposalId, Proposal>,
    referrals: HashMap<ReferralId, Referral>,
    requirements: HashMap<RequirementId, ProposalRequirement>,
    approvals: HashMap<ApprovalId, Approval>,
    compliances: HashMap<ComplianceId, Compliance>,
    invoicing_details: HashMap<InvoicingDetailsId, InvoicingDetails>,
    invoices: HashMap<InvoiceId, Invoice>,
    transactions: Vec<InvoiceTransaction>,
    outbox: HashMap<OutboxRecordId, OutboxRecord>,
    reminders: HashSet<(ApprovalId, u32, u16)>,
    review_reminders: HashSet<(ApprovalId, NaiveDate, u16)>,
    sequence: u64,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

#[derive(Default)]
pub struct InMemoryLeasingStore {
    inner: Mutex<Inner>,
}

impl InMemoryLeasingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl ProposalStore for InMemoryLeasingStore {
    fn insert_proposal(&self, mut proposal: Proposal) -> Result<Proposal, StoreError> {
        let mut inner = self.lock()?;
        proposal.id = ProposalId(inner.next_id());
        inner.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    fn proposal(&self, id: ProposalId) -> Result<Proposal, StoreError> {
        let inner = self.lock()?;
        inner.proposals.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn update_proposal(&self, proposal: Proposal) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.proposals.contains_key(&proposal.id) {
            return Err(StoreError::NotFound);
        }
        inner.proposals.insert(proposal.id, proposal);
        Ok(())
    }

    fn update_proposal_if_status(
        &self,
        expected: ProcessingStatus,
        proposal: Proposal,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let stored = inner
            .proposals
            .get(&proposal.id)
            .ok_or(StoreError::NotFound)?;
        if stored.processing_status != expected {
            return Err(StoreError::Stale);
        }
        inner.proposals.insert(proposal.id, proposal);
        Ok(())
    }

    fn child_proposal_with_status(
        &self,
        previous: ProposalId,
        statuses: &[ProcessingStatus],
    ) -> Result<Option<Proposal>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .proposals
            .values()
            .filter(|candidate| candidate.previous_application == Some(previous))
            .find(|candidate| statuses.contains(&candidate.processing_status))
            .cloned())
    }
}

impl ReferralStore for InMemoryLeasingStore {
    fn insert_referral(&self, mut referral: Referral) -> Result<Referral, StoreError> {
        let mut inner = self.lock()?;
        let duplicate = inner.referrals.values().any(|existing| {
            existing.proposal == referral.proposal
                && existing.referee == referral.referee
                && existing.status != ReferralStatus::Recalled
        });
        if duplicate {
            return Err(StoreError::Conflict);
        }
        referral.id = ReferralId(inner.next_id());
        inner.referrals.insert(referral.id, referral.clone());
        Ok(referral)
    }

    fn referral(&self, id: ReferralId) -> Result<Referral, StoreError> {
        let inner = self.lock()?;
        inner.referrals.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn update_referral(&self, referral: Referral) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.referrals.contains_key(&referral.id) {
            return Err(StoreError::NotFound);
        }
        inner.referrals.insert(referral.id, referral);
        Ok(())
    }

    fn referrals_for_proposal(&self, proposal: ProposalId) -> Result<Vec<Referral>, StoreError> {
        let inner = self.lock()?;
        let mut referrals: Vec<Referral> = inner
            .referrals
            .values()
            .filter(|referral| referral.proposal == proposal)
            .cloned()
            .collect();
        referrals.sort_by_key(|referral| referral.id);
        Ok(referrals)
    }
}

impl RequirementStore for InMemoryLeasingStore {
    fn insert_requirement(
        &self,
        mut requirement: ProposalRequirement,
    ) -> Result<ProposalRequirement, StoreError> {
        let mut inner = self.lock()?;
        requirement.id = RequirementId(inner.next_id());
        inner.requirements.insert(requirement.id, requirement.clone());
        Ok(requirement)
    }

    fn requirement(&self, id: RequirementId) -> Result<ProposalRequirement, StoreError> {
        let inner = self.lock()?;
        inner
            .requirements
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update_requirement(&self, requirement: ProposalRequirement) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.requirements.contains_key(&requirement.id) {
            return Err(StoreError::NotFound);
        }
        inner.requirements.insert(requirement.id, requirement);
        Ok(())
    }

    fn requirements_for_proposal(
        &self,
        proposal: ProposalId,
    ) -> Result<Vec<ProposalRequirement>, StoreError> {
        let inner = self.lock()?;
        let mut requirements: Vec<ProposalRequirement> = inner
            .requirements
            .values()
            .filter(|requirement| requirement.proposal == proposal)
            .cloned()
            .collect();
        requirements.sort_by_key(|requirement| (requirement.order, requirement.id));
        Ok(requirements)
    }
}

impl ApprovalStore for InMemoryLeasingStore {
    fn insert_approval(&self, mut approval: Approval) -> Result<Approval, StoreError> {
        let mut inner = self.lock()?;
        approval.id = ApprovalId(inner.next_id());
        inner.approvals.insert(approval.id, approval.clone());
        Ok(approval)
    }

    fn approval(&self, id: ApprovalId) -> Result<Approval, StoreError> {
        let inner = self.lock()?;
        inner.approvals.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn update_approval(&self, approval: Approval) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.approvals.contains_key(&approval.id) {
            return Err(StoreError::NotFound);
        }
        inner.approvals.insert(approval.id, approval);
        Ok(())
    }

    fn current_approvals(&self) -> Result<Vec<Approval>, StoreError> {
        let inner = self.lock()?;
        let mut approvals: Vec<Approval> = inner
            .approvals
            .values()
            .filter(|approval| approval.status == ApprovalStatus::Current)
            .cloned()
            .collect();
        approvals.sort_by_key(|approval| approval.id);
        Ok(approvals)
    }
}

impl ComplianceStore for InMemoryLeasingStore {
    fn insert_compliance(&self, mut compliance: Compliance) -> Result<Compliance, StoreError> {
        let mut inner = self.lock()?;
        compliance.id = ComplianceId(inner.next_id());
        inner.compliances.insert(compliance.id, compliance.clone());
        Ok(compliance)
    }

    fn compliance(&self, id: ComplianceId) -> Result<Compliance, StoreError> {
        let inner = self.lock()?;
        inner
            .compliances
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update_compliance(&self, compliance: Compliance) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.compliances.contains_key(&compliance.id) {
            return Err(StoreError::NotFound);
        }
        inner.compliances.insert(compliance.id, compliance);
        Ok(())
    }

    fn compliances_for_requirement(
        &self,
        requirement: RequirementId,
    ) -> Result<Vec<Compliance>, StoreError> {
        let inner = self.lock()?;
        let mut compliances: Vec<Compliance> = inner
            .compliances
            .values()
            .filter(|compliance| compliance.requirement == requirement)
            .cloned()
            .collect();
        compliances.sort_by_key(|compliance| (compliance.due_date, compliance.id));
        Ok(compliances)
    }

    fn compliances_for_proposal(
        &self,
        proposal: ProposalId,
    ) -> Result<Vec<Compliance>, StoreError> {
        let inner = self.lock()?;
        let mut compliances: Vec<Compliance> = inner
            .compliances
            .values()
            .filter(|compliance| compliance.proposal == proposal)
            .cloned()
            .collect();
        compliances.sort_by_key(|compliance| (compliance.due_date, compliance.id));
        Ok(compliances)
    }

    fn find_compliance(
        &self,
        requirement: RequirementId,
        due_date: NaiveDate,
    ) -> Result<Option<Compliance>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .compliances
            .values()
            .find(|compliance| {
                compliance.requirement == requirement && compliance.due_date == due_date
            })
            .cloned())
    }
}

impl InvoicingStore for InMemoryLeasingStore {
    fn insert_invoicing_details(
        &self,
        mut details: InvoicingDetails,
    ) -> Result<InvoicingDetails, StoreError> {
        let mut inner = self.lock()?;
        details.id = InvoicingDetailsId(inner.next_id());
        inner.invoicing_details.insert(details.id, details.clone());
        Ok(details)
    }

    fn invoicing_details(
        &self,
        id: InvoicingDetailsId,
    ) -> Result<InvoicingDetails, StoreError> {
        let inner = self.lock()?;
        inner
            .invoicing_details
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update_invoicing_details(&self, details: InvoicingDetails) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.invoicing_details.contains_key(&details.id) {
            return Err(StoreError::NotFound);
        }
        inner.invoicing_details.insert(details.id, details);
        Ok(())
    }
}

impl InvoiceStore for InMemoryLeasingStore {
    fn insert_invoice(&self, mut invoice: Invoice) -> Result<Invoice, StoreError> {
        let mut inner = self.lock()?;
        if inner
            .invoices
            .values()
            .any(|existing| existing.uuid == invoice.uuid)
        {
            return Err(StoreError::Conflict);
        }
        invoice.id = InvoiceId(inner.next_id());
        inner.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Invoice, StoreError> {
        let inner = self.lock()?;
        inner.invoices.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn invoice_by_uuid(&self, uuid: Uuid) -> Result<Option<Invoice>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .invoices
            .values()
            .find(|invoice| invoice.uuid == uuid)
            .cloned())
    }

    fn update_invoice(&self, invoice: Invoice) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.invoices.contains_key(&invoice.id) {
            return Err(StoreError::NotFound);
        }
        inner.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    fn update_invoice_if_status(
        &self,
        expected: InvoiceStatus,
        invoice: Invoice,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let stored = inner.invoices.get(&invoice.id).ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            return Err(StoreError::Stale);
        }
        inner.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    fn invoices_for_approval(&self, approval: ApprovalId) -> Result<Vec<Invoice>, StoreError> {
        let inner = self.lock()?;
        let mut invoices: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|invoice| invoice.approval == approval)
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| invoice.id);
        Ok(invoices)
    }

    fn insert_transaction(
        &self,
        mut transaction: InvoiceTransaction,
    ) -> Result<InvoiceTransaction, StoreError> {
        let mut inner = self.lock()?;
        if !inner.invoices.contains_key(&transaction.invoice) {
            return Err(StoreError::NotFound);
        }
        transaction.id = TransactionId(inner.next_id());
        inner.transactions.push(transaction.clone());
        Ok(transaction)
    }

    fn transactions_for_invoice(
        &self,
        invoice: InvoiceId,
    ) -> Result<Vec<InvoiceTransaction>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .filter(|transaction| transaction.invoice == invoice)
            .cloned()
            .collect())
    }
}

impl OutboxStore for InMemoryLeasingStore {
    fn enqueue_outbox(&self, mut record: OutboxRecord) -> Result<OutboxRecord, StoreError> {
        let mut inner = self.lock()?;
        record.id = OutboxRecordId(inner.next_id());
        inner.outbox.insert(record.id, record.clone());
        Ok(record)
    }

    fn pending_outbox(&self) -> Result<Vec<OutboxRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<OutboxRecord> = inner
            .outbox
            .values()
            .filter(|record| record.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    fn update_outbox(&self, record: OutboxRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.outbox.contains_key(&record.id) {
            return Err(StoreError::NotFound);
        }
        inner.outbox.insert(record.id, record);
        Ok(())
    }
}

impl ReminderLogStore for InMemoryLeasingStore {
    fn reminder_sent(
        &self,
        approval: ApprovalId,
        year: u32,
        threshold: u16,
    ) -> Result<bool, StoreError> {
        let inner = self.lock()?;
        Ok(inner.reminders.contains(&(approval, year, threshold)))
    }

    fn record_reminder(
        &self,
        approval: ApprovalId,
        year: u32,
        threshold: u16,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.reminders.insert((approval, year, threshold));
        Ok(())
    }

    fn review_reminder_sent(
        &self,
        approval: ApprovalId,
        review_date: NaiveDate,
        months: u16,
    ) -> Result<bool, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .review_reminders
            .contains(&(approval, review_date, months)))
    }

    fn record_review_reminder(
        &self,
        approval: ApprovalId,
        review_date: NaiveDate,
        months: u16,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.review_reminders.insert((approval, review_date, months));
        Ok(())
    }
}
