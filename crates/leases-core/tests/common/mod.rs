//! Shared harness for the workflow integration suites.
#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use leases_core::charges::cpi::CpiTable;
use leases_core::charges::ChargeMethod;
use leases_core::invoicing::ledger::{InvoiceLedger, LedgerPolicy};
use leases_core::ports::{
    DocumentCategory, DocumentStore, FutureInvoice, FutureInvoiceRequest, GatewayError,
    IdentityDirectory, Notification, NotificationError, NotificationSender, PaymentGateway, Roles,
};
use leases_core::proposals::domain::{
    ApplicationType, Approval, ApprovalType, ApprovalTypeKind, PostalAddress, ProcessingStatus,
    Proposal, ProposalType, UserId,
};
use leases_core::proposals::requirements::{standard_requirement_catalogue, RequirementEngine};
use leases_core::proposals::service::{
    FinalApprovalOutcome, IssuanceRequest, LodgementRequest, ProposalService,
};
use leases_core::store::InMemoryLeasingStore;

pub const APPLICANT: UserId = UserId(1);
pub const ASSESSOR: UserId = UserId(100);
pub const APPROVER: UserId = UserId(200);
pub const FINANCE: UserId = UserId(300);
pub const REFEREE: UserId = UserId(42);
pub const SECOND_REFEREE: UserId = UserId(43);

#[derive(Default)]
pub struct TestDirectory {
    roles: Mutex<HashMap<UserId, Roles>>,
}

impl TestDirectory {
    pub fn grant(&self, user: UserId, roles: Roles) {
        self.roles
            .lock()
            .expect("roles mutex poisoned")
            .insert(user, roles);
    }
}

impl IdentityDirectory for TestDirectory {
    fn roles(&self, user: UserId) -> Roles {
        self.roles
            .lock()
            .expect("roles mutex poisoned")
            .get(&user)
            .copied()
            .unwrap_or_else(Roles::none)
    }
}

#[derive(Default)]
pub struct RecordingSender {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSender {
    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSender for RecordingSender {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingDocuments {
    counts: Mutex<HashMap<(leases_core::proposals::domain::ProposalId, DocumentCategory), usize>>,
}

impl DocumentStore for CountingDocuments {
    fn attach(
        &self,
        proposal: leases_core::proposals::domain::ProposalId,
        category: DocumentCategory,
    ) {
        let mut guard = self.counts.lock().expect("document mutex poisoned");
        *guard.entry((proposal, category)).or_insert(0) += 1;
    }

    fn count(
        &self,
        proposal: leases_core::proposals::domain::ProposalId,
        category: DocumentCategory,
    ) -> usize {
        self.counts
            .lock()
            .expect("document mutex poisoned")
            .get(&(proposal, category))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct RecordingGateway {
    pub requests: Mutex<Vec<FutureInvoiceRequest>>,
    pub fail: Mutex<bool>,
}

impl RecordingGateway {
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().expect("gateway mutex poisoned") = failing;
    }

    pub fn requests(&self) -> Vec<FutureInvoiceRequest> {
        self.requests.lock().expect("gateway mutex poisoned").clone()
    }
}

impl PaymentGateway for RecordingGateway {
    fn create_future_invoice(
        &self,
        request: FutureInvoiceRequest,
    ) -> Result<FutureInvoice, GatewayError> {
        if *self.fail.lock().expect("gateway mutex poisoned") {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        let key = request.invoice_uuid.simple().to_string();
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .push(request);
        Ok(FutureInvoice {
            order_number: format!("ORD-{}", &key[..8]),
            basket_id: format!("BKT-{}", &key[..8]),
            invoice_reference: format!("REF-{}", &key[..8]),
        })
    }
}

pub struct Harness {
    pub store: Arc<InMemoryLeasingStore>,
    pub directory: Arc<TestDirectory>,
    pub notifications: Arc<RecordingSender>,
    pub documents: Arc<CountingDocuments>,
    pub service: ProposalService<InMemoryLeasingStore, TestDirectory, RecordingSender, CountingDocuments>,
    pub ledger: InvoiceLedger<InMemoryLeasingStore, TestDirectory, RecordingSender>,
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn at_nine(day: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).expect("valid time"))
}

pub fn harness() -> Harness {
    harness_with_cpi(CpiTable::new(Vec::new()))
}

pub fn harness_with_cpi(cpi: CpiTable) -> Harness {
    let store = Arc::new(InMemoryLeasingStore::default());
    let directory = Arc::new(TestDirectory::default());
    directory.grant(
        ASSESSOR,
        Roles {
            is_assessor: true,
            is_approver: false,
            is_finance_officer: false,
        },
    );
    directory.grant(
        APPROVER,
        Roles {
            is_assessor: false,
            is_approver: true,
            is_finance_officer: false,
        },
    );
    directory.grant(
        FINANCE,
        Roles {
            is_assessor: false,
            is_approver: false,
            is_finance_officer: true,
        },
    );
    let notifications = Arc::new(RecordingSender::default());
    let documents = Arc::new(CountingDocuments::default());
    let requirements = RequirementEngine::new(
        Arc::clone(&store),
        standard_requirement_catalogue(),
    );
    let service = ProposalService::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        Arc::clone(&notifications),
        Arc::clone(&documents),
        requirements,
        cpi,
        Decimal::TEN,
    );
    let ledger = InvoiceLedger::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        Arc::clone(&notifications),
        LedgerPolicy {
            gst_rate: Decimal::TEN,
            days_before_payment_due: 30,
        },
    );
    Harness {
        store,
        directory,
        notifications,
        documents,
        service,
        ledger,
    }
}

pub fn perth_address() -> PostalAddress {
    PostalAddress {
        line1: "17 Banksia Way".to_string(),
        locality: "Busselton".to_string(),
        state: "WA".to_string(),
        postcode: "6280".to_string(),
    }
}

pub fn lodge_lease_licence(harness: &Harness) -> Proposal {
    harness
        .service
        .lodge(LodgementRequest {
            proposal_type: ProposalType::New,
            application_type: ApplicationType::LeaseLicence,
            submitter: APPLICANT,
            organisation: None,
            individual: Some(APPLICANT),
            proxy: None,
            postal_address: Some(perth_address()),
            site_name: Some("Banksia camp".to_string()),
            groups: vec!["South West".to_string()],
        })
        .expect("proposal lodges")
}

pub fn attach_licence_documents(harness: &Harness, proposal: &Proposal) {
    for category in [
        DocumentCategory::LicenceDocument,
        DocumentCategory::CoverLetter,
        DocumentCategory::SignOffSheet,
    ] {
        harness.documents.attach(proposal.id, category);
    }
}

/// Walks a new lease/licence proposal all the way to an issued approval.
pub fn issue_lease(
    harness: &Harness,
    charge_method: ChargeMethod,
    start: NaiveDate,
    expiry: NaiveDate,
    today: NaiveDate,
) -> (Proposal, Approval) {
    let proposal = lodge_lease_licence(harness);
    harness
        .service
        .submit(APPLICANT, proposal.id)
        .expect("proposal submits");
    harness
        .service
        .move_to_status(
            ASSESSOR,
            proposal.id,
            ProcessingStatus::WithAssessorConditions,
            None,
        )
        .expect("moves to conditions");
    harness
        .service
        .move_to_status(APPROVER, proposal.id, ProcessingStatus::WithApprover, None)
        .expect("moves to approver");
    attach_licence_documents(harness, &proposal);

    let outcome = harness
        .service
        .final_approval(
            APPROVER,
            proposal.id,
            IssuanceRequest {
                decision: None,
                approval_type: Some(ApprovalType {
                    kind: ApprovalTypeKind::Lease,
                    gst_free: false,
                }),
                start_date: Some(start),
                expiry_date: Some(expiry),
                record_management_number: Some("DOC2025/100".to_string()),
                details: None,
                charge_method: Some(charge_method),
            },
            today,
            at_nine(today),
        )
        .expect("approval issues");

    match outcome {
        FinalApprovalOutcome::ApprovalReady { proposal, approval } => (proposal, approval),
        other => panic!("expected an issued approval, got {other:?}"),
    }
}
