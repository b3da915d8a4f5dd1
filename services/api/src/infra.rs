use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use leases_core::charges::cpi::CpiTable;
use leases_core::config::InvoicingConfig;
use leases_core::invoicing::generation::InvoiceGenerationJob;
use leases_core::invoicing::ledger::{InvoiceLedger, LedgerPolicy};
use leases_core::invoicing::outbox::OutboxWorker;
use leases_core::invoicing::reminders::{CrownLandRentReviewReminderJob, CustomCpiReminderJob};
use leases_core::ports::{
    DocumentCategory, DocumentStore, FutureInvoice, FutureInvoiceRequest, GatewayError,
    IdentityDirectory, Notification, NotificationError, NotificationSender, PaymentGateway, Roles,
};
use leases_core::proposals::domain::{ProposalId, UserId};
use leases_core::proposals::requirements::{standard_requirement_catalogue, RequirementEngine};
use leases_core::proposals::service::ProposalService;
use leases_core::store::LeasingStore;

/// Gateway registration attempts per outbox record before it is abandoned.
const GATEWAY_SYNC_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Group membership lookup backed by a table seeded at startup.
#[derive(Default)]
pub(crate) struct StaticIdentityDirectory {
    roles: Mutex<HashMap<UserId, Roles>>,
}

impl StaticIdentityDirectory {
    pub(crate) fn grant(&self, user: UserId, roles: Roles) {
        let mut guard = self.roles.lock().expect("roles mutex poisoned");
        guard.insert(user, roles);
    }
}

impl IdentityDirectory for StaticIdentityDirectory {
    fn roles(&self, user: UserId) -> Roles {
        let guard = self.roles.lock().expect("roles mutex poisoned");
        guard.get(&user).copied().unwrap_or_else(Roles::none)
    }
}

/// Records every notification and logs it; stands in for the mail transport.
#[derive(Default)]
pub(crate) struct RecordingNotificationSender {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotificationSender {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSender for RecordingNotificationSender {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(event = ?notification, "notification dispatched");
        let mut guard = self.events.lock().expect("notification mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

/// Tallies attached documents per proposal and category.
#[derive(Default)]
pub(crate) struct InMemoryDocumentStore {
    counts: Mutex<HashMap<(ProposalId, DocumentCategory), usize>>,
}

impl DocumentStore for InMemoryDocumentStore {
    fn attach(&self, proposal: ProposalId, category: DocumentCategory) {
        let mut guard = self.counts.lock().expect("document mutex poisoned");
        *guard.entry((proposal, category)).or_insert(0) += 1;
    }

    fn count(&self, proposal: ProposalId, category: DocumentCategory) -> usize {
        let guard = self.counts.lock().expect("document mutex poisoned");
        guard.get(&(proposal, category)).copied().unwrap_or(0)
    }
}

/// Fake payment gateway issuing deterministic correlation keys.
#[derive(Default)]
pub(crate) struct RecordingPaymentGateway {
    requests: Mutex<Vec<FutureInvoiceRequest>>,
}

impl RecordingPaymentGateway {
    pub(crate) fn requests(&self) -> Vec<FutureInvoiceRequest> {
        self.requests.lock().expect("gateway mutex poisoned").clone()
    }
}

impl PaymentGateway for RecordingPaymentGateway {
    fn create_future_invoice(
        &self,
        request: FutureInvoiceRequest,
    ) -> Result<FutureInvoice, GatewayError> {
        let uuid = request.invoice_uuid;
        let mut guard = self.requests.lock().expect("gateway mutex poisoned");
        guard.push(request);
        Ok(FutureInvoice {
            order_number: format!("ORD-{}", short_key(uuid)),
            basket_id: format!("BKT-{}", short_key(uuid)),
            invoice_reference: format!("REF-{}", short_key(uuid)),
        })
    }
}

fn short_key(uuid: Uuid) -> String {
    uuid.simple().to_string()[..8].to_string()
}

/// Everything the HTTP layer and CLI need to serve the workflows.
pub(crate) struct LeasingContext<S, D, N, C> {
    pub(crate) store: Arc<S>,
    pub(crate) documents: Arc<C>,
    pub(crate) proposals: ProposalService<S, D, N, C>,
    pub(crate) ledger: InvoiceLedger<S, D, N>,
}

impl<S, D, N, C> LeasingContext<S, D, N, C>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    pub(crate) fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifications: Arc<N>,
        documents: Arc<C>,
        cpi: CpiTable,
        invoicing: &InvoicingConfig,
    ) -> Self {
        let requirements =
            RequirementEngine::new(Arc::clone(&store), standard_requirement_catalogue());
        let proposals = ProposalService::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&notifications),
            Arc::clone(&documents),
            requirements,
            cpi,
            invoicing.gst_percentage,
        );
        let ledger = InvoiceLedger::new(
            Arc::clone(&store),
            directory,
            notifications,
            LedgerPolicy {
                gst_rate: invoicing.gst_percentage,
                days_before_payment_due: invoicing.days_before_payment_due,
            },
        );
        Self {
            store,
            documents,
            proposals,
            ledger,
        }
    }
}

/// The periodic work the serve loop drives: draining the gateway-sync outbox
/// plus the daily invoicing and reminder runs.
pub(crate) struct BackgroundJobs<S, G, N> {
    outbox: OutboxWorker<S, G, N>,
    generation: InvoiceGenerationJob<S, N>,
    cpi_reminders: CustomCpiReminderJob<S, N>,
    rent_review_reminders: CrownLandRentReviewReminderJob<S, N>,
}

impl<S, G, N> BackgroundJobs<S, G, N>
where
    S: LeasingStore + 'static,
    G: PaymentGateway + 'static,
    N: NotificationSender + 'static,
{
    pub(crate) fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        notifications: Arc<N>,
        cpi: CpiTable,
        invoicing: &InvoicingConfig,
    ) -> Self {
        Self {
            outbox: OutboxWorker::new(
                Arc::clone(&store),
                gateway,
                Arc::clone(&notifications),
                invoicing.external_url.clone(),
                invoicing.gst_percentage,
                GATEWAY_SYNC_MAX_ATTEMPTS,
            ),
            generation: InvoiceGenerationJob::new(
                Arc::clone(&store),
                Arc::clone(&notifications),
                cpi,
                invoicing.gst_percentage,
            ),
            cpi_reminders: CustomCpiReminderJob::new(
                Arc::clone(&store),
                Arc::clone(&notifications),
            ),
            rent_review_reminders: CrownLandRentReviewReminderJob::new(store, notifications),
        }
    }

    /// Drain pending gateway registrations once.
    pub(crate) fn run_gateway_sync(&self) {
        if let Err(error) = self.outbox.run() {
            warn!(%error, "gateway sync pass failed");
        }
    }

    /// The once-a-day runs: raise reached invoicing periods and chase the
    /// manually maintained CPI figures and rent reviews.
    pub(crate) fn run_daily(&self, today: NaiveDate) {
        if let Err(error) = self.generation.run(today) {
            warn!(%error, "invoice generation run failed");
        }
        if let Err(error) = self.cpi_reminders.run(today) {
            warn!(%error, "custom CPI reminder run failed");
        }
        if let Err(error) = self.rent_review_reminders.run(today) {
            warn!(%error, "rent review reminder run failed");
        }
    }
}

/// Well-known demo officers seeded into the directory at startup.
pub(crate) const DEMO_ASSESSOR: UserId = UserId(100);
pub(crate) const DEMO_APPROVER: UserId = UserId(200);
pub(crate) const DEMO_FINANCE_OFFICER: UserId = UserId(300);

pub(crate) fn seeded_directory() -> StaticIdentityDirectory {
    let directory = StaticIdentityDirectory::default();
    directory.grant(
        DEMO_ASSESSOR,
        Roles {
            is_assessor: true,
            is_approver: false,
            is_finance_officer: false,
        },
    );
    directory.grant(
        DEMO_APPROVER,
        Roles {
            is_assessor: false,
            is_approver: true,
            is_finance_officer: false,
        },
    );
    directory.grant(
        DEMO_FINANCE_OFFICER,
        Roles {
            is_assessor: false,
            is_approver: false,
            is_finance_officer: true,
        },
    );
    directory
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|err| format!("failed to parse '{raw}' as a decimal amount ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leases_core::invoicing::ledger::Invoice;
    use leases_core::invoicing::outbox::OutboxRecord;
    use leases_core::proposals::domain::ApprovalId;
    use leases_core::store::{InMemoryLeasingStore, InvoiceStore, OutboxStore};

    #[test]
    fn gateway_sync_drains_queued_invoices() {
        let store = Arc::new(InMemoryLeasingStore::default());
        let notifications = Arc::new(RecordingNotificationSender::default());
        let gateway = Arc::new(RecordingPaymentGateway::default());
        let invoicing = InvoicingConfig {
            gst_percentage: Decimal::TEN,
            days_before_payment_due: 30,
            external_url: "http://localhost:3000".to_string(),
        };
        let jobs = BackgroundJobs::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            notifications,
            CpiTable::new(Vec::new()),
            &invoicing,
        );

        let invoice = store
            .insert_invoice(Invoice::pending(ApprovalId(1), Decimal::from(500), false))
            .expect("invoice inserted");
        store
            .enqueue_outbox(OutboxRecord::new(invoice.id))
            .expect("outbox queued");

        jobs.run_gateway_sync();

        assert_eq!(gateway.requests().len(), 1);
        assert!(store.pending_outbox().expect("outbox").is_empty());
        let synced = store.invoice(invoice.id).expect("invoice");
        assert!(synced.order_number.is_some());
    }
}
