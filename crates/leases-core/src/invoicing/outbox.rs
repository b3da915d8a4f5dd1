//! Durable outbox for payment-gateway registration.
//!
//! Issuing an invoice enqueues a record here in the same unit of work; a
//! worker drains the queue with bounded retries. A gateway failure never
//! disturbs the local invoice state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::charges::money::excl_gst;

use crate::error::WorkflowError;
use crate::invoicing::ledger::InvoiceId;
use crate::ports::{
    FutureInvoiceRequest, Notification, NotificationSender, PaymentGateway,
};
use crate::store::{InvoiceStore, OutboxStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutboxRecordId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Completed,
    Failed,
}

/// One queued gateway-registration attempt for an issued invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: OutboxRecordId,
    pub invoice: InvoiceId,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    pub fn new(invoice: InvoiceId) -> Self {
        Self {
            id: OutboxRecordId(0),
            invoice,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Outcome of one worker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxRunReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Drains pending gateway-sync records, retrying up to `max_attempts` times.
pub struct OutboxWorker<S, G, N> {
    store: Arc<S>,
    gateway: Arc<G>,
    notifications: Arc<N>,
    callback_base_url: String,
    gst_rate: Decimal,
    max_attempts: u32,
}

impl<S, G, N> OutboxWorker<S, G, N>
where
    S: InvoiceStore + OutboxStore + 'static,
    G: PaymentGateway + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        notifications: Arc<N>,
        callback_base_url: String,
        gst_rate: Decimal,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            notifications,
            callback_base_url,
            gst_rate,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Process every pending record once. Per-record failures are retained on
    /// the record and never abort the pass.
    pub fn run(&self) -> Result<OutboxRunReport, WorkflowError> {
        let mut report = OutboxRunReport::default();
        for mut record in self.store.pending_outbox()? {
            report.processed += 1;
            match self.sync_invoice(&record) {
                Ok(()) => {
                    record.status = OutboxStatus::Completed;
                    record.last_error = None;
                    report.completed += 1;
                }
                Err(error) => {
                    record.attempts += 1;
                    record.last_error = Some(error.to_string());
                    if record.attempts >= self.max_attempts {
                        record.status = OutboxStatus::Failed;
                        report.failed += 1;
                        warn!(
                            invoice = %record.invoice,
                            attempts = record.attempts,
                            %error,
                            "gateway sync abandoned after repeated failures"
                        );
                    } else {
                        warn!(invoice = %record.invoice, attempts = record.attempts, %error, "gateway sync failed, will retry");
                    }
                }
            }
            self.store.update_outbox(record)?;
        }
        Ok(report)
    }

    fn sync_invoice(&self, record: &OutboxRecord) -> Result<(), WorkflowError> {
        let mut invoice = self.store.invoice(record.invoice)?;
        let description = match &invoice.description {
            Some(text) => text.clone(),
            None => format!("Invoice {} for approval {}", invoice.lodgement_number(), invoice.approval),
        };
        let registered = self.gateway.create_future_invoice(FutureInvoiceRequest {
            invoice_uuid: invoice.uuid,
            description,
            amount_incl_tax: invoice.amount,
            amount_excl_tax: excl_gst(invoice.amount, self.gst_rate, invoice.gst_free),
            callback_url: format!(
                "{}/api/v1/invoicing/pay-invoice-success/{}",
                self.callback_base_url.trim_end_matches('/'),
                invoice.uuid
            ),
        })?;

        invoice.order_number = Some(registered.order_number);
        invoice.basket_id = Some(registered.basket_id);
        invoice.invoice_reference = Some(registered.invoice_reference);
        self.store.update_invoice(invoice.clone())?;

        info!(invoice = %invoice.id, "invoice registered with payment gateway");
        self.notifications.send(Notification::InvoiceRaised {
            approval: invoice.approval,
            invoice_uuid: invoice.uuid,
        })?;
        Ok(())
    }
}
