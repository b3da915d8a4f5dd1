//! Invoice records and the ledger operations over them.
//!
//! An invoice is created as `PendingUpload`, becomes `Unpaid` once a finance
//! officer attaches the oracle invoice number, and settles to `Paid` when its
//! balance reaches exactly zero. `Void` is reserved for invoices raised in
//! error before any money moves.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::charges::money::quantize;
use crate::error::WorkflowError;
use crate::invoicing::outbox::OutboxRecord;
use crate::ports::{IdentityDirectory, Notification, NotificationSender};
use crate::proposals::domain::{ApprovalId, UserId};
use crate::store::{ApprovalStore, InvoiceStore, OutboxStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub u64);

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "I{:06}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    PendingUpload,
    Unpaid,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InvoiceStatus::PendingUpload => "pending upload",
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Correlation key shared with the external payment system.
    pub uuid: Uuid,
    pub approval: ApprovalId,
    pub status: InvoiceStatus,
    /// GST-inclusive amount owed (GST free when the approval type is).
    pub amount: Decimal,
    pub gst_free: bool,
    pub description: Option<String>,
    pub ad_hoc: bool,
    pub cover_start: Option<NaiveDate>,
    pub cover_end: Option<NaiveDate>,
    pub date_issued: Option<DateTime<Utc>>,
    pub date_due: Option<NaiveDate>,
    pub date_paid: Option<DateTime<Utc>>,
    pub oracle_invoice_number: Option<String>,
    pub order_number: Option<String>,
    pub basket_id: Option<String>,
    pub invoice_reference: Option<String>,
}

impl Invoice {
    /// A freshly raised invoice awaiting its oracle invoice number.
    pub fn pending(approval: ApprovalId, amount: Decimal, gst_free: bool) -> Self {
        Self {
            id: InvoiceId(0),
            uuid: Uuid::new_v4(),
            approval,
            status: InvoiceStatus::PendingUpload,
            amount: quantize(amount),
            gst_free,
            description: None,
            ad_hoc: false,
            cover_start: None,
            cover_end: None,
            date_issued: None,
            date_due: None,
            date_paid: None,
            oracle_invoice_number: None,
            order_number: None,
            basket_id: None,
            invoice_reference: None,
        }
    }

    pub fn lodgement_number(&self) -> String {
        self.id.to_string()
    }
}

/// A credit or debit recorded against an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTransaction {
    pub id: TransactionId,
    pub invoice: InvoiceId,
    pub credit: Decimal,
    pub debit: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Amount still owed: invoice amount plus credits, minus debits.
pub fn balance(invoice: &Invoice, transactions: &[InvoiceTransaction]) -> Decimal {
    let mut total = invoice.amount;
    for transaction in transactions {
        total += transaction.credit;
        total -= transaction.debit;
    }
    quantize(total)
}

/// Per-transaction running balance, oldest first, for statement views.
pub fn running_balances(
    invoice: &Invoice,
    transactions: &[InvoiceTransaction],
) -> Vec<(TransactionId, Decimal)> {
    let mut total = invoice.amount;
    transactions
        .iter()
        .map(|transaction| {
            total += transaction.credit;
            total -= transaction.debit;
            (transaction.id, quantize(total))
        })
        .collect()
}

/// Tunables the ledger reads from configuration.
#[derive(Debug, Clone)]
pub struct LedgerPolicy {
    /// GST percentage, e.g. 10.
    pub gst_rate: Decimal,
    /// Days between issuing an invoice and its payment falling due.
    pub days_before_payment_due: i64,
}

/// Ledger operations: recording transactions, issuing, and settling invoices.
pub struct InvoiceLedger<S, D, N> {
    store: Arc<S>,
    identity: Arc<D>,
    notifications: Arc<N>,
    policy: LedgerPolicy,
}

impl<S, D, N> InvoiceLedger<S, D, N>
where
    S: InvoiceStore + OutboxStore + ApprovalStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        store: Arc<S>,
        identity: Arc<D>,
        notifications: Arc<N>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            identity,
            notifications,
            policy,
        }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    pub fn invoice(&self, id: InvoiceId) -> Result<Invoice, WorkflowError> {
        Ok(self.store.invoice(id)?)
    }

    pub fn balance_of(&self, id: InvoiceId) -> Result<Decimal, WorkflowError> {
        let invoice = self.store.invoice(id)?;
        let transactions = self.store.transactions_for_invoice(id)?;
        Ok(balance(&invoice, &transactions))
    }

    /// Record a credit or debit. When the resulting balance is exactly zero
    /// the invoice is marked paid; a paid invoice never returns to unpaid
    /// through this path.
    pub fn record_transaction(
        &self,
        actor: UserId,
        invoice_id: InvoiceId,
        credit: Decimal,
        debit: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Invoice, WorkflowError> {
        self.require_finance_officer(actor)?;
        if credit < Decimal::ZERO || debit < Decimal::ZERO {
            return Err(WorkflowError::Validation(
                "credit and debit amounts must not be negative".to_string(),
            ));
        }
        // Ledger lines are stored to the cent; settle on the stored values.
        let credit = quantize(credit);
        let debit = quantize(debit);

        let mut invoice = self.store.invoice(invoice_id)?;
        let observed = invoice.status;
        match observed {
            InvoiceStatus::Paid => {
                return Err(WorkflowError::Validation(
                    "cannot record a transaction against a paid invoice".to_string(),
                ))
            }
            InvoiceStatus::Void => {
                return Err(WorkflowError::Validation(
                    "cannot record a transaction against a void invoice".to_string(),
                ))
            }
            InvoiceStatus::PendingUpload | InvoiceStatus::Unpaid => {}
        }

        let transactions = self.store.transactions_for_invoice(invoice_id)?;
        let new_balance = quantize(balance(&invoice, &transactions) + credit - debit);
        if new_balance == Decimal::ZERO {
            invoice.status = InvoiceStatus::Paid;
            invoice.date_paid = Some(now);
        }
        self.store.update_invoice_if_status(observed, invoice.clone())?;
        self.store.insert_transaction(InvoiceTransaction {
            id: TransactionId(0),
            invoice: invoice_id,
            credit,
            debit,
            recorded_at: now,
        })?;

        if invoice.status == InvoiceStatus::Paid {
            info!(invoice = %invoice_id, "invoice settled by recorded transaction");
            self.notifications.send(Notification::InvoicePaid {
                approval: invoice.approval,
                invoice_uuid: invoice.uuid,
            })?;
        }
        Ok(invoice)
    }

    /// Attach the oracle invoice number, issue the invoice, and queue it for
    /// registration with the payment gateway.
    pub fn upload_oracle_invoice(
        &self,
        actor: UserId,
        invoice_id: InvoiceId,
        oracle_invoice_number: String,
        now: DateTime<Utc>,
    ) -> Result<Invoice, WorkflowError> {
        self.require_finance_officer(actor)?;
        if oracle_invoice_number.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "oracle invoice number must not be empty".to_string(),
            ));
        }

        let mut invoice = self.store.invoice(invoice_id)?;
        if invoice.status != InvoiceStatus::PendingUpload {
            return Err(WorkflowError::Validation(format!(
                "invoice {} is {}, not awaiting upload",
                invoice.lodgement_number(),
                invoice.status.label()
            )));
        }

        invoice.oracle_invoice_number = Some(oracle_invoice_number);
        invoice.date_issued = Some(now);
        invoice.date_due =
            Some((now + Duration::days(self.policy.days_before_payment_due)).date_naive());
        invoice.status = InvoiceStatus::Unpaid;
        self.store
            .update_invoice_if_status(InvoiceStatus::PendingUpload, invoice.clone())?;
        // Same logical unit of work: the worker picks this up asynchronously.
        self.store.enqueue_outbox(OutboxRecord::new(invoice_id))?;

        info!(invoice = %invoice_id, due = ?invoice.date_due, "oracle invoice attached, gateway sync queued");
        Ok(invoice)
    }

    /// Payment-gateway success callback, keyed by the invoice uuid.
    /// Re-delivery against an already paid invoice is a no-op success.
    pub fn pay_invoice_success(
        &self,
        uuid: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Invoice, WorkflowError> {
        let mut invoice = self
            .store
            .invoice_by_uuid(uuid)?
            .ok_or(WorkflowError::NotFound("invoice"))?;

        match invoice.status {
            InvoiceStatus::Paid => return Ok(invoice),
            InvoiceStatus::Unpaid => {}
            other => {
                return Err(WorkflowError::Validation(format!(
                    "invoice {} is {}, not awaiting payment",
                    invoice.lodgement_number(),
                    other.label()
                )))
            }
        }

        let transactions = self.store.transactions_for_invoice(invoice.id)?;
        let outstanding = balance(&invoice, &transactions);
        invoice.status = InvoiceStatus::Paid;
        invoice.date_paid = Some(now);
        self.store
            .update_invoice_if_status(InvoiceStatus::Unpaid, invoice.clone())?;
        self.store.insert_transaction(InvoiceTransaction {
            id: TransactionId(0),
            invoice: invoice.id,
            credit: Decimal::ZERO,
            debit: outstanding,
            recorded_at: now,
        })?;

        info!(invoice = %invoice.id, %uuid, "invoice paid via gateway callback");
        self.notifications.send(Notification::InvoicePaid {
            approval: invoice.approval,
            invoice_uuid: invoice.uuid,
        })?;
        Ok(invoice)
    }

    /// Raise a one-off invoice outside the generated schedule.
    pub fn create_ad_hoc_invoice(
        &self,
        actor: UserId,
        approval_id: ApprovalId,
        amount: Decimal,
        description: String,
    ) -> Result<Invoice, WorkflowError> {
        self.require_finance_officer(actor)?;
        if amount <= Decimal::ZERO {
            return Err(WorkflowError::Validation(
                "ad hoc invoice amount must be greater than zero".to_string(),
            ));
        }
        let approval = self.store.approval(approval_id)?;
        let mut invoice = Invoice::pending(approval_id, amount, approval.approval_type.gst_free);
        invoice.ad_hoc = true;
        invoice.description = Some(description);
        let invoice = self.store.insert_invoice(invoice)?;
        info!(invoice = %invoice.id, approval = %approval_id, "ad hoc invoice raised");
        Ok(invoice)
    }

    /// Void an invoice raised in error. Only possible before any transaction
    /// is recorded against it.
    pub fn void_invoice(&self, actor: UserId, invoice_id: InvoiceId) -> Result<Invoice, WorkflowError> {
        self.require_finance_officer(actor)?;
        let mut invoice = self.store.invoice(invoice_id)?;
        let observed = invoice.status;
        if !matches!(
            observed,
            InvoiceStatus::PendingUpload | InvoiceStatus::Unpaid
        ) {
            return Err(WorkflowError::Validation(format!(
                "invoice {} is {} and cannot be voided",
                invoice.lodgement_number(),
                observed.label()
            )));
        }
        if !self.store.transactions_for_invoice(invoice_id)?.is_empty() {
            return Err(WorkflowError::Validation(
                "cannot void an invoice with recorded transactions".to_string(),
            ));
        }
        invoice.status = InvoiceStatus::Void;
        self.store.update_invoice_if_status(observed, invoice.clone())?;
        info!(invoice = %invoice_id, "invoice voided");
        Ok(invoice)
    }

    fn require_finance_officer(&self, actor: UserId) -> Result<(), WorkflowError> {
        if self.identity.roles(actor).is_finance_officer {
            Ok(())
        } else {
            Err(WorkflowError::NotAuthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice(amount: Decimal) -> Invoice {
        Invoice::pending(ApprovalId(1), amount, false)
    }

    fn transaction(credit: Decimal, debit: Decimal) -> InvoiceTransaction {
        InvoiceTransaction {
            id: TransactionId(0),
            invoice: InvoiceId(0),
            credit,
            debit,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn balance_is_amount_plus_credits_minus_debits() {
        let invoice = invoice(dec!(100.00));
        let transactions = vec![
            transaction(dec!(10.00), Decimal::ZERO),
            transaction(Decimal::ZERO, dec!(60.00)),
        ];
        assert_eq!(balance(&invoice, &transactions), dec!(50.00));
    }

    #[test]
    fn running_balances_accumulate_in_order() {
        let invoice = invoice(dec!(100.00));
        let transactions = vec![
            transaction(Decimal::ZERO, dec!(40.00)),
            transaction(Decimal::ZERO, dec!(60.00)),
        ];
        let balances: Vec<Decimal> = running_balances(&invoice, &transactions)
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        assert_eq!(balances, vec![dec!(60.00), dec!(0.00)]);
    }
}
