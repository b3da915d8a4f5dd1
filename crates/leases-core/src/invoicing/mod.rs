//! Invoicing: the schedule engine, the ledger, and the background runs that
//! keep invoices flowing for the life of an approval.

pub mod details;
pub mod generation;
pub mod ledger;
pub mod outbox;
pub mod reminders;
