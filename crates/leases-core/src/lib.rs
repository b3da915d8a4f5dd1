//! Core engine for processing Crown land lease and licence proposals and
//! invoicing the approvals they produce.

pub mod charges;
pub mod compliances;
pub mod config;
pub mod error;
pub mod invoicing;
pub mod ports;
pub mod proposals;
pub mod store;
pub mod telemetry;
