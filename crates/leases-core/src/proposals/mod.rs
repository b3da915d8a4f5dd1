//! Proposal processing: domain records, the assessment state machine, and
//! requirement generation.

pub mod domain;
pub mod requirements;
pub mod service;
