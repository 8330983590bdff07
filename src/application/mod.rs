//! Application layer containing the settlement orchestration.
//!
//! `TransactionSettler` settles one transaction against the twin store;
//! `SettlementRunner` feeds it from an event source one message at a time and
//! applies the log-and-drop policy.

pub mod runner;
pub mod settler;
