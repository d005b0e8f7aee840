//! Application services.
//!
//! Orchestrate domain operations through the store ports.
//! Contain NO infrastructure logic - pure business orchestration.

mod credit;
mod ledger;

pub use credit::{CreditPolicy, CreditService};
pub use ledger::LedgerService;

pub(crate) use ledger::record_audit;
