//! # Credit Hex
//!
//! Application services and outbound adapters for the credit engine.
//!
//! ## Architecture
//!
//! - `service/` - Application services (ledger operations, credit lifecycle)
//! - `processor` - Overdue payment processor (sweep state machine + scheduler)
//! - `outbound/` - Adapters for the rate provider and notification ports
//!
//! Every service is generic over its store port, so the in-memory store and
//! the database-backed ones are interchangeable.

pub mod outbound;
pub mod processor;
pub mod service;

#[cfg(test)]
mod processor_tests;

pub use processor::{OverdueProcessor, ProcessorState, SweepConfig};
pub use service::{CreditPolicy, CreditService, LedgerService};
