//! # Credit Types
//!
//! Domain types and port traits for the credit lifecycle engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Account, Credit, PaymentScheduleEntry,
//!   Transaction) and the amortization math
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Request types for the operations the core exposes
//! - `error/` - Domain, repository and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Account, AccountId, AccountStatus, Credit, CreditId, CreditStatus, Currency, EntryId, Money,
    PaymentScheduleEntry, PaymentStatus, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId, amortization,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    Clock, CreditStore, LedgerStore, ManualClock, NotificationKind, Notifier, NotifyError,
    PaymentScheduleStore, RateError, RateProvider, Settlement, Store, SystemClock,
};
