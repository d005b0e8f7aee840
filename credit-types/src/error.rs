//! Error types for the credit engine.

use rust_decimal::Decimal;

use crate::domain::{AccountId, AccountStatus, CreditId, Currency, EntryId, PaymentStatus};

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account {id} is {status}")]
    AccountInactive { id: AccountId, status: AccountStatus },

    #[error("Credit not found: {0}")]
    CreditNotFound(CreditId),

    #[error("Schedule entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Schedule entry {id} is {status} and cannot be settled")]
    EntryNotPayable { id: EntryId, status: PaymentStatus },

    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl RepoError {
    /// True when the failure is the business outcome "not enough money".
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, RepoError::Domain(DomainError::InsufficientFunds { .. }))
    }

    /// True when the account exists but is blocked or closed.
    pub fn is_account_inactive(&self) -> bool {
        matches!(self, RepoError::Domain(DomainError::AccountInactive { .. }))
    }
}

/// Application-level errors, the classification callers see.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inactive: {0}")]
    Inactive(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientFunds {
                available,
                requested,
            } => AppError::InsufficientFunds {
                available,
                requested,
            },
            e @ (DomainError::AccountNotFound(_)
            | DomainError::CreditNotFound(_)
            | DomainError::EntryNotFound(_)) => AppError::NotFound(e.to_string()),
            e @ DomainError::AccountInactive { .. } => AppError::Inactive(e.to_string()),
            e @ DomainError::EntryNotPayable { .. } => AppError::Conflict(e.to_string()),
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}
