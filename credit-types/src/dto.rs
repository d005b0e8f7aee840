//! Data Transfer Objects (DTOs) for requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, AccountId, Credit, Currency, PaymentScheduleEntry, Transaction, UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Account DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub currency: Currency,
}

/// Request to deposit money into an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Target account ID
    pub account_id: AccountId,
    /// Amount in rubles, at most two fractional digits
    pub amount: Decimal,
}

/// Request to withdraw money from an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Source account ID
    pub account_id: AccountId,
    pub amount: Decimal,
}

/// Request to transfer money between accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Source account ID
    pub from_account_id: AccountId,
    /// Destination account ID
    pub to_account_id: AccountId,
    pub amount: Decimal,
}

/// Result of a balance mutation: the recorded transaction (if the audit
/// write succeeded) and the post-mutation balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    /// New balance of source account (for withdrawals/transfers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance_source: Option<Decimal>,
    /// New balance of destination account (for deposits/transfers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance_destination: Option<Decimal>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Credit DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to issue a credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCreditRequest {
    pub user_id: UserId,
    /// Account receiving the principal and paying the schedule
    pub account_id: AccountId,
    pub amount: Decimal,
    pub term_months: u32,
}

/// A credit together with its derived figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditResponse {
    #[serde(flatten)]
    pub credit: Credit,
    pub total_cost: Decimal,
    pub total_interest: Decimal,
}

impl From<Credit> for CreditResponse {
    fn from(credit: Credit) -> Self {
        Self {
            total_cost: credit.total_cost(),
            total_interest: credit.total_interest(),
            credit,
        }
    }
}

/// A credit's full repayment plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub credit: CreditResponse,
    pub entries: Vec<PaymentScheduleEntry>,
}

/// An account with its transaction history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHistory {
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweep DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Counters reported at the end of an overdue sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Due entries found
    pub total: usize,
    /// Entries handled without error (paid + overdue)
    pub processed: usize,
    pub paid: usize,
    /// Entries left unpaid with a penalty accrued
    pub overdue: usize,
    pub failed: usize,
}

