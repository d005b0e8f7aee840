//! Transaction (ledger entry) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AccountId, CreditId, TransactionId};
use super::money::Money;
use crate::error::DomainError;

/// The kind of balance change a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money coming into an account from outside the bank
    Deposit,
    /// Money leaving an account to outside the bank
    Withdraw,
    /// Money moving between two accounts in the bank
    Transfer,
    /// Credit principal paid out to the funding account
    CreditDisbursement,
    /// Scheduled credit payment collected from the funding account
    CreditPayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Transfer => "transfer",
            TransactionType::CreditDisbursement => "credit_disbursement",
            TransactionType::CreditPayment => "credit_payment",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "transfer" => Ok(TransactionType::Transfer),
            "credit_disbursement" => Ok(TransactionType::CreditDisbursement),
            "credit_payment" => Ok(TransactionType::CreditPayment),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transaction type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// A recorded balance change.
///
/// Transactions are immutable once created - they are the audit trail
/// for every balance mutation. The account balance stays the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: TransactionId,
    /// Type of transaction
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    /// Amount moved
    pub amount: Money,
    /// Source account (None for deposits and disbursements)
    pub source_account_id: Option<AccountId>,
    /// Destination account (None for withdrawals and credit payments)
    pub destination_account_id: Option<AccountId>,
    pub description: String,
    /// When the transaction was created
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    fn completed(
        transaction_type: TransactionType,
        amount: Money,
        source_account_id: Option<AccountId>,
        destination_account_id: Option<AccountId>,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            transaction_type,
            status: TransactionStatus::Completed,
            amount,
            source_account_id,
            destination_account_id,
            description,
            created_at: now,
        }
    }

    /// Creates a new deposit transaction.
    pub fn deposit(destination: AccountId, amount: Money, now: DateTime<Utc>) -> Self {
        Self::completed(
            TransactionType::Deposit,
            amount,
            None,
            Some(destination),
            "Account deposit".into(),
            now,
        )
    }

    /// Creates a new withdrawal transaction.
    pub fn withdraw(source: AccountId, amount: Money, now: DateTime<Utc>) -> Self {
        Self::completed(
            TransactionType::Withdraw,
            amount,
            Some(source),
            None,
            "Account withdrawal".into(),
            now,
        )
    }

    /// Creates a new transfer transaction.
    pub fn transfer(
        source: AccountId,
        destination: AccountId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self::completed(
            TransactionType::Transfer,
            amount,
            Some(source),
            Some(destination),
            "Account transfer".into(),
            now,
        )
    }

    /// Creates the disbursement entry for a freshly issued credit.
    pub fn credit_disbursement(
        destination: AccountId,
        credit_id: CreditId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self::completed(
            TransactionType::CreditDisbursement,
            amount,
            None,
            Some(destination),
            format!("Credit disbursement (credit {})", credit_id),
            now,
        )
    }

    /// Creates the entry for a collected scheduled payment (penalty included).
    pub fn credit_payment(
        source: AccountId,
        credit_id: CreditId,
        payment_number: u32,
        amount: Money,
        penalty: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self::completed(
            TransactionType::CreditPayment,
            amount,
            Some(source),
            None,
            format!(
                "Credit {} payment #{} with penalty {}",
                credit_id,
                payment_number,
                penalty.amount()
            ),
            now,
        )
    }

    /// Reconstructs a transaction from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransactionId,
        transaction_type: TransactionType,
        status: TransactionStatus,
        amount: Money,
        source_account_id: Option<AccountId>,
        destination_account_id: Option<AccountId>,
        description: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            transaction_type,
            status,
            amount,
            source_account_id,
            destination_account_id,
            description,
            created_at,
        }
    }

    /// Returns true if the transaction touches the given account.
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.source_account_id == Some(account_id)
            || self.destination_account_id == Some(account_id)
    }
}
