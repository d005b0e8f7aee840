//! Ledger port: accounts, balances and the transaction audit trail.

use crate::domain::{
    Account, AccountId, AccountStatus, Currency, Money, Transaction, TransactionId, UserId,
};
use crate::error::RepoError;

/// Account storage with atomic balance mutations.
///
/// Every balance change locks the affected account(s) for the whole
/// read-modify-write. Transfers lock both accounts in ascending id order.
/// Recording the audit [`Transaction`] is a separate call made once the
/// mutation has committed.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens an active account with zero balance.
    async fn create_account(&self, user_id: UserId, currency: Currency)
    -> Result<Account, RepoError>;

    /// Gets an account by ID.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError>;

    /// Lists a user's accounts, oldest first.
    async fn list_accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, RepoError>;

    /// Blocks, closes or re-activates an account.
    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Balance Operations (MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Adds money to an active account and returns the updated account.
    async fn deposit(&self, id: AccountId, amount: Money) -> Result<Account, RepoError>;

    /// Removes money from an active account with enough balance.
    async fn withdraw(&self, id: AccountId, amount: Money) -> Result<Account, RepoError>;

    /// Moves money between two active accounts. Returns `(from, to)`.
    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Money,
    ) -> Result<(Account, Account), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────────

    /// Appends an audit entry.
    async fn record_transaction(&self, tx: &Transaction) -> Result<(), RepoError>;

    /// Gets a transaction by ID.
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// Lists transactions touching an account, newest first.
    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError>;
}
