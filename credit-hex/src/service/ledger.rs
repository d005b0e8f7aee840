//! Ledger application service.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument};

use credit_types::{
    Account, AccountHistory, AccountId, AccountStatus, AppError, Clock, Currency, DepositRequest,
    LedgerStore, Money, OpenAccountRequest, Transaction, TransactionId, TransactionResponse,
    TransferRequest, UserId, WithdrawRequest,
};

/// Appends an audit record for a balance change that already happened.
///
/// The balance is the source of truth, so a failed write is logged and the
/// caller carries on without the record.
pub(crate) async fn record_audit<S>(store: &S, tx: Transaction) -> Option<Transaction>
where
    S: LedgerStore + ?Sized,
{
    match store.record_transaction(&tx).await {
        Ok(()) => Some(tx),
        Err(e) => {
            error!(
                transaction_id = %tx.id,
                transaction_type = %tx.transaction_type,
                amount = %tx.amount.amount(),
                error = %e,
                "Failed to record transaction, balance change stands"
            );
            None
        }
    }
}

/// Application service for account and money-movement operations.
///
/// Generic over `S: LedgerStore` - the adapter is injected at construction.
pub struct LedgerService<S: LedgerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    /// Largest amount a single deposit, withdrawal or transfer may move
    max_amount: Decimal,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, max_amount: Decimal) -> Self {
        Self {
            store,
            clock,
            max_amount,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn validate_amount(&self, amount: Decimal) -> Result<Money, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest("Amount must be positive".into()));
        }
        if amount > self.max_amount {
            return Err(AppError::BadRequest(format!(
                "Amount {} exceeds the limit of {}",
                amount, self.max_amount
            )));
        }
        Ok(Money::new(amount, Currency::RUB)?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens an empty, active account for a user.
    #[instrument(skip(self, req), fields(user_id = %req.user_id))]
    pub async fn open_account(&self, req: OpenAccountRequest) -> Result<Account, AppError> {
        let account = self.store.create_account(req.user_id, req.currency).await?;
        info!(account_id = %account.id, "Account opened");
        Ok(account)
    }

    /// Gets an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.store
            .get_account(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Account {}", id))))
    }

    /// Lists a user's accounts, oldest first.
    pub async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, AppError> {
        self.store
            .list_accounts_for_user(user_id)
            .await
            .map_err(Into::into)
    }

    /// Blocks, closes or re-activates an account.
    #[instrument(skip(self))]
    pub async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, AppError> {
        let account = self.store.set_account_status(id, status).await?;
        info!(status = %account.status, "Account status changed");
        Ok(account)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Money Movement
    // ─────────────────────────────────────────────────────────────────────────────

    /// Deposits money into an account.
    #[instrument(skip(self, req), fields(account_id = %req.account_id, amount = %req.amount))]
    pub async fn deposit(&self, req: DepositRequest) -> Result<TransactionResponse, AppError> {
        let amount = self.validate_amount(req.amount)?;

        let account = self.store.deposit(req.account_id, amount).await?;
        let tx = Transaction::deposit(account.id, amount, self.clock.now());
        let transaction = record_audit(self.store.as_ref(), tx).await;

        info!(balance = %account.balance.amount(), "Deposit applied");
        Ok(TransactionResponse {
            transaction,
            new_balance_source: None,
            new_balance_destination: Some(account.balance.amount()),
        })
    }

    /// Withdraws money from an account.
    #[instrument(skip(self, req), fields(account_id = %req.account_id, amount = %req.amount))]
    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<TransactionResponse, AppError> {
        let amount = self.validate_amount(req.amount)?;

        let account = self.store.withdraw(req.account_id, amount).await?;
        let tx = Transaction::withdraw(account.id, amount, self.clock.now());
        let transaction = record_audit(self.store.as_ref(), tx).await;

        info!(balance = %account.balance.amount(), "Withdrawal applied");
        Ok(TransactionResponse {
            transaction,
            new_balance_source: Some(account.balance.amount()),
            new_balance_destination: None,
        })
    }

    /// Transfers money between two accounts atomically.
    #[instrument(
        skip(self, req),
        fields(from = %req.from_account_id, to = %req.to_account_id, amount = %req.amount)
    )]
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransactionResponse, AppError> {
        let amount = self.validate_amount(req.amount)?;

        if req.from_account_id == req.to_account_id {
            return Err(AppError::BadRequest(
                "Cannot transfer to the same account".into(),
            ));
        }

        let (source, destination) = self
            .store
            .transfer(req.from_account_id, req.to_account_id, amount)
            .await?;
        let tx = Transaction::transfer(source.id, destination.id, amount, self.clock.now());
        let transaction = record_audit(self.store.as_ref(), tx).await;

        info!("Transfer applied");
        Ok(TransactionResponse {
            transaction,
            new_balance_source: Some(source.balance.amount()),
            new_balance_destination: Some(destination.balance.amount()),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction History
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.store
            .get_transaction(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Transaction {}", id))))
    }

    /// An account with its transactions, newest first.
    pub async fn history(&self, account_id: AccountId) -> Result<AccountHistory, AppError> {
        // Verify account exists first
        let account = self.get_account(account_id).await?;

        let transactions = self
            .store
            .list_transactions_for_account(account_id)
            .await?;
        Ok(AccountHistory {
            account,
            transactions,
        })
    }
}
