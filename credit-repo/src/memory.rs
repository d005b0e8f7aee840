//! In-memory store adapter.
//!
//! Every account, credit and schedule entry sits behind its own async mutex.
//! Balance mutations hold the account lock for the whole read-modify-write;
//! transfers take both account locks in ascending id order and settlement
//! takes entry, then credit, then account. No other path locks in a
//! different order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use credit_types::{
    Account, AccountId, AccountStatus, Credit, CreditId, CreditStore, Currency, DomainError,
    EntryId, LedgerStore, Money, PaymentScheduleEntry, PaymentScheduleStore, RepoError,
    Settlement, Transaction, TransactionId, UserId,
};

type Shared<T> = Arc<Mutex<T>>;

/// Store kept entirely in process memory. Used for tests and `memory://`.
#[derive(Default)]
pub struct MemoryRepo {
    accounts: DashMap<AccountId, Shared<Account>>,
    credits: DashMap<CreditId, Shared<Credit>>,
    entries: DashMap<EntryId, Shared<PaymentScheduleEntry>>,
    /// Entry ids per credit, in payment-number order
    schedules: DashMap<CreditId, Vec<EntryId>>,
    /// Append-only, oldest first
    transactions: RwLock<Vec<Transaction>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_handle(&self, id: AccountId) -> Result<Shared<Account>, RepoError> {
        self.accounts
            .get(&id)
            .map(|a| Arc::clone(a.value()))
            .ok_or(RepoError::Domain(DomainError::AccountNotFound(id)))
    }

    fn credit_handle(&self, id: CreditId) -> Result<Shared<Credit>, RepoError> {
        self.credits
            .get(&id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(RepoError::Domain(DomainError::CreditNotFound(id)))
    }

    fn entry_handle(&self, id: EntryId) -> Result<Shared<PaymentScheduleEntry>, RepoError> {
        self.entries
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(RepoError::Domain(DomainError::EntryNotFound(id)))
    }
}

/// Applies `op` to a copy and only writes it back on success, so a failed
/// mutation leaves the stored value untouched.
fn mutate<T: Clone>(
    slot: &mut T,
    op: impl FnOnce(&mut T) -> Result<(), DomainError>,
) -> Result<T, RepoError> {
    let mut next = slot.clone();
    op(&mut next)?;
    *slot = next.clone();
    Ok(next)
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for MemoryRepo {
    async fn create_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Account, RepoError> {
        let account = Account::open(user_id, currency, Utc::now());
        self.accounts
            .insert(account.id, Arc::new(Mutex::new(account.clone())));
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        match self.account_handle(id) {
            Ok(handle) => Ok(Some(handle.lock().await.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn list_accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
        let handles: Vec<_> = self
            .accounts
            .iter()
            .map(|a| Arc::clone(a.value()))
            .collect();

        let mut accounts = Vec::new();
        for handle in handles {
            let account = handle.lock().await;
            if account.user_id == user_id {
                accounts.push(account.clone());
            }
        }
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, RepoError> {
        let handle = self.account_handle(id)?;
        let mut account = handle.lock().await;
        account.status = status;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn deposit(&self, id: AccountId, amount: Money) -> Result<Account, RepoError> {
        let handle = self.account_handle(id)?;
        let mut account = handle.lock().await;
        mutate(&mut *account, |a| {
            a.credit(amount)?;
            a.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn withdraw(&self, id: AccountId, amount: Money) -> Result<Account, RepoError> {
        let handle = self.account_handle(id)?;
        let mut account = handle.lock().await;
        mutate(&mut *account, |a| {
            a.debit(amount)?;
            a.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Money,
    ) -> Result<(Account, Account), RepoError> {
        if from == to {
            return Err(RepoError::Domain(DomainError::SameAccountTransfer));
        }
        let from_handle = self.account_handle(from)?;
        let to_handle = self.account_handle(to)?;

        // Lock in a consistent order to prevent deadlocks
        let (mut source, mut destination) = if from < to {
            let source = from_handle.lock().await;
            let destination = to_handle.lock().await;
            (source, destination)
        } else {
            let destination = to_handle.lock().await;
            let source = from_handle.lock().await;
            (source, destination)
        };

        let now = Utc::now();
        let mut next_source = source.clone();
        next_source.debit(amount)?;
        next_source.updated_at = now;
        let mut next_destination = destination.clone();
        next_destination.credit(amount)?;
        next_destination.updated_at = now;

        *source = next_source.clone();
        *destination = next_destination.clone();
        Ok((next_source, next_destination))
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        let mut transactions = self.transactions.write().await;
        if transactions.iter().any(|t| t.id == tx.id) {
            return Err(RepoError::Conflict(format!(
                "Transaction {} already recorded",
                tx.id
            )));
        }
        transactions.push(tx.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .rev()
            .filter(|t| t.involves(account_id))
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credits
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CreditStore for MemoryRepo {
    async fn create_credit(&self, credit: &Credit) -> Result<(), RepoError> {
        if !self.accounts.contains_key(&credit.account_id) {
            return Err(RepoError::Domain(DomainError::AccountNotFound(
                credit.account_id,
            )));
        }
        match self.credits.entry(credit.id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!(
                "Credit {} already exists",
                credit.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(credit.clone())));
                Ok(())
            }
        }
    }

    async fn get_credit(&self, id: CreditId) -> Result<Option<Credit>, RepoError> {
        match self.credit_handle(id) {
            Ok(handle) => Ok(Some(handle.lock().await.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn list_credits_for_user(&self, user_id: UserId) -> Result<Vec<Credit>, RepoError> {
        let handles: Vec<_> = self
            .credits
            .iter()
            .map(|c| Arc::clone(c.value()))
            .collect();

        let mut credits = Vec::new();
        for handle in handles {
            let credit = handle.lock().await;
            if credit.user_id == user_id {
                credits.push(credit.clone());
            }
        }
        credits.sort_by_key(|c| c.created_at);
        Ok(credits)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment schedules
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentScheduleStore for MemoryRepo {
    async fn create_schedule(&self, entries: &[PaymentScheduleEntry]) -> Result<(), RepoError> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let credit_id = first.credit_id;
        if entries.iter().any(|e| e.credit_id != credit_id) {
            return Err(RepoError::Domain(DomainError::ValidationError(
                "Schedule entries must belong to one credit".into(),
            )));
        }
        if !self.credits.contains_key(&credit_id) {
            return Err(RepoError::Domain(DomainError::CreditNotFound(credit_id)));
        }

        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|e| e.payment_number);
        if sorted
            .windows(2)
            .any(|w| w[0].payment_number == w[1].payment_number)
        {
            return Err(RepoError::Conflict(format!(
                "Duplicate payment number in schedule for credit {}",
                credit_id
            )));
        }

        // The shard lock on `credit_id` makes the check-and-insert atomic
        match self.schedules.entry(credit_id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!(
                "Schedule for credit {} already exists",
                credit_id
            ))),
            Entry::Vacant(slot) => {
                let ids = sorted.iter().map(|e| e.id).collect();
                for entry in sorted {
                    self.entries.insert(entry.id, Arc::new(Mutex::new(entry)));
                }
                slot.insert(ids);
                Ok(())
            }
        }
    }

    async fn get_schedule(
        &self,
        credit_id: CreditId,
    ) -> Result<Vec<PaymentScheduleEntry>, RepoError> {
        let ids = self
            .schedules
            .get(&credit_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let handle = self.entry_handle(id)?;
            entries.push(handle.lock().await.clone());
        }
        Ok(entries)
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<PaymentScheduleEntry>, RepoError> {
        match self.entry_handle(id) {
            Ok(handle) => Ok(Some(handle.lock().await.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn due_entries(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<PaymentScheduleEntry>, RepoError> {
        let handles: Vec<_> = self
            .entries
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut due = Vec::new();
        for handle in handles {
            let entry = handle.lock().await;
            if entry.is_due(as_of) {
                due.push(entry.clone());
            }
        }
        due.sort_by_key(|e| (e.due_date, e.payment_number));
        Ok(due)
    }

    async fn settle_entry(
        &self,
        id: EntryId,
        penalty: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Settlement, RepoError> {
        let entry_handle = self.entry_handle(id)?;
        let mut entry = entry_handle.lock().await;
        if !entry.is_payable() {
            return Err(RepoError::Domain(DomainError::EntryNotPayable {
                id,
                status: entry.status,
            }));
        }

        let credit_handle = self.credit_handle(entry.credit_id)?;
        let mut credit = credit_handle.lock().await;
        let account_handle = self.account_handle(credit.account_id)?;
        let mut account = account_handle.lock().await;

        let due = Money::new(entry.amount_due_with(penalty), account.currency())?;
        let principal = Money::new(
            entry.principal_amount.max(Decimal::ZERO),
            credit.amount.currency(),
        )?;

        // Validate everything on copies before touching stored state
        let mut next_account = account.clone();
        next_account.debit(due)?;
        next_account.updated_at = paid_at;
        let mut next_entry = entry.clone();
        next_entry.mark_paid(penalty, paid_at)?;
        let mut next_credit = credit.clone();
        next_credit.apply_principal_payment(principal, paid_at);

        *account = next_account.clone();
        *entry = next_entry.clone();
        *credit = next_credit.clone();

        Ok(Settlement {
            entry: next_entry,
            credit: next_credit,
            account: next_account,
        })
    }

    async fn accrue_penalty(
        &self,
        id: EntryId,
        penalty: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PaymentScheduleEntry, RepoError> {
        let handle = self.entry_handle(id)?;
        let mut entry = handle.lock().await;
        mutate(&mut *entry, |e| e.accrue_penalty(penalty, now))
    }
}
