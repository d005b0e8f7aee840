//! SQLite store adapter.
//!
//! SQLite serialises writers, so instead of row locks every balance change is
//! a guarded conditional `UPDATE` (`status = 'active' AND balance >= ?`) run
//! as the first write of its transaction. A zero row count is then diagnosed
//! into the precise domain error.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use credit_types::{
    Account, AccountId, AccountStatus, Credit, CreditId, CreditStore, Currency, DomainError,
    EntryId, LedgerStore, Money, PaymentScheduleEntry, PaymentScheduleStore, PaymentStatus,
    RepoError, Settlement, Transaction, TransactionId, UserId,
};

use crate::types::{
    SqliteAccountRow, SqliteCreditRow, SqliteEntryRow, SqliteTransactionRow, db_err, minor, ts,
    tx_err,
};

const ACCOUNT_COLUMNS: &str = "id, user_id, balance, currency, status, created_at, updated_at";
const CREDIT_COLUMNS: &str = "id, user_id, account_id, amount, currency, interest_rate, term_months, monthly_payment, remaining_debt, status, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, credit_id, payment_number, due_date, payment_amount, principal_amount, interest_amount, penalty_amount, paid_amount, remaining_balance, status, paid_at, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, transaction_type, status, amount, currency, source_account_id, destination_account_id, description, created_at";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

/// Executes the embedded migrations in order.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for ddl in [
        include_str!("../migrations/0001_create_ledger.sql"),
        include_str!("../migrations/0002_create_credits.sql"),
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            // Remove query parameters
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to an in-memory database is a separate database,
        // so keep exactly one alive for the lifetime of the pool.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row loaders (usable inside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn load_account(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<Option<Account>, RepoError> {
    let row: Option<SqliteAccountRow> = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE id = ?",
        ACCOUNT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.map(SqliteAccountRow::into_domain).transpose()
}

async fn load_credit(
    conn: &mut SqliteConnection,
    id: CreditId,
) -> Result<Option<Credit>, RepoError> {
    let row: Option<SqliteCreditRow> = sqlx::query_as(&format!(
        "SELECT {} FROM credits WHERE id = ?",
        CREDIT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.map(SqliteCreditRow::into_domain).transpose()
}

async fn load_entry(
    conn: &mut SqliteConnection,
    id: EntryId,
) -> Result<Option<PaymentScheduleEntry>, RepoError> {
    let row: Option<SqliteEntryRow> = sqlx::query_as(&format!(
        "SELECT {} FROM payment_schedules WHERE id = ?",
        ENTRY_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.map(SqliteEntryRow::into_domain).transpose()
}

/// Explains why a guarded account update touched no row.
async fn diagnose_account(
    conn: &mut SqliteConnection,
    id: AccountId,
    requested: Option<Money>,
) -> RepoError {
    match load_account(conn, id).await {
        Err(e) => e,
        Ok(None) => RepoError::Domain(DomainError::AccountNotFound(id)),
        Ok(Some(account)) => {
            if let Err(e) = account.ensure_active() {
                return RepoError::Domain(e);
            }
            match requested {
                Some(amount) if !account.has_sufficient_funds(&amount) => {
                    RepoError::Domain(DomainError::InsufficientFunds {
                        available: account.balance.amount(),
                        requested: amount.amount(),
                    })
                }
                _ => RepoError::Conflict(format!("Account {} changed concurrently", id)),
            }
        }
    }
}

/// Explains why a guarded entry update touched no row.
async fn diagnose_entry(conn: &mut SqliteConnection, id: EntryId) -> RepoError {
    match load_entry(conn, id).await {
        Err(e) => e,
        Ok(None) => RepoError::Domain(DomainError::EntryNotFound(id)),
        Ok(Some(entry)) => RepoError::Domain(DomainError::EntryNotPayable {
            id,
            status: entry.status,
        }),
    }
}

async fn credit_account(
    conn: &mut SqliteConnection,
    id: AccountId,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"UPDATE accounts SET balance = balance + ?, updated_at = ? WHERE id = ? AND status = 'active'"#,
    )
    .bind(amount.minor_units())
    .bind(ts(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(diagnose_account(conn, id, None).await);
    }
    Ok(())
}

async fn debit_account(
    conn: &mut SqliteConnection,
    id: AccountId,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"UPDATE accounts SET balance = balance - ?, updated_at = ?
           WHERE id = ? AND status = 'active' AND balance >= ?"#,
    )
    .bind(amount.minor_units())
    .bind(ts(now))
    .bind(id.to_string())
    .bind(amount.minor_units())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(diagnose_account(conn, id, Some(amount)).await);
    }
    Ok(())
}

async fn reload_account(conn: &mut SqliteConnection, id: AccountId) -> Result<Account, RepoError> {
    load_account(conn, id)
        .await?
        .ok_or(RepoError::Domain(DomainError::AccountNotFound(id)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SqliteRepo {
    async fn create_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Account, RepoError> {
        let account = Account::open(user_id, currency, Utc::now());

        sqlx::query(
            r#"INSERT INTO accounts (id, user_id, balance, currency, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(account.id.to_string())
        .bind(account.user_id.to_string())
        .bind(account.balance.minor_units())
        .bind(account.currency().to_string())
        .bind(account.status.as_str())
        .bind(ts(account.created_at))
        .bind(ts(account.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_account(&mut conn, id).await
    }

    async fn list_accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
        let rows: Vec<SqliteAccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE user_id = ? ORDER BY created_at, rowid",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(SqliteAccountRow::into_domain).collect()
    }

    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let result = sqlx::query(r#"UPDATE accounts SET status = ?, updated_at = ? WHERE id = ?"#)
            .bind(status.as_str())
            .bind(ts(Utc::now()))
            .bind(id.to_string())
            .execute(&mut *db_tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Domain(DomainError::AccountNotFound(id)));
        }

        let account = reload_account(&mut db_tx, id).await?;
        db_tx.commit().await.map_err(tx_err)?;
        Ok(account)
    }

    async fn deposit(&self, id: AccountId, amount: Money) -> Result<Account, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        credit_account(&mut db_tx, id, amount, Utc::now()).await?;
        let account = reload_account(&mut db_tx, id).await?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok(account)
    }

    async fn withdraw(&self, id: AccountId, amount: Money) -> Result<Account, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        debit_account(&mut db_tx, id, amount, Utc::now()).await?;
        let account = reload_account(&mut db_tx, id).await?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok(account)
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

        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;
        let now = Utc::now();

        // Debit first: it takes the write lock and checks funds.
        // Any later failure drops the transaction and rolls the debit back.
        debit_account(&mut db_tx, from, amount, now).await?;
        credit_account(&mut db_tx, to, amount, now).await?;

        let source = reload_account(&mut db_tx, from).await?;
        let destination = reload_account(&mut db_tx, to).await?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok((source, destination))
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO transactions (id, transaction_type, status, amount, currency, source_account_id, destination_account_id, description, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(tx.id.to_string())
        .bind(tx.transaction_type.as_str())
        .bind(tx.status.as_str())
        .bind(tx.amount.minor_units())
        .bind(tx.amount.currency().to_string())
        .bind(tx.source_account_id.map(|id| id.to_string()))
        .bind(tx.destination_account_id.map(|id| id.to_string()))
        .bind(&tx.description)
        .bind(ts(tx.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let row: Option<SqliteTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(SqliteTransactionRow::into_domain).transpose()
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let id = account_id.to_string();
        let rows: Vec<SqliteTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions
             WHERE source_account_id = ? OR destination_account_id = ?
             ORDER BY created_at DESC, rowid DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(&id)
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(SqliteTransactionRow::into_domain)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credits
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CreditStore for SqliteRepo {
    async fn create_credit(&self, credit: &Credit) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO credits (id, user_id, account_id, amount, currency, interest_rate, term_months, monthly_payment, remaining_debt, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(credit.id.to_string())
        .bind(credit.user_id.to_string())
        .bind(credit.account_id.to_string())
        .bind(credit.amount.minor_units())
        .bind(credit.amount.currency().to_string())
        .bind(credit.interest_rate.to_string())
        .bind(i64::from(credit.term_months))
        .bind(credit.monthly_payment.minor_units())
        .bind(credit.remaining_debt.minor_units())
        .bind(credit.status.as_str())
        .bind(ts(credit.created_at))
        .bind(ts(credit.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_credit(&self, id: CreditId) -> Result<Option<Credit>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_credit(&mut conn, id).await
    }

    async fn list_credits_for_user(&self, user_id: UserId) -> Result<Vec<Credit>, RepoError> {
        let rows: Vec<SqliteCreditRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credits WHERE user_id = ? ORDER BY created_at, rowid",
            CREDIT_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(SqliteCreditRow::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment schedules
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentScheduleStore for SqliteRepo {
    async fn create_schedule(&self, entries: &[PaymentScheduleEntry]) -> Result<(), RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        for entry in entries {
            sqlx::query(
                r#"INSERT INTO payment_schedules (id, credit_id, payment_number, due_date, payment_amount, principal_amount, interest_amount, penalty_amount, paid_amount, remaining_balance, status, paid_at, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(entry.id.to_string())
            .bind(entry.credit_id.to_string())
            .bind(i64::from(entry.payment_number))
            .bind(ts(entry.due_date))
            .bind(minor(entry.payment_amount)?)
            .bind(minor(entry.principal_amount)?)
            .bind(minor(entry.interest_amount)?)
            .bind(minor(entry.penalty_amount)?)
            .bind(minor(entry.paid_amount)?)
            .bind(minor(entry.remaining_balance)?)
            .bind(entry.status.as_str())
            .bind(entry.paid_at.map(ts))
            .bind(ts(entry.created_at))
            .bind(ts(entry.updated_at))
            .execute(&mut *db_tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref d) if d.is_unique_violation() => RepoError::Conflict(
                    format!(
                        "Payment {} of credit {} already scheduled",
                        entry.payment_number, entry.credit_id
                    ),
                ),
                other => db_err(other),
            })?;
        }

        db_tx.commit().await.map_err(tx_err)?;
        Ok(())
    }

    async fn get_schedule(
        &self,
        credit_id: CreditId,
    ) -> Result<Vec<PaymentScheduleEntry>, RepoError> {
        let rows: Vec<SqliteEntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_schedules WHERE credit_id = ? ORDER BY payment_number",
            ENTRY_COLUMNS
        ))
        .bind(credit_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(SqliteEntryRow::into_domain).collect()
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<PaymentScheduleEntry>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_entry(&mut conn, id).await
    }

    async fn due_entries(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<PaymentScheduleEntry>, RepoError> {
        let rows: Vec<SqliteEntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_schedules
             WHERE status IN ('pending', 'overdue') AND due_date < ?
             ORDER BY due_date, payment_number",
            ENTRY_COLUMNS
        ))
        .bind(ts(as_of))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(SqliteEntryRow::into_domain).collect()
    }

    async fn settle_entry(
        &self,
        id: EntryId,
        penalty: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Settlement, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        // Claim the entry; this is the transaction's first write
        let claimed = sqlx::query(
            r#"UPDATE payment_schedules SET updated_at = ?
               WHERE id = ? AND status IN ('pending', 'overdue')"#,
        )
        .bind(ts(paid_at))
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        if claimed.rows_affected() == 0 {
            return Err(diagnose_entry(&mut db_tx, id).await);
        }

        let mut entry = load_entry(&mut db_tx, id)
            .await?
            .ok_or(RepoError::Domain(DomainError::EntryNotFound(id)))?;
        let mut credit = load_credit(&mut db_tx, entry.credit_id)
            .await?
            .ok_or(RepoError::Domain(DomainError::CreditNotFound(entry.credit_id)))?;

        let due = Money::new(entry.amount_due_with(penalty), credit.amount.currency())?;
        debit_account(&mut db_tx, credit.account_id, due, paid_at).await?;

        entry.mark_paid(penalty, paid_at)?;
        sqlx::query(
            r#"UPDATE payment_schedules
               SET status = ?, penalty_amount = ?, paid_amount = ?, paid_at = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(PaymentStatus::Paid.as_str())
        .bind(minor(entry.penalty_amount)?)
        .bind(minor(entry.paid_amount)?)
        .bind(entry.paid_at.map(ts))
        .bind(ts(entry.updated_at))
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let principal = Money::new(
            entry.principal_amount.max(Decimal::ZERO),
            credit.amount.currency(),
        )?;
        credit.apply_principal_payment(principal, paid_at);
        sqlx::query(
            r#"UPDATE credits SET remaining_debt = ?, status = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(credit.remaining_debt.minor_units())
        .bind(credit.status.as_str())
        .bind(ts(credit.updated_at))
        .bind(credit.id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let account = reload_account(&mut db_tx, credit.account_id).await?;

        db_tx.commit().await.map_err(tx_err)?;

        Ok(Settlement {
            entry,
            credit,
            account,
        })
    }

    async fn accrue_penalty(
        &self,
        id: EntryId,
        penalty: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PaymentScheduleEntry, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let result = sqlx::query(
            r#"UPDATE payment_schedules
               SET penalty_amount = penalty_amount + ?, status = ?, updated_at = ?
               WHERE id = ? AND status IN ('pending', 'overdue')"#,
        )
        .bind(minor(penalty)?)
        .bind(PaymentStatus::Overdue.as_str())
        .bind(ts(now))
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(diagnose_entry(&mut db_tx, id).await);
        }

        let entry = load_entry(&mut db_tx, id)
            .await?
            .ok_or(RepoError::Domain(DomainError::EntryNotFound(id)))?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok(entry)
    }
}
