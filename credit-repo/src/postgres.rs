//! PostgreSQL store adapter.
//!
//! Balance changes lock the account rows with `SELECT ... FOR UPDATE` for the
//! whole read-modify-write. Transfers lock both accounts in ascending id
//! order; settlement locks entry, then credit, then account.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use credit_types::{
    Account, AccountId, AccountStatus, Credit, CreditId, CreditStore, Currency, DomainError,
    EntryId, LedgerStore, Money, PaymentScheduleEntry, PaymentScheduleStore, RepoError,
    Settlement, Transaction, TransactionId, UserId,
};

use crate::types::{PgAccountRow, PgCreditRow, PgEntryRow, PgTransactionRow, db_err, minor, tx_err};

const ACCOUNT_COLUMNS: &str = "id, user_id, balance, currency, status, created_at, updated_at";
const CREDIT_COLUMNS: &str = "id, user_id, account_id, amount, currency, interest_rate, term_months, monthly_payment, remaining_debt, status, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, credit_id, payment_number, due_date, payment_amount, principal_amount, interest_amount, penalty_amount, paid_amount, remaining_balance, status, paid_at, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, transaction_type, status, amount, currency, source_account_id, destination_account_id, description, created_at";

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_credits_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Locking helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn lock_account(conn: &mut PgConnection, id: AccountId) -> Result<Account, RepoError> {
    let row: Option<PgAccountRow> = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
        ACCOUNT_COLUMNS
    ))
    .bind(id.into_uuid())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.ok_or(RepoError::Domain(DomainError::AccountNotFound(id)))?
        .into_domain()
}

async fn store_balance(conn: &mut PgConnection, account: &Account) -> Result<(), RepoError> {
    sqlx::query(r#"UPDATE accounts SET balance = $1, updated_at = $2 WHERE id = $3"#)
        .bind(account.balance.minor_units())
        .bind(account.updated_at)
        .bind(account.id.into_uuid())
        .execute(conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn lock_entry(
    conn: &mut PgConnection,
    id: EntryId,
) -> Result<PaymentScheduleEntry, RepoError> {
    let row: Option<PgEntryRow> = sqlx::query_as(&format!(
        "SELECT {} FROM payment_schedules WHERE id = $1 FOR UPDATE",
        ENTRY_COLUMNS
    ))
    .bind(id.into_uuid())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.ok_or(RepoError::Domain(DomainError::EntryNotFound(id)))?
        .into_domain()
}

async fn lock_credit(conn: &mut PgConnection, id: CreditId) -> Result<Credit, RepoError> {
    let row: Option<PgCreditRow> = sqlx::query_as(&format!(
        "SELECT {} FROM credits WHERE id = $1 FOR UPDATE",
        CREDIT_COLUMNS
    ))
    .bind(id.into_uuid())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.ok_or(RepoError::Domain(DomainError::CreditNotFound(id)))?
        .into_domain()
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for PostgresRepo {
    async fn create_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Account, RepoError> {
        let account = Account::open(user_id, currency, Utc::now());

        sqlx::query(
            r#"INSERT INTO accounts (id, user_id, balance, currency, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(account.id.into_uuid())
        .bind(account.user_id.into_uuid())
        .bind(account.balance.minor_units())
        .bind(account.currency().to_string())
        .bind(account.status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let row: Option<PgAccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(PgAccountRow::into_domain).transpose()
    }

    async fn list_accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
        let rows: Vec<PgAccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE user_id = $1 ORDER BY created_at",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PgAccountRow::into_domain).collect()
    }

    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, RepoError> {
        let row: Option<PgAccountRow> = sqlx::query_as(&format!(
            "UPDATE accounts SET status = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.ok_or(RepoError::Domain(DomainError::AccountNotFound(id)))?
            .into_domain()
    }

    async fn deposit(&self, id: AccountId, amount: Money) -> Result<Account, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let mut account = lock_account(&mut db_tx, id).await?;
        account.credit(amount)?;
        account.updated_at = Utc::now();
        store_balance(&mut db_tx, &account).await?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok(account)
    }

    async fn withdraw(&self, id: AccountId, amount: Money) -> Result<Account, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        // Lock the account with FOR UPDATE
        let mut account = lock_account(&mut db_tx, id).await?;
        account.debit(amount)?;
        account.updated_at = Utc::now();
        store_balance(&mut db_tx, &account).await?;

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

        // Lock accounts in consistent order to prevent deadlocks
        let (mut source, mut destination) = if from < to {
            let source = lock_account(&mut db_tx, from).await?;
            let destination = lock_account(&mut db_tx, to).await?;
            (source, destination)
        } else {
            let destination = lock_account(&mut db_tx, to).await?;
            let source = lock_account(&mut db_tx, from).await?;
            (source, destination)
        };

        let now = Utc::now();
        source.debit(amount)?;
        source.updated_at = now;
        destination.credit(amount)?;
        destination.updated_at = now;

        store_balance(&mut db_tx, &source).await?;
        store_balance(&mut db_tx, &destination).await?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok((source, destination))
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO transactions (id, transaction_type, status, amount, currency, source_account_id, destination_account_id, description, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(tx.id.into_uuid())
        .bind(tx.transaction_type.as_str())
        .bind(tx.status.as_str())
        .bind(tx.amount.minor_units())
        .bind(tx.amount.currency().to_string())
        .bind(tx.source_account_id.map(AccountId::into_uuid))
        .bind(tx.destination_account_id.map(AccountId::into_uuid))
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let row: Option<PgTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(PgTransactionRow::into_domain).transpose()
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let rows: Vec<PgTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions
             WHERE source_account_id = $1 OR destination_account_id = $1
             ORDER BY created_at DESC, seq DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PgTransactionRow::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credits
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CreditStore for PostgresRepo {
    async fn create_credit(&self, credit: &Credit) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO credits (id, user_id, account_id, amount, currency, interest_rate, term_months, monthly_payment, remaining_debt, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(credit.id.into_uuid())
        .bind(credit.user_id.into_uuid())
        .bind(credit.account_id.into_uuid())
        .bind(credit.amount.minor_units())
        .bind(credit.amount.currency().to_string())
        .bind(credit.interest_rate.to_string())
        .bind(credit.term_months as i32)
        .bind(credit.monthly_payment.minor_units())
        .bind(credit.remaining_debt.minor_units())
        .bind(credit.status.as_str())
        .bind(credit.created_at)
        .bind(credit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_credit(&self, id: CreditId) -> Result<Option<Credit>, RepoError> {
        let row: Option<PgCreditRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credits WHERE id = $1",
            CREDIT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(PgCreditRow::into_domain).transpose()
    }

    async fn list_credits_for_user(&self, user_id: UserId) -> Result<Vec<Credit>, RepoError> {
        let rows: Vec<PgCreditRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credits WHERE user_id = $1 ORDER BY created_at",
            CREDIT_COLUMNS
        ))
        .bind(user_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PgCreditRow::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment schedules
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentScheduleStore for PostgresRepo {
    async fn create_schedule(&self, entries: &[PaymentScheduleEntry]) -> Result<(), RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        for entry in entries {
            sqlx::query(
                r#"INSERT INTO payment_schedules (id, credit_id, payment_number, due_date, payment_amount, principal_amount, interest_amount, penalty_amount, paid_amount, remaining_balance, status, paid_at, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
            )
            .bind(entry.id.into_uuid())
            .bind(entry.credit_id.into_uuid())
            .bind(entry.payment_number as i32)
            .bind(entry.due_date)
            .bind(minor(entry.payment_amount)?)
            .bind(minor(entry.principal_amount)?)
            .bind(minor(entry.interest_amount)?)
            .bind(minor(entry.penalty_amount)?)
            .bind(minor(entry.paid_amount)?)
            .bind(minor(entry.remaining_balance)?)
            .bind(entry.status.as_str())
            .bind(entry.paid_at)
            .bind(entry.created_at)
            .bind(entry.updated_at)
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
        let rows: Vec<PgEntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_schedules WHERE credit_id = $1 ORDER BY payment_number",
            ENTRY_COLUMNS
        ))
        .bind(credit_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PgEntryRow::into_domain).collect()
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<PaymentScheduleEntry>, RepoError> {
        let row: Option<PgEntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_schedules WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(PgEntryRow::into_domain).transpose()
    }

    async fn due_entries(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<PaymentScheduleEntry>, RepoError> {
        let rows: Vec<PgEntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_schedules
             WHERE status IN ('pending', 'overdue') AND due_date < $1
             ORDER BY due_date, payment_number",
            ENTRY_COLUMNS
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PgEntryRow::into_domain).collect()
    }

    async fn settle_entry(
        &self,
        id: EntryId,
        penalty: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Settlement, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let mut entry = lock_entry(&mut db_tx, id).await?;
        let mut credit = lock_credit(&mut db_tx, entry.credit_id).await?;
        let mut account = lock_account(&mut db_tx, credit.account_id).await?;

        // Validate every change before writing any of them
        let due = Money::new(entry.amount_due_with(penalty), account.currency())?;
        let principal = Money::new(
            entry.principal_amount.max(Decimal::ZERO),
            credit.amount.currency(),
        )?;
        entry.mark_paid(penalty, paid_at)?;
        account.debit(due)?;
        account.updated_at = paid_at;
        credit.apply_principal_payment(principal, paid_at);

        store_balance(&mut db_tx, &account).await?;

        sqlx::query(
            r#"UPDATE payment_schedules
               SET status = $1, penalty_amount = $2, paid_amount = $3, paid_at = $4, updated_at = $5
               WHERE id = $6"#,
        )
        .bind(entry.status.as_str())
        .bind(minor(entry.penalty_amount)?)
        .bind(minor(entry.paid_amount)?)
        .bind(entry.paid_at)
        .bind(entry.updated_at)
        .bind(id.into_uuid())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"UPDATE credits SET remaining_debt = $1, status = $2, updated_at = $3 WHERE id = $4"#,
        )
        .bind(credit.remaining_debt.minor_units())
        .bind(credit.status.as_str())
        .bind(credit.updated_at)
        .bind(credit.id.into_uuid())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

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

        let mut entry = lock_entry(&mut db_tx, id).await?;
        entry.accrue_penalty(penalty, now)?;

        sqlx::query(
            r#"UPDATE payment_schedules SET penalty_amount = $1, status = $2, updated_at = $3 WHERE id = $4"#,
        )
        .bind(minor(entry.penalty_amount)?)
        .bind(entry.status.as_str())
        .bind(entry.updated_at)
        .bind(id.into_uuid())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        db_tx.commit().await.map_err(tx_err)?;
        Ok(entry)
    }
}
