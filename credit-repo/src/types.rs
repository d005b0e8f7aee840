//! Database row types and conversions shared by the SQL adapters.
//!
//! Amounts are stored as integer kopecks and rates as decimal text. Each
//! backend has its own row structs because the column types differ (TEXT ids
//! and timestamps in SQLite, native UUID/TIMESTAMPTZ in PostgreSQL).

use std::str::FromStr;

use rust_decimal::Decimal;

use credit_types::amortization::MAX_TERM_MONTHS;
use credit_types::domain::money::{from_minor_units, to_minor_units};
use credit_types::{Currency, DomainError, Money, RepoError};

// ─────────────────────────────────────────────────────────────────────────────
// Conversion helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::Database(e.to_string())
}

pub fn tx_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::Transaction(e.to_string())
}

/// Decimal amount to kopecks.
pub fn minor(value: Decimal) -> Result<i64, RepoError> {
    to_minor_units(value).ok_or_else(|| db_err(format!("Amount out of range: {}", value)))
}

pub fn money_from_db(minor: i64, currency: &str) -> Result<Money, RepoError> {
    let currency = parse_column::<Currency>(currency)?;
    Money::from_minor(minor, currency).map_err(RepoError::Domain)
}

pub fn decimal_from_db(minor: i64) -> Decimal {
    from_minor_units(minor)
}

pub fn rate_from_db(s: &str) -> Result<Decimal, RepoError> {
    Decimal::from_str(s).map_err(|e| db_err(format!("Invalid rate {}: {}", s, e)))
}

pub fn term_from_db(term: i64) -> Result<u32, RepoError> {
    u32::try_from(term)
        .ok()
        .filter(|t| (1..=MAX_TERM_MONTHS).contains(t))
        .ok_or_else(|| db_err(format!("Invalid term: {}", term)))
}

pub fn payment_number_from_db(n: i64) -> Result<u32, RepoError> {
    u32::try_from(n).map_err(|_| db_err(format!("Invalid payment number: {}", n)))
}

/// Parses a status/type/currency column through the domain `FromStr`.
pub fn parse_column<T>(s: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = DomainError>,
{
    s.parse::<T>().map_err(|e| db_err(e.to_string()))
}

#[cfg(feature = "sqlite")]
pub use self::sqlite_rows::*;

#[cfg(feature = "postgres")]
pub use self::pg_rows::*;

// ─────────────────────────────────────────────────────────────────────────────
// SQLite rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
mod sqlite_rows {
    use chrono::{DateTime, SecondsFormat, Utc};
    use sqlx::FromRow;
    use uuid::Uuid;

    use credit_types::{
        Account, AccountId, Credit, CreditId, EntryId, PaymentScheduleEntry, RepoError,
        Transaction, TransactionId, UserId,
    };

    use super::*;

    /// Fixed-width RFC 3339 so TEXT comparison orders chronologically.
    pub fn ts(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(db_err)
    }

    pub fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
        Uuid::parse_str(s).map_err(db_err)
    }

    #[derive(FromRow)]
    pub struct SqliteAccountRow {
        pub id: String,
        pub user_id: String,
        pub balance: i64,
        pub currency: String,
        pub status: String,
        pub created_at: String,
        pub updated_at: String,
    }

    impl SqliteAccountRow {
        pub fn into_domain(self) -> Result<Account, RepoError> {
            Ok(Account::from_parts(
                AccountId::from_uuid(parse_uuid(&self.id)?),
                UserId::from_uuid(parse_uuid(&self.user_id)?),
                money_from_db(self.balance, &self.currency)?,
                parse_column(&self.status)?,
                parse_ts(&self.created_at)?,
                parse_ts(&self.updated_at)?,
            ))
        }
    }

    #[derive(FromRow)]
    pub struct SqliteCreditRow {
        pub id: String,
        pub user_id: String,
        pub account_id: String,
        pub amount: i64,
        pub currency: String,
        pub interest_rate: String,
        pub term_months: i64,
        pub monthly_payment: i64,
        pub remaining_debt: i64,
        pub status: String,
        pub created_at: String,
        pub updated_at: String,
    }

    impl SqliteCreditRow {
        pub fn into_domain(self) -> Result<Credit, RepoError> {
            Ok(Credit {
                id: CreditId::from_uuid(parse_uuid(&self.id)?),
                user_id: UserId::from_uuid(parse_uuid(&self.user_id)?),
                account_id: AccountId::from_uuid(parse_uuid(&self.account_id)?),
                amount: money_from_db(self.amount, &self.currency)?,
                interest_rate: rate_from_db(&self.interest_rate)?,
                term_months: term_from_db(self.term_months)?,
                monthly_payment: money_from_db(self.monthly_payment, &self.currency)?,
                remaining_debt: money_from_db(self.remaining_debt, &self.currency)?,
                status: parse_column(&self.status)?,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct SqliteEntryRow {
        pub id: String,
        pub credit_id: String,
        pub payment_number: i64,
        pub due_date: String,
        pub payment_amount: i64,
        pub principal_amount: i64,
        pub interest_amount: i64,
        pub penalty_amount: i64,
        pub paid_amount: i64,
        pub remaining_balance: i64,
        pub status: String,
        pub paid_at: Option<String>,
        pub created_at: String,
        pub updated_at: String,
    }

    impl SqliteEntryRow {
        pub fn into_domain(self) -> Result<PaymentScheduleEntry, RepoError> {
            Ok(PaymentScheduleEntry {
                id: EntryId::from_uuid(parse_uuid(&self.id)?),
                credit_id: CreditId::from_uuid(parse_uuid(&self.credit_id)?),
                payment_number: payment_number_from_db(self.payment_number)?,
                due_date: parse_ts(&self.due_date)?,
                payment_amount: decimal_from_db(self.payment_amount),
                principal_amount: decimal_from_db(self.principal_amount),
                interest_amount: decimal_from_db(self.interest_amount),
                penalty_amount: decimal_from_db(self.penalty_amount),
                paid_amount: decimal_from_db(self.paid_amount),
                remaining_balance: decimal_from_db(self.remaining_balance),
                status: parse_column(&self.status)?,
                paid_at: self.paid_at.as_deref().map(parse_ts).transpose()?,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct SqliteTransactionRow {
        pub id: String,
        pub transaction_type: String,
        pub status: String,
        pub amount: i64,
        pub currency: String,
        pub source_account_id: Option<String>,
        pub destination_account_id: Option<String>,
        pub description: String,
        pub created_at: String,
    }

    impl SqliteTransactionRow {
        pub fn into_domain(self) -> Result<Transaction, RepoError> {
            let source = self
                .source_account_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(AccountId::from_uuid);
            let destination = self
                .destination_account_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(AccountId::from_uuid);

            Ok(Transaction::from_parts(
                TransactionId::from_uuid(parse_uuid(&self.id)?),
                parse_column(&self.transaction_type)?,
                parse_column(&self.status)?,
                money_from_db(self.amount, &self.currency)?,
                source,
                destination,
                self.description,
                parse_ts(&self.created_at)?,
            ))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
mod pg_rows {
    use chrono::{DateTime, Utc};
    use sqlx::FromRow;
    use uuid::Uuid;

    use credit_types::{
        Account, AccountId, Credit, CreditId, EntryId, PaymentScheduleEntry, RepoError,
        Transaction, TransactionId, UserId,
    };

    use super::*;

    #[derive(FromRow)]
    pub struct PgAccountRow {
        pub id: Uuid,
        pub user_id: Uuid,
        pub balance: i64,
        pub currency: String,
        pub status: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl PgAccountRow {
        pub fn into_domain(self) -> Result<Account, RepoError> {
            Ok(Account::from_parts(
                AccountId::from_uuid(self.id),
                UserId::from_uuid(self.user_id),
                money_from_db(self.balance, &self.currency)?,
                parse_column(&self.status)?,
                self.created_at,
                self.updated_at,
            ))
        }
    }

    #[derive(FromRow)]
    pub struct PgCreditRow {
        pub id: Uuid,
        pub user_id: Uuid,
        pub account_id: Uuid,
        pub amount: i64,
        pub currency: String,
        pub interest_rate: String,
        pub term_months: i32,
        pub monthly_payment: i64,
        pub remaining_debt: i64,
        pub status: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl PgCreditRow {
        pub fn into_domain(self) -> Result<Credit, RepoError> {
            Ok(Credit {
                id: CreditId::from_uuid(self.id),
                user_id: UserId::from_uuid(self.user_id),
                account_id: AccountId::from_uuid(self.account_id),
                amount: money_from_db(self.amount, &self.currency)?,
                interest_rate: rate_from_db(&self.interest_rate)?,
                term_months: term_from_db(i64::from(self.term_months))?,
                monthly_payment: money_from_db(self.monthly_payment, &self.currency)?,
                remaining_debt: money_from_db(self.remaining_debt, &self.currency)?,
                status: parse_column(&self.status)?,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PgEntryRow {
        pub id: Uuid,
        pub credit_id: Uuid,
        pub payment_number: i32,
        pub due_date: DateTime<Utc>,
        pub payment_amount: i64,
        pub principal_amount: i64,
        pub interest_amount: i64,
        pub penalty_amount: i64,
        pub paid_amount: i64,
        pub remaining_balance: i64,
        pub status: String,
        pub paid_at: Option<DateTime<Utc>>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl PgEntryRow {
        pub fn into_domain(self) -> Result<PaymentScheduleEntry, RepoError> {
            Ok(PaymentScheduleEntry {
                id: EntryId::from_uuid(self.id),
                credit_id: CreditId::from_uuid(self.credit_id),
                payment_number: payment_number_from_db(i64::from(self.payment_number))?,
                due_date: self.due_date,
                payment_amount: decimal_from_db(self.payment_amount),
                principal_amount: decimal_from_db(self.principal_amount),
                interest_amount: decimal_from_db(self.interest_amount),
                penalty_amount: decimal_from_db(self.penalty_amount),
                paid_amount: decimal_from_db(self.paid_amount),
                remaining_balance: decimal_from_db(self.remaining_balance),
                status: parse_column(&self.status)?,
                paid_at: self.paid_at,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PgTransactionRow {
        pub id: Uuid,
        pub transaction_type: String,
        pub status: String,
        pub amount: i64,
        pub currency: String,
        pub source_account_id: Option<Uuid>,
        pub destination_account_id: Option<Uuid>,
        pub description: String,
        pub created_at: DateTime<Utc>,
    }

    impl PgTransactionRow {
        pub fn into_domain(self) -> Result<Transaction, RepoError> {
            Ok(Transaction::from_parts(
                TransactionId::from_uuid(self.id),
                parse_column(&self.transaction_type)?,
                parse_column(&self.status)?,
                money_from_db(self.amount, &self.currency)?,
                self.source_account_id.map(AccountId::from_uuid),
                self.destination_account_id.map(AccountId::from_uuid),
                self.description,
                self.created_at,
            ))
        }
    }
}
