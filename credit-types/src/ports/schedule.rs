//! Payment schedule port, including the settlement primitive used by the
//! overdue sweep.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Account, Credit, CreditId, EntryId, PaymentScheduleEntry};
use crate::error::RepoError;

/// State after a scheduled payment was collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub entry: PaymentScheduleEntry,
    pub credit: Credit,
    /// The funding account after the debit
    pub account: Account,
}

#[async_trait::async_trait]
pub trait PaymentScheduleStore: Send + Sync + 'static {
    /// Inserts a credit's entries. `(credit_id, payment_number)` is unique.
    async fn create_schedule(&self, entries: &[PaymentScheduleEntry]) -> Result<(), RepoError>;

    /// Entries of a credit, ordered by payment number.
    async fn get_schedule(&self, credit_id: CreditId)
    -> Result<Vec<PaymentScheduleEntry>, RepoError>;

    async fn get_entry(&self, id: EntryId) -> Result<Option<PaymentScheduleEntry>, RepoError>;

    /// Pending or overdue entries with `due_date < as_of`, ordered by due date
    /// then payment number.
    async fn due_entries(&self, as_of: DateTime<Utc>)
    -> Result<Vec<PaymentScheduleEntry>, RepoError>;

    /// Collects one scheduled payment plus `penalty` as a single atomic unit.
    ///
    /// Under lock: the entry must still be pending or overdue, the funding
    /// account active and holding at least `payment + penalty`. The account is
    /// debited, the entry marked paid and the credit's remaining debt reduced
    /// by the entry's principal (paid off at zero). Fails with
    /// `DomainError::InsufficientFunds` and changes nothing when the balance
    /// is short.
    async fn settle_entry(
        &self,
        id: EntryId,
        penalty: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Settlement, RepoError>;

    /// Adds `penalty` to an unpaid entry and marks it overdue.
    async fn accrue_penalty(
        &self,
        id: EntryId,
        penalty: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PaymentScheduleEntry, RepoError>;
}
