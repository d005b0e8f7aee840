//! Payment schedule entries.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amortization::ScheduledPayment;
use super::ids::{CreditId, EntryId};
use super::money::round_money;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and overdue entries still expect money.
    pub fn is_payable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Overdue)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "overdue" => Ok(PaymentStatus::Overdue),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Penalty for one sweep: `payment_amount * penalty_rate`, rounded to kopecks.
pub fn penalty_for(payment_amount: Decimal, penalty_rate: Decimal) -> Decimal {
    round_money(payment_amount * penalty_rate)
}

/// Due date of payment `payment_number`: the disbursement date plus that many
/// calendar months, clamped to the end of shorter months.
pub fn due_date_for(disbursed_at: DateTime<Utc>, payment_number: u32) -> Option<DateTime<Utc>> {
    disbursed_at.checked_add_months(Months::new(payment_number))
}

/// One scheduled payment of a credit.
///
/// Amounts are plain two-place decimals: the interest of a final zero-rate
/// payment can be a kopeck below zero after rounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentScheduleEntry {
    pub id: EntryId,
    pub credit_id: CreditId,
    /// 1..=term, unique per credit
    pub payment_number: u32,
    pub due_date: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    /// Penalties accrued over all sweeps
    pub penalty_amount: Decimal,
    pub paid_amount: Decimal,
    /// Principal still owed after this payment
    pub remaining_balance: Decimal,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentScheduleEntry {
    /// Binds an amortization row to a credit as a pending entry.
    pub fn pending(
        credit_id: CreditId,
        row: &ScheduledPayment,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            credit_id,
            payment_number: row.payment_number,
            due_date,
            payment_amount: row.payment_amount,
            principal_amount: row.principal,
            interest_amount: row.interest,
            penalty_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            remaining_balance: row.remaining_balance,
            status: PaymentStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_payable(&self) -> bool {
        self.status.is_payable()
    }

    /// Past due and still unpaid as of `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_payable() && self.due_date < now
    }

    /// Amount collected when settling with the given penalty.
    pub fn amount_due_with(&self, penalty: Decimal) -> Decimal {
        self.payment_amount + penalty
    }

    /// Settles the entry, adding this sweep's penalty.
    pub fn mark_paid(&mut self, penalty: Decimal, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_payable()?;
        self.penalty_amount += penalty;
        self.paid_amount = self.amount_due_with(penalty);
        self.status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records an unsettled sweep: the penalty accumulates and the entry is overdue.
    pub fn accrue_penalty(
        &mut self,
        penalty: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_payable()?;
        self.penalty_amount += penalty;
        self.status = PaymentStatus::Overdue;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_payable(&self) -> Result<(), DomainError> {
        if !self.is_payable() {
            return Err(DomainError::EntryNotPayable {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }
}
