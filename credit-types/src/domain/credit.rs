//! Credit domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AccountId, CreditId, UserId};
use super::money::Money;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Active,
    PaidOff,
    Overdue,
    Cancelled,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Active => "active",
            CreditStatus::PaidOff => "paid_off",
            CreditStatus::Overdue => "overdue",
            CreditStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CreditStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CreditStatus::Active),
            "paid_off" => Ok(CreditStatus::PaidOff),
            "overdue" => Ok(CreditStatus::Overdue),
            "cancelled" => Ok(CreditStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "Unknown credit status: {}",
                other
            ))),
        }
    }
}

/// An issued annuity credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    pub id: CreditId,
    pub user_id: UserId,
    /// Account the principal was paid into and payments are collected from
    pub account_id: AccountId,
    /// Original principal
    pub amount: Money,
    /// Annual rate in percent (base rate plus bank margin)
    pub interest_rate: Decimal,
    pub term_months: u32,
    pub monthly_payment: Money,
    /// Principal not yet repaid; only ever decreases
    pub remaining_debt: Money,
    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credit {
    /// Builds a freshly disbursed credit: active, with the whole principal outstanding.
    pub fn issue(
        user_id: UserId,
        account_id: AccountId,
        amount: Money,
        interest_rate: Decimal,
        term_months: u32,
        monthly_payment: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CreditId::new(),
            user_id,
            account_id,
            amount,
            interest_rate,
            term_months,
            monthly_payment,
            remaining_debt: amount,
            status: CreditStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CreditStatus::Active
    }

    pub fn is_paid_off(&self) -> bool {
        self.status == CreditStatus::PaidOff || self.remaining_debt.is_zero()
    }

    /// Sum of all scheduled payments.
    pub fn total_cost(&self) -> Decimal {
        self.monthly_payment.amount() * Decimal::from(self.term_months)
    }

    /// Interest paid over the whole term.
    pub fn total_interest(&self) -> Decimal {
        self.total_cost() - self.amount.amount()
    }

    /// Reduces the outstanding debt by a repaid principal portion.
    ///
    /// Debt never goes below zero; reaching zero marks the credit paid off.
    pub fn apply_principal_payment(&mut self, principal: Money, now: DateTime<Utc>) {
        self.remaining_debt = self.remaining_debt.saturating_sub(principal);
        if self.remaining_debt.is_zero() {
            self.status = CreditStatus::PaidOff;
        }
        self.updated_at = now;
    }
}
