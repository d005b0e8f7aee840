//! Account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AccountId, UserId};
use super::money::{Currency, Money};
use crate::error::DomainError;

/// Lifecycle status of an account. Only active accounts move money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Blocked,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
            AccountStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "blocked" => Ok(AccountStatus::Blocked),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown account status: {}",
                other
            ))),
        }
    }
}

/// A bank account holding a balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Owning user
    pub user_id: UserId,
    /// Current balance (includes currency information)
    pub balance: Money,
    pub status: AccountStatus,
    /// When the account was opened
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Opens a new active account with zero balance.
    pub fn open(user_id: UserId, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            user_id,
            balance: Money::zero(currency),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an account with all fields specified (for database reconstruction).
    pub fn from_parts(
        id: AccountId,
        user_id: UserId,
        balance: Money,
        status: AccountStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            balance,
            status,
            created_at,
            updated_at,
        }
    }

    /// Returns the currency of this account.
    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Fails with `AccountInactive` unless the account is active.
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::AccountInactive {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Credits (adds) money to the account.
    pub fn credit(&mut self, amount: Money) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.balance = self.balance.checked_add(amount)?;
        Ok(())
    }

    /// Debits (subtracts) money from the account.
    pub fn debit(&mut self, amount: Money) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.balance = self.balance.checked_sub(amount)?;
        Ok(())
    }

    /// Checks if the account has sufficient funds for a debit.
    pub fn has_sufficient_funds(&self, amount: &Money) -> bool {
        self.balance.gte(amount)
    }
}
