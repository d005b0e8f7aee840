//! Credit lifecycle service: issuing credits and reading their schedules.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use credit_types::amortization::{MAX_TERM_MONTHS, build_schedule, compute_monthly_payment};
use credit_types::domain::schedule::due_date_for;
use credit_types::{
    AppError, Clock, CreateCreditRequest, Credit, CreditId, DomainError, Money,
    PaymentScheduleEntry, RateProvider, Store, Transaction, UserId,
};

use super::record_audit;

/// Pricing and limits applied when issuing a credit.
#[derive(Debug, Clone, Copy)]
pub struct CreditPolicy {
    /// Percentage points added to the base rate
    pub bank_margin: Decimal,
    /// Base rate used when the rate provider cannot answer
    pub fallback_base_rate: Decimal,
    /// Largest principal a single credit may have
    pub max_amount: Decimal,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            bank_margin: Decimal::from(5),
            fallback_base_rate: Decimal::from(16),
            max_amount: Decimal::from(100_000_000),
        }
    }
}

/// Issues annuity credits and serves their repayment schedules.
pub struct CreditService<S: Store> {
    store: Arc<S>,
    rates: Arc<dyn RateProvider>,
    clock: Arc<dyn Clock>,
    policy: CreditPolicy,
}

impl<S: Store> CreditService<S> {
    pub fn new(
        store: Arc<S>,
        rates: Arc<dyn RateProvider>,
        clock: Arc<dyn Clock>,
        policy: CreditPolicy,
    ) -> Self {
        Self {
            store,
            rates,
            clock,
            policy,
        }
    }

    fn validate(&self, req: &CreateCreditRequest) -> Result<(), AppError> {
        if req.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest("Credit amount must be positive".into()));
        }
        if req.amount > self.policy.max_amount {
            return Err(AppError::BadRequest(format!(
                "Credit amount {} exceeds the limit of {}",
                req.amount, self.policy.max_amount
            )));
        }
        if req.term_months == 0 || req.term_months > MAX_TERM_MONTHS {
            return Err(AppError::BadRequest(format!(
                "Term must be between 1 and {} months",
                MAX_TERM_MONTHS
            )));
        }
        Ok(())
    }

    /// Annual rate for a new credit: the provider's base rate (or the
    /// fallback) plus the bank margin.
    async fn credit_rate(&self) -> Decimal {
        let base = match self.rates.annual_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = %self.policy.fallback_base_rate,
                    "Rate provider failed, using fallback base rate"
                );
                self.policy.fallback_base_rate
            }
        };
        base + self.policy.bank_margin
    }

    /// Issues a credit: persists it with its schedule and pays the principal
    /// into the funding account.
    ///
    /// The steps after the credit row is written are not one atomic unit. A
    /// schedule failure is logged and the credit is still disbursed. A failed
    /// disbursement is returned to the caller and leaves the credit in place.
    #[instrument(
        skip(self, req),
        fields(user_id = %req.user_id, account_id = %req.account_id, amount = %req.amount)
    )]
    pub async fn create_credit(&self, req: CreateCreditRequest) -> Result<Credit, AppError> {
        self.validate(&req)?;

        let account = self
            .store
            .get_account(req.account_id)
            .await?
            .ok_or(DomainError::AccountNotFound(req.account_id))?;
        account.ensure_active()?;

        let principal = Money::new(req.amount, account.currency())?;
        let rate = self.credit_rate().await;
        let payment = compute_monthly_payment(principal.amount(), rate, req.term_months);
        if payment.is_zero() {
            return Err(AppError::Internal(format!(
                "No annuity payment for {} at {}% over {} months",
                principal, rate, req.term_months
            )));
        }

        let now = self.clock.now();
        let credit = Credit::issue(
            req.user_id,
            account.id,
            principal,
            rate,
            req.term_months,
            Money::new(payment, account.currency())?,
            now,
        );
        self.store.create_credit(&credit).await?;
        info!(credit_id = %credit.id, rate = %rate, payment = %payment, "Credit created");

        match self.schedule_for(&credit) {
            Ok(entries) => {
                if let Err(e) = self.store.create_schedule(&entries).await {
                    error!(credit_id = %credit.id, error = %e, "Failed to persist payment schedule");
                }
            }
            Err(e) => {
                error!(credit_id = %credit.id, error = %e, "Failed to build payment schedule");
            }
        }

        self.store.deposit(account.id, principal).await?;
        let tx = Transaction::credit_disbursement(account.id, credit.id, principal, now);
        record_audit(self.store.as_ref(), tx).await;

        info!(credit_id = %credit.id, "Credit disbursed");
        Ok(credit)
    }

    /// Pending schedule rows for a freshly issued credit.
    fn schedule_for(&self, credit: &Credit) -> Result<Vec<PaymentScheduleEntry>, AppError> {
        build_schedule(
            credit.amount.amount(),
            credit.interest_rate,
            credit.term_months,
            credit.monthly_payment.amount(),
        )
        .iter()
        .map(|row| {
            let due_date = due_date_for(credit.created_at, row.payment_number).ok_or_else(|| {
                AppError::Internal(format!("Due date of payment {} overflows", row.payment_number))
            })?;
            Ok(PaymentScheduleEntry::pending(
                credit.id,
                row,
                due_date,
                credit.created_at,
            ))
        })
        .collect()
    }

    /// Gets a credit by ID.
    pub async fn get_credit(&self, id: CreditId) -> Result<Credit, AppError> {
        self.store
            .get_credit(id)
            .await?
            .ok_or_else(|| DomainError::CreditNotFound(id).into())
    }

    /// Lists a user's credits, oldest first.
    pub async fn list_credits(&self, user_id: UserId) -> Result<Vec<Credit>, AppError> {
        self.store
            .list_credits_for_user(user_id)
            .await
            .map_err(Into::into)
    }

    /// A credit's schedule ordered by payment number.
    pub async fn get_schedule(
        &self,
        credit_id: CreditId,
    ) -> Result<Vec<PaymentScheduleEntry>, AppError> {
        // Verify credit exists first
        let _ = self.get_credit(credit_id).await?;

        self.store
            .get_schedule(credit_id)
            .await
            .map_err(Into::into)
    }
}
