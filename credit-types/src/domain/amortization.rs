//! Annuity amortization math.
//!
//! Pure functions over `Decimal`: the fixed monthly payment of a loan and the
//! principal/interest split of each payment. Every result is rounded to two
//! places, half away from zero.

use rust_decimal::Decimal;

use super::money::{MONEY_SCALE, round_money};

/// Longest supported term (30 years).
pub const MAX_TERM_MONTHS: u32 = 360;

const MONTHS_PER_YEAR: u32 = 12;

/// One payment's breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSplit {
    pub principal: Decimal,
    pub interest: Decimal,
}

/// One row of an amortization schedule, before it is bound to a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub payment_amount: Decimal,
    pub principal: Decimal,
    pub interest: Decimal,
    /// Principal still owed once this payment is made.
    pub remaining_balance: Decimal,
}

/// Converts an annual percentage into a monthly fraction (`31` -> `0.02583…`).
pub fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / Decimal::ONE_HUNDRED / Decimal::from(MONTHS_PER_YEAR)
}

/// `(1 + r)^n`, or `None` on overflow.
fn growth_factor(rate: Decimal, periods: u32) -> Option<Decimal> {
    let base = Decimal::ONE.checked_add(rate)?;
    (0..periods).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(base))
}

/// Fixed monthly annuity payment.
///
/// Returns zero when `principal <= 0`, `annual_rate_percent < 0` or
/// `term_months == 0`. A zero rate spreads the principal evenly. A positive
/// payment that would round below one kopeck is raised to one kopeck.
pub fn compute_monthly_payment(
    principal: Decimal,
    annual_rate_percent: Decimal,
    term_months: u32,
) -> Decimal {
    if principal <= Decimal::ZERO || annual_rate_percent < Decimal::ZERO || term_months == 0 {
        return Decimal::ZERO;
    }

    let rate = monthly_rate(annual_rate_percent);
    let raw = if rate.is_zero() {
        principal / Decimal::from(term_months)
    } else {
        // PMT = P * r * (1 + r)^n / ((1 + r)^n - 1)
        let Some(growth) = growth_factor(rate, term_months) else {
            return Decimal::ZERO;
        };
        let denominator = growth - Decimal::ONE;
        let factor = rate
            .checked_mul(growth)
            .and_then(|numerator| numerator.checked_div(denominator));
        match factor.and_then(|f| principal.checked_mul(f)) {
            Some(payment) => payment,
            None => return Decimal::ZERO,
        }
    };

    let payment = round_money(raw);
    if payment.is_zero() {
        Decimal::new(1, MONEY_SCALE)
    } else {
        payment
    }
}

/// Splits payment `payment_number` into principal and interest.
///
/// Interest accrues on `remaining_principal`; the rest of the payment goes to
/// principal. The final payment takes exactly the remaining principal so the
/// schedule sums to the original amount despite per-payment rounding.
pub fn split_payment(
    payment_number: u32,
    term_months: u32,
    monthly_payment: Decimal,
    annual_rate_percent: Decimal,
    remaining_principal: Decimal,
) -> PaymentSplit {
    let mut interest = remaining_principal * monthly_rate(annual_rate_percent);
    let mut principal = monthly_payment - interest;

    if payment_number == term_months {
        principal = remaining_principal;
        interest = monthly_payment - principal;
    }

    PaymentSplit {
        principal: round_money(principal),
        interest: round_money(interest),
    }
}

/// Full schedule for a loan, payment numbers `1..=term_months`.
pub fn build_schedule(
    principal: Decimal,
    annual_rate_percent: Decimal,
    term_months: u32,
    monthly_payment: Decimal,
) -> Vec<ScheduledPayment> {
    let mut remaining = round_money(principal);
    let mut rows = Vec::with_capacity(term_months as usize);

    for payment_number in 1..=term_months {
        let split = split_payment(
            payment_number,
            term_months,
            monthly_payment,
            annual_rate_percent,
            remaining,
        );
        remaining -= split.principal;
        rows.push(ScheduledPayment {
            payment_number,
            payment_amount: monthly_payment,
            principal: split.principal,
            interest: split.interest,
            remaining_balance: remaining,
        });
    }

    rows
}
