//! # Credit & Interest
//!
//! Read-time recomputation of installment credit balances.
//!
//! ## Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  months_elapsed      = max(1, ceil(days_since_sale / 30))               │
//! │  principal_base      = total − down_payment                             │
//! │  accrued_interest    = round2(principal_base × rate × months)           │
//! │                        (0 when waived or principal_base ≤ 0)            │
//! │  total_with_interest = total + accrued_interest × installments          │
//! │  amount_paid         = down_payment + Σ payments                        │
//! │  pending_balance     = total_with_interest − amount_paid                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Interest is a flat surcharge per installment, not compound amortization.
//! Nothing here reads the clock: `today` comes from the caller, so the same
//! inputs always produce the same status.
//!
//! ## State
//! ```text
//!   amount_paid ≥ total_with_interest − 0.01 ──► Paid
//!   today > due_date (policy on)             ──► Overdue
//!   amount_paid > 0 (down payment counts)    ──► Partial
//!   otherwise                                ──► Pending
//! ```

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CreditPayment, CreditState, CreditTerms, InterestRate, Sale};

/// Rounding band for "paid": one cent.
pub const PAID_TOLERANCE: Money = Money::from_cents(1);

/// Length of a credit month in days.
pub const DAYS_PER_CREDIT_MONTH: i64 = 30;

// =============================================================================
// Policy
// =============================================================================

/// Switches for the recompute rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestPolicy {
    /// Assign `Overdue` to unpaid sales past their due date.
    pub compute_overdue: bool,
}

impl Default for InterestPolicy {
    fn default() -> Self {
        Self {
            compute_overdue: true,
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Recomputed balance of one credit sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditStatus {
    pub months_elapsed: i64,
    pub principal_base: Money,
    pub accrued_interest: Money,
    pub total_with_interest: Money,
    pub amount_paid: Money,
    pub pending_balance: Money,
    pub due_date: NaiveDate,
    pub state: CreditState,
}

impl CreditStatus {
    #[inline]
    pub fn is_paid(&self) -> bool {
        self.state == CreditState::Paid
    }
}

/// Due date of a credit sale: sale date plus one month per installment.
///
/// Month arithmetic clamps to the end of the month (Jan 31 + 1 → Feb 28).
pub fn due_date_for(sale_date: NaiveDate, installments: u32) -> NaiveDate {
    sale_date
        .checked_add_months(Months::new(installments))
        .unwrap_or(NaiveDate::MAX)
}

/// Whole credit months since the sale, never less than one.
///
/// Same-day sales already accrue the first month. A `today` earlier than
/// the sale date (clock skew) also counts as month one.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use tienda_core::credit::months_elapsed;
///
/// let sold = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
/// assert_eq!(months_elapsed(sold, sold), 1);
/// assert_eq!(months_elapsed(sold, NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()), 1);
/// assert_eq!(months_elapsed(sold, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()), 2);
/// ```
pub fn months_elapsed(sale_date: NaiveDate, today: NaiveDate) -> i64 {
    let days = (today - sale_date).num_days().max(0);
    let months = (days + DAYS_PER_CREDIT_MONTH - 1) / DAYS_PER_CREDIT_MONTH;
    months.max(1)
}

/// Interest accrued on the financed part of the sale.
pub fn accrued_interest(terms: &CreditTerms, total: Money, months: i64) -> Money {
    if terms.interest_waived {
        return Money::zero();
    }
    let principal = total - terms.down_payment();
    if !principal.is_positive() {
        return Money::zero();
    }
    principal.apply_rate(terms.monthly_rate, months)
}

/// Recomputes the balance of a credit sale.
///
/// `paid_in_payments` is the sum of recorded payments, excluding the down
/// payment which is taken from `terms`. The stored projection fields on
/// `terms` are ignored.
pub fn compute_credit_status(
    terms: &CreditTerms,
    sale_date: NaiveDate,
    total: Money,
    paid_in_payments: Money,
    today: NaiveDate,
    policy: InterestPolicy,
) -> CreditStatus {
    let months = months_elapsed(sale_date, today);
    let interest = accrued_interest(terms, total, months);
    let total_with_interest = total + interest * i64::from(terms.installments);
    let amount_paid = terms.down_payment() + paid_in_payments;
    let pending_balance = total_with_interest - amount_paid;

    let state = if amount_paid.covers(total_with_interest, PAID_TOLERANCE) {
        CreditState::Paid
    } else if policy.compute_overdue && today > terms.due_date {
        CreditState::Overdue
    } else if amount_paid.is_positive() {
        CreditState::Partial
    } else {
        CreditState::Pending
    };

    CreditStatus {
        months_elapsed: months,
        principal_base: total - terms.down_payment(),
        accrued_interest: interest,
        total_with_interest,
        amount_paid,
        pending_balance,
        due_date: terms.due_date,
        state,
    }
}

/// Recomputes the status of a sale from its payment rows.
pub fn credit_status_of(
    sale: &Sale,
    payments: &[CreditPayment],
    today: NaiveDate,
    policy: InterestPolicy,
) -> CoreResult<CreditStatus> {
    let terms = sale
        .credit
        .as_ref()
        .ok_or_else(|| CoreError::NotCreditSale(sale.id.clone()))?;
    let paid: Money = payments.iter().map(CreditPayment::amount).sum();
    Ok(compute_credit_status(
        terms,
        sale.sale_date,
        sale.total(),
        paid,
        today,
        policy,
    ))
}

/// Rejects a payment that would overshoot the pending balance.
pub fn ensure_payment_fits(sale_id: &str, status: &CreditStatus, amount: Money) -> CoreResult<()> {
    if amount > status.pending_balance + PAID_TOLERANCE {
        return Err(CoreError::PaymentExceedsBalance {
            sale_id: sale_id.to_string(),
            amount,
            pending: status.pending_balance,
        });
    }
    Ok(())
}

impl CreditTerms {
    /// Opening terms for a new credit sale, projection included.
    pub fn open(
        sale_date: NaiveDate,
        total: Money,
        installments: u32,
        monthly_rate: InterestRate,
        down_payment: Money,
        policy: InterestPolicy,
    ) -> Self {
        let mut terms = CreditTerms {
            installments,
            due_date: due_date_for(sale_date, installments),
            monthly_rate,
            down_payment_cents: down_payment.cents(),
            interest_waived: false,
            amount_paid_cents: down_payment.cents(),
            pending_balance_cents: 0,
            accrued_interest_cents: 0,
            total_with_interest_cents: 0,
            state: CreditState::Pending,
        };
        let status = compute_credit_status(&terms, sale_date, total, Money::zero(), sale_date, policy);
        terms.apply_status(&status);
        terms
    }

    /// Copies a recomputed status into the stored projection.
    pub fn apply_status(&mut self, status: &CreditStatus) {
        self.amount_paid_cents = status.amount_paid.cents();
        self.pending_balance_cents = status.pending_balance.cents();
        self.accrued_interest_cents = status.accrued_interest.cents();
        self.total_with_interest_cents = status.total_with_interest.cents();
        self.state = status.state;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// total=1000.00, down=200.00, 5% monthly, 3 installments.
    fn scenario_terms(sold: NaiveDate) -> CreditTerms {
        CreditTerms::open(
            sold,
            Money::from_cents(100_000),
            3,
            InterestRate::from_percentage(5.0),
            Money::from_cents(20_000),
            InterestPolicy::default(),
        )
    }

    #[test]
    fn test_same_day_credit_sale() {
        let sold = date(2026, 3, 1);
        let terms = scenario_terms(sold);
        let status = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::zero(),
            sold,
            InterestPolicy::default(),
        );

        assert_eq!(status.months_elapsed, 1);
        assert_eq!(status.accrued_interest.cents(), 4_000);
        assert_eq!(status.total_with_interest.cents(), 112_000);
        assert_eq!(status.amount_paid.cents(), 20_000);
        assert_eq!(status.pending_balance.cents(), 92_000);
        assert_eq!(status.state, CreditState::Partial);
        assert_eq!(status.due_date, date(2026, 6, 1));
    }

    #[test]
    fn test_full_payment_settles_sale() {
        let sold = date(2026, 3, 1);
        let terms = scenario_terms(sold);
        let status = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::from_cents(92_000),
            sold,
            InterestPolicy::default(),
        );

        assert_eq!(status.amount_paid.cents(), 112_000);
        assert_eq!(status.pending_balance, Money::zero());
        assert_eq!(status.state, CreditState::Paid);
    }

    #[test]
    fn test_waived_interest_drops_to_total() {
        let sold = date(2026, 3, 1);
        let mut terms = scenario_terms(sold);
        terms.interest_waived = true;

        // Months later, still zero.
        let status = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::zero(),
            date(2026, 5, 15),
            InterestPolicy::default(),
        );
        assert_eq!(status.accrued_interest, Money::zero());
        assert_eq!(status.total_with_interest.cents(), 100_000);
    }

    #[test]
    fn test_no_down_payment_without_payments_is_pending() {
        let sold = date(2026, 3, 1);
        let terms = CreditTerms::open(
            sold,
            Money::from_cents(50_000),
            2,
            InterestRate::from_bps(300),
            Money::zero(),
            InterestPolicy::default(),
        );
        assert_eq!(terms.state, CreditState::Pending);
        assert_eq!(terms.accrued_interest_cents, 1_500);
        assert_eq!(terms.total_with_interest_cents, 53_000);
    }

    #[test]
    fn test_down_payment_covering_total_accrues_nothing() {
        let sold = date(2026, 3, 1);
        let terms = CreditTerms::open(
            sold,
            Money::from_cents(10_000),
            1,
            InterestRate::from_bps(500),
            Money::from_cents(10_000),
            InterestPolicy::default(),
        );
        assert_eq!(terms.accrued_interest_cents, 0);
        assert_eq!(terms.state, CreditState::Paid);
    }

    #[test]
    fn test_months_elapsed_is_monotonic() {
        let sold = date(2026, 1, 1);
        let mut previous = 0;
        for offset in 0..400 {
            let today = sold + chrono::Duration::days(offset);
            let months = months_elapsed(sold, today);
            assert!(months >= 1);
            assert!(months >= previous);
            previous = months;
        }
        assert_eq!(months_elapsed(sold, date(2025, 12, 1)), 1);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let sold = date(2026, 3, 1);
        let terms = scenario_terms(sold);
        let today = date(2026, 4, 20);
        let first = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::from_cents(10_000),
            today,
            InterestPolicy::default(),
        );
        let second = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::from_cents(10_000),
            today,
            InterestPolicy::default(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_overdue_only_with_policy() {
        let sold = date(2026, 1, 1);
        let terms = scenario_terms(sold);
        let late = date(2026, 5, 1);

        let with_policy = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::from_cents(1_000),
            late,
            InterestPolicy { compute_overdue: true },
        );
        assert_eq!(with_policy.state, CreditState::Overdue);

        let without = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::from_cents(1_000),
            late,
            InterestPolicy { compute_overdue: false },
        );
        assert_eq!(without.state, CreditState::Partial);
    }

    #[test]
    fn test_overpayment_rejected_beyond_tolerance() {
        let sold = date(2026, 3, 1);
        let terms = scenario_terms(sold);
        let status = compute_credit_status(
            &terms,
            sold,
            Money::from_cents(100_000),
            Money::zero(),
            sold,
            InterestPolicy::default(),
        );

        assert!(ensure_payment_fits("s-1", &status, Money::from_cents(92_001)).is_ok());
        let err = ensure_payment_fits("s-1", &status, Money::from_cents(92_002)).unwrap_err();
        assert!(matches!(err, CoreError::PaymentExceedsBalance { .. }));
    }

    #[test]
    fn test_due_date_clamps_to_month_end() {
        assert_eq!(due_date_for(date(2026, 1, 31), 1), date(2026, 2, 28));
        assert_eq!(due_date_for(date(2026, 3, 15), 12), date(2027, 3, 15));
    }
}
