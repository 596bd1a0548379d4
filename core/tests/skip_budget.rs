//! Skip budget tests for portal plans.
//!
//! The boundary matters: a plan with exactly zero remaining skips is
//! already at risk, and the remaining count clamps at zero instead of
//! going negative.

use chrono::NaiveDate;
use rateation_core::model::{Installment, PaymentMode, PlanStatus};
use rateation_core::skip_risk::{SkipRisk, DEFAULT_MAX_SKIPS};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn row(seq: i64, due: NaiveDate, paid: bool) -> Installment {
    Installment {
        plan_id: 1,
        seq,
        due_date: Some(due),
        amount_cents: 150_00,
        paid,
        paid_date: if paid { Some(due) } else { None },
        mode: PaymentMode::Ordinary,
        penalty_cents: 0,
        interest_cents: 0,
        paid_total_cents: None,
        postponed: false,
    }
}

/// Overdue unpaid rows, one per month before `today`.
fn overdue_rows(count: i64, today: NaiveDate) -> Vec<Installment> {
    (1..=count)
        .map(|n| row(n, today - chrono::Months::new(n as u32), false))
        .collect()
}

/// Eight unpaid-overdue installments against a budget of eight: the
/// budget is exhausted and the plan is already at risk.
#[test]
fn exactly_exhausted_budget_is_at_risk() {
    let today = day(2026, 3, 1);
    let rows = overdue_rows(8, today);

    let risk = SkipRisk::compute(&rows, PlanStatus::Active, today, DEFAULT_MAX_SKIPS);
    assert_eq!(risk.unpaid_overdue_today, 8);
    assert_eq!(risk.skip_remaining, 0);
    assert!(risk.at_risk, "zero remaining skips means at risk, not close");
}

/// Nine overdue against a budget of eight still reads zero remaining,
/// never a negative number.
#[test]
fn overflow_clamps_to_zero() {
    let today = day(2026, 3, 1);
    let rows = overdue_rows(9, today);

    let risk = SkipRisk::compute(&rows, PlanStatus::Active, today, DEFAULT_MAX_SKIPS);
    assert_eq!(risk.unpaid_overdue_today, 9);
    assert_eq!(risk.skip_remaining, 0);
    assert!(risk.at_risk);
}

#[test]
fn partial_usage_leaves_budget() {
    let today = day(2026, 3, 1);
    let mut rows = overdue_rows(3, today);
    rows.push(row(4, day(2026, 6, 1), false)); // future, does not count

    let risk = SkipRisk::compute(&rows, PlanStatus::Active, today, DEFAULT_MAX_SKIPS);
    assert_eq!(risk.unpaid_overdue_today, 3);
    assert_eq!(risk.skip_remaining, 5);
    assert!(!risk.at_risk);
}

#[test]
fn paid_rows_never_consume_budget() {
    let today = day(2026, 3, 1);
    let rows = vec![
        row(1, day(2025, 11, 1), true),
        row(2, day(2025, 12, 1), true),
        row(3, day(2026, 1, 1), false),
    ];

    let risk = SkipRisk::compute(&rows, PlanStatus::Active, today, DEFAULT_MAX_SKIPS);
    assert_eq!(risk.unpaid_overdue_today, 1);
    assert_eq!(risk.skip_remaining, 7);
}

/// Under a decayed plan the resolver reports DECAYED, not OVERDUE, so the
/// skip counter reads zero: decay risk is meaningless once decay happened.
#[test]
fn decayed_plan_counts_no_overdue() {
    let today = day(2026, 3, 1);
    let rows = overdue_rows(5, today);

    let risk = SkipRisk::compute(&rows, PlanStatus::Decayed, today, DEFAULT_MAX_SKIPS);
    assert_eq!(risk.unpaid_overdue_today, 0);
    assert_eq!(risk.skip_remaining, DEFAULT_MAX_SKIPS);
    assert!(!risk.at_risk);
}

/// The figure is recomputed from the rows on every call; paying an
/// installment is immediately reflected, no counter to drift.
#[test]
fn recomputes_from_scratch() {
    let today = day(2026, 3, 1);
    let mut rows = overdue_rows(4, today);

    let before = SkipRisk::compute(&rows, PlanStatus::Active, today, DEFAULT_MAX_SKIPS);
    assert_eq!(before.unpaid_overdue_today, 4);

    rows[0].paid = true;
    rows[0].paid_date = rows[0].due_date;
    let after = SkipRisk::compute(&rows, PlanStatus::Active, today, DEFAULT_MAX_SKIPS);
    assert_eq!(after.unpaid_overdue_today, 3);
    assert_eq!(after.skip_remaining, 5);
}

#[test]
fn custom_budget_is_respected() {
    let today = day(2026, 3, 1);
    let rows = overdue_rows(2, today);

    let risk = SkipRisk::compute(&rows, PlanStatus::Active, today, 2);
    assert_eq!(risk.max_skips, 2);
    assert_eq!(risk.skip_remaining, 0);
    assert!(risk.at_risk);
}
