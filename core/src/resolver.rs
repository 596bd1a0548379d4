//! Installment state resolver.
//!
//! Turns raw installment rows into an effective status and payment facts.
//! Pure function layer, no store access, never panics.
//!
//! RULE: `is_paid` is the paid flag and nothing else. A stale paid-date on
//! an unpaid row is ignored by recomputation here, never trusted.

use crate::model::{Installment, PaymentMode, PlanStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Effective status of a single installment, as derived from raw facts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentState {
    Paid,
    PaidWithPenalty,
    Overdue,
    Open,
    Decayed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedInstallment {
    pub is_paid: bool,
    /// Null unless `is_paid`, regardless of any stored value.
    pub payment_date: Option<NaiveDate>,
    pub state: InstallmentState,
    /// Whole calendar days past due. Zero whenever the state is not Overdue.
    pub days_overdue: i64,
}

/// Resolve one installment against its owning plan's status and "today".
///
/// Status precedence: PAID / PAID_WITH_PENALTY when the paid flag is set;
/// DECAYED when unpaid under a decayed plan (overrides OVERDUE and OPEN);
/// OVERDUE when unpaid and due before today; OPEN otherwise, including a
/// missing due date.
pub fn resolve(
    installment: &Installment,
    plan_status: PlanStatus,
    today: NaiveDate,
) -> ResolvedInstallment {
    let is_paid = installment.paid;

    if is_paid {
        let with_penalty = installment.mode == PaymentMode::PenaltyAdjusted
            || installment.penalty_cents > 0
            || installment.interest_cents > 0;
        return ResolvedInstallment {
            is_paid: true,
            payment_date: installment.paid_date,
            state: if with_penalty {
                InstallmentState::PaidWithPenalty
            } else {
                InstallmentState::Paid
            },
            days_overdue: 0,
        };
    }

    if plan_status == PlanStatus::Decayed {
        return ResolvedInstallment {
            is_paid: false,
            payment_date: None,
            state: InstallmentState::Decayed,
            days_overdue: 0,
        };
    }

    match installment.due_date {
        Some(due) if due < today => ResolvedInstallment {
            is_paid: false,
            payment_date: None,
            state: InstallmentState::Overdue,
            days_overdue: (today - due).num_days().max(0),
        },
        _ => ResolvedInstallment {
            is_paid: false,
            payment_date: None,
            state: InstallmentState::Open,
            days_overdue: 0,
        },
    }
}

/// Resolve a whole plan's installment list in sequence order.
pub fn resolve_all(
    installments: &[Installment],
    plan_status: PlanStatus,
    today: NaiveDate,
) -> Vec<ResolvedInstallment> {
    installments
        .iter()
        .map(|i| resolve(i, plan_status, today))
        .collect()
}
